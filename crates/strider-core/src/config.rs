//! # Configuration
//!
//! Session-wide settings ([`DebuggerConfig`]) and the per-request variable
//! loading limits ([`LoadConfig`]) handed through to the evaluator.
//!
//! ## Environment Variables
//!
//! [`DebuggerConfig::from_env`] overlays these on the defaults:
//!
//! - `STRIDER_CASE_INSENSITIVE_PATHS`: `true`/`false` (also `1`/`0`, `yes`/`no`, `on`/`off`)
//! - `STRIDER_CONDITION_ERRORS`: `continue` or `report`
//! - `STRIDER_MAX_UNWIND_DEPTH`: frame limit for internal unwinding

use std::env;
use std::str::FromStr;

use crate::error::{Result, StriderError};

/// What to do when a breakpoint condition fails to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConditionErrorPolicy
{
    /// Log a warning and treat the hit as transparent.
    #[default]
    Continue,
    /// Stop and report the error in the terminal execution state.
    Report,
}

impl FromStr for ConditionErrorPolicy
{
    type Err = StriderError;

    fn from_str(s: &str) -> Result<Self>
    {
        match s.to_ascii_lowercase().as_str() {
            "continue" | "ignore" => Ok(ConditionErrorPolicy::Continue),
            "report" | "stop" => Ok(ConditionErrorPolicy::Report),
            _ => Err(StriderError::InvalidArgument(format!(
                "unknown condition error policy {s:?}, use 'continue' or 'report'"
            ))),
        }
    }
}

/// Session configuration
///
/// ## Example
///
/// ```rust
/// use strider_core::config::{ConditionErrorPolicy, DebuggerConfig};
///
/// let config = DebuggerConfig::default()
///     .with_case_insensitive_paths(true)
///     .with_condition_error_policy(ConditionErrorPolicy::Report);
/// assert!(config.case_insensitive_paths);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebuggerConfig
{
    /// Match source file paths ignoring ASCII case (default on Windows).
    pub case_insensitive_paths: bool,
    /// Handling of breakpoint condition failures.
    pub condition_error_policy: ConditionErrorPolicy,
    /// Upper bound on frames walked when the core unwinds for its own needs
    /// (frame depth while stepping, scope resolution).
    pub max_unwind_depth: usize,
}

impl Default for DebuggerConfig
{
    fn default() -> Self
    {
        Self {
            case_insensitive_paths: cfg!(windows),
            condition_error_policy: ConditionErrorPolicy::Continue,
            max_unwind_depth: 1024,
        }
    }
}

impl DebuggerConfig
{
    /// Defaults overlaid with `STRIDER_*` environment variables.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self>
    {
        let mut config = Self::default();
        if let Ok(value) = env::var("STRIDER_CASE_INSENSITIVE_PATHS") {
            config.case_insensitive_paths = parse_flag("STRIDER_CASE_INSENSITIVE_PATHS", &value)?;
        }
        if let Ok(value) = env::var("STRIDER_CONDITION_ERRORS") {
            config.condition_error_policy = value.parse()?;
        }
        if let Ok(value) = env::var("STRIDER_MAX_UNWIND_DEPTH") {
            config.max_unwind_depth = value.trim().parse().map_err(|_| {
                StriderError::InvalidArgument(format!("STRIDER_MAX_UNWIND_DEPTH must be a frame count, got {value:?}"))
            })?;
        }
        Ok(config)
    }

    /// Set case-insensitive path matching.
    #[must_use]
    pub fn with_case_insensitive_paths(mut self, enabled: bool) -> Self
    {
        self.case_insensitive_paths = enabled;
        self
    }

    /// Set the condition error policy.
    #[must_use]
    pub fn with_condition_error_policy(mut self, policy: ConditionErrorPolicy) -> Self
    {
        self.condition_error_policy = policy;
        self
    }

    /// Set the internal unwind limit.
    #[must_use]
    pub fn with_max_unwind_depth(mut self, depth: usize) -> Self
    {
        self.max_unwind_depth = depth;
        self
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool>
{
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(StriderError::InvalidArgument(format!("{name} must be a boolean, got {value:?}"))),
    }
}

/// Limits applied when loading variables for a client
///
/// Opaque to the core; passed through to the [`Evaluator`](crate::eval::Evaluator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadConfig
{
    /// Dereference pointers while loading.
    pub follow_pointers: bool,
    /// How many levels of references to follow.
    pub max_variable_recurse: usize,
    /// Longest string loaded, in bytes.
    pub max_string_len: usize,
    /// Most elements loaded from an array, slice or map.
    pub max_array_values: usize,
    /// Most struct fields loaded (`None` = all).
    pub max_struct_fields: Option<usize>,
}

impl Default for LoadConfig
{
    fn default() -> Self
    {
        Self {
            follow_pointers: true,
            max_variable_recurse: 1,
            max_string_len: 64,
            max_array_values: 64,
            max_struct_fields: None,
        }
    }
}

impl LoadConfig
{
    /// Load nothing beyond the top-level scalar.
    pub fn shallow() -> Self
    {
        Self {
            follow_pointers: false,
            max_variable_recurse: 0,
            max_string_len: 0,
            max_array_values: 0,
            max_struct_fields: Some(0),
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_policy_from_str()
    {
        assert_eq!("report".parse::<ConditionErrorPolicy>().unwrap(), ConditionErrorPolicy::Report);
        assert_eq!("Continue".parse::<ConditionErrorPolicy>().unwrap(), ConditionErrorPolicy::Continue);
        assert!("panic".parse::<ConditionErrorPolicy>().is_err());
    }

    #[test]
    fn test_parse_flag()
    {
        assert!(parse_flag("X", "yes").unwrap());
        assert!(!parse_flag("X", "0").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn test_load_config_default()
    {
        let config = LoadConfig::default();
        assert!(config.follow_pointers);
        assert_eq!(config.max_variable_recurse, 1);
        assert_eq!(config.max_string_len, 64);
        assert_eq!(config.max_array_values, 64);
        assert_eq!(config.max_struct_fields, None);
    }
}
