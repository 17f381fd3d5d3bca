//! # Breakpoint Builder
//!
//! Fluent construction of [`BreakpointSpec`]s.
//!
//! Pick a location with one of the constructors, then layer on a name, a
//! condition, capture options or the tracepoint flag:
//!
//! ```rust
//! use strider_core::breakpoints::BreakpointBuilder;
//!
//! let spec = BreakpointBuilder::file_line("main.go", 12)
//!     .name("loop")
//!     .condition("i % 2 == 0")
//!     .tracepoint()
//!     .variable("i")
//!     .build();
//! assert!(spec.tracepoint);
//! assert_eq!(spec.variables, vec!["i".to_string()]);
//! ```

use crate::breakpoints::{Breakpoint, BreakpointSpec};
use crate::error::Result;
use crate::session::Session;
use crate::types::Address;

/// Builder for configuring breakpoints before installation.
#[derive(Debug, Clone, Default)]
pub struct BreakpointBuilder
{
    spec: BreakpointSpec,
}

impl BreakpointBuilder
{
    /// Break after the prologue of `function`.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use strider_core::breakpoints::BreakpointBuilder;
    ///
    /// let spec = BreakpointBuilder::function("main.helper").line(0).build();
    /// assert_eq!(spec.line, Some(0));
    /// ```
    pub fn function(function: impl Into<String>) -> Self
    {
        Self {
            spec: BreakpointSpec {
                function: Some(function.into()),
                ..BreakpointSpec::default()
            },
        }
    }

    /// Break on a source line.
    pub fn file_line(file: impl Into<String>, line: u32) -> Self
    {
        Self {
            spec: BreakpointSpec {
                file: Some(file.into()),
                line: Some(i64::from(line)),
                ..BreakpointSpec::default()
            },
        }
    }

    /// Break on a raw address.
    pub fn address(address: Address) -> Self
    {
        Self {
            spec: BreakpointSpec {
                address: Some(address),
                ..BreakpointSpec::default()
            },
        }
    }

    /// Line for file breakpoints; for function breakpoints an offset from the
    /// declaration line (`0` is the raw entry).
    #[must_use]
    pub fn line(mut self, line: i64) -> Self
    {
        self.spec.line = Some(line);
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self
    {
        self.spec.name = Some(name.into());
        self
    }

    /// Only stop when `expr` evaluates to true in the hitting frame.
    #[must_use]
    pub fn condition(mut self, expr: impl Into<String>) -> Self
    {
        self.spec.condition = Some(expr.into());
        self
    }

    /// Report hits without stopping.
    #[must_use]
    pub fn tracepoint(mut self) -> Self
    {
        self.spec.tracepoint = true;
        self
    }

    /// Record the task that hit the breakpoint.
    #[must_use]
    pub fn capture_task(mut self) -> Self
    {
        self.spec.capture_task = true;
        self
    }

    /// Capture this many frames on each hit.
    #[must_use]
    pub fn stack_depth(mut self, depth: i64) -> Self
    {
        self.spec.stack_depth = depth;
        self
    }

    /// Load `name` on each hit.
    #[must_use]
    pub fn variable(mut self, name: impl Into<String>) -> Self
    {
        self.spec.variables.push(name.into());
        self
    }

    /// The finished spec.
    pub fn build(self) -> BreakpointSpec
    {
        self.spec
    }

    /// Create the breakpoint in `session`.
    ///
    /// ## Errors
    ///
    /// See [`Session::create_breakpoint`].
    pub fn create(self, session: &mut Session) -> Result<Breakpoint>
    {
        session.create_breakpoint(self.spec)
    }
}
