//! Breakpoint and tracepoint bookkeeping.
//!
//! This module holds the breakpoint records and the id/address/name indexes
//! over them. Installing traps, evaluating conditions and deciding whether a
//! hit stops the target is the job of the [`BreakpointManager`]; the store
//! only tracks what exists.
//!
//! A tracepoint is a breakpoint whose [`BreakpointKind`] tells the manager to
//! report the hit and keep running. Both kinds share one record type.

pub mod builder;
pub mod manager;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

pub use builder::BreakpointBuilder;
pub use manager::{BreakpointManager, HitDecision};

use crate::error::{Result, StriderError};
use crate::types::{Address, Location, StackFrame, TaskId, TaskInfo, ThreadId, Variable};

/// Unique identifier for a breakpoint; never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BreakpointId(u64);

impl BreakpointId
{
    /// Create a new identifier from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self
    {
        Self(value)
    }

    /// Get the raw numeric representation (useful for logging / errors).
    #[must_use]
    pub const fn raw(self) -> u64
    {
        self.0
    }
}

impl fmt::Display for BreakpointId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// What happens when a breakpoint is hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BreakpointKind
{
    /// Report the hit and stay stopped.
    #[default]
    Breakpoint,
    /// Report the hit and resume automatically.
    Tracepoint,
}

/// Where a breakpoint was asked to go, kept so it can be re-resolved after a
/// restart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BreakpointOrigin
{
    /// A raw address.
    Address(Address),
    /// A source line.
    FileLine
    {
        /// File as requested (exact or a path suffix).
        file: String,
        /// 1-based line.
        line: u32,
    },
    /// A function, optionally offset by lines from its declaration.
    FunctionLine
    {
        /// Fully qualified function name.
        function: String,
        /// `< 0`: after the prologue, `0`: raw entry, `> 0`: lines after the declaration.
        line: i64,
    },
}

impl fmt::Display for BreakpointOrigin
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            BreakpointOrigin::Address(addr) => write!(f, "*{addr}"),
            BreakpointOrigin::FileLine { file, line } => write!(f, "{file}:{line}"),
            BreakpointOrigin::FunctionLine { function, line } if *line < 0 => write!(f, "{function}"),
            BreakpointOrigin::FunctionLine { function, line } => write!(f, "{function}:{line}"),
        }
    }
}

/// Client request to create a breakpoint
///
/// Location fields are consulted in order: `address`, then `file` + `line`,
/// then `function` (+ `line` as an offset). Build one with
/// [`BreakpointBuilder`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSpec
{
    pub function: Option<String>,
    pub file: Option<String>,
    pub line: Option<i64>,
    pub address: Option<Address>,
    pub name: Option<String>,
    pub condition: Option<String>,
    pub tracepoint: bool,
    /// Record which task hit the breakpoint.
    pub capture_task: bool,
    /// Frames to capture on each hit; negative values are rejected.
    pub stack_depth: i64,
    /// Variables to load on each hit.
    pub variables: Vec<String>,
}

impl BreakpointSpec
{
    /// The origin the location fields describe.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` when no location is given, or a file is given
    /// without a positive line.
    pub fn origin(&self) -> Result<BreakpointOrigin>
    {
        if let Some(address) = self.address {
            return Ok(BreakpointOrigin::Address(address));
        }
        if let Some(file) = &self.file {
            let line = self
                .line
                .and_then(|l| u32::try_from(l).ok())
                .filter(|l| *l > 0)
                .ok_or_else(|| StriderError::InvalidArgument(format!("{file}: line must be a positive number")))?;
            return Ok(BreakpointOrigin::FileLine {
                file: file.clone(),
                line,
            });
        }
        if let Some(function) = &self.function {
            return Ok(BreakpointOrigin::FunctionLine {
                function: function.clone(),
                line: self.line.unwrap_or(-1),
            });
        }
        Err(StriderError::InvalidArgument(
            "breakpoint needs an address, a file and line, or a function".to_string(),
        ))
    }
}

/// In-place changes to an existing breakpoint. Unset fields are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointUpdate
{
    pub id: BreakpointId,
    pub name: Option<Option<String>>,
    pub condition: Option<Option<String>>,
    pub tracepoint: Option<bool>,
    pub capture_task: Option<bool>,
    pub stack_depth: Option<i64>,
    pub variables: Option<Vec<String>>,
}

impl BreakpointUpdate
{
    /// An update that changes nothing.
    pub fn new(id: BreakpointId) -> Self
    {
        Self {
            id,
            name: None,
            condition: None,
            tracepoint: None,
            capture_task: None,
            stack_depth: None,
            variables: None,
        }
    }

    #[must_use]
    pub fn name(mut self, name: Option<String>) -> Self
    {
        self.name = Some(name);
        self
    }

    #[must_use]
    pub fn condition(mut self, condition: Option<String>) -> Self
    {
        self.condition = Some(condition);
        self
    }

    #[must_use]
    pub fn tracepoint(mut self, tracepoint: bool) -> Self
    {
        self.tracepoint = Some(tracepoint);
        self
    }

    #[must_use]
    pub fn capture_task(mut self, capture: bool) -> Self
    {
        self.capture_task = Some(capture);
        self
    }

    #[must_use]
    pub fn stack_depth(mut self, depth: i64) -> Self
    {
        self.stack_depth = Some(depth);
        self
    }

    #[must_use]
    pub fn variables<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variables = Some(variables.into_iter().map(Into::into).collect());
        self
    }
}

/// A breakpoint as the session knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint
{
    pub id: BreakpointId,
    pub name: Option<String>,
    pub kind: BreakpointKind,
    /// Installed address.
    pub address: Address,
    /// Resolved position of `address`.
    pub location: Location,
    /// What was requested.
    pub origin: BreakpointOrigin,
    /// Evaluated in the hitting task's innermost frame on every hit.
    pub condition: Option<String>,
    pub capture_task: bool,
    pub stack_depth: usize,
    pub variables: Vec<String>,
    /// Hits that passed the condition.
    pub total_hits: u64,
    /// Hits per task, for targets with tasks.
    pub task_hits: BTreeMap<TaskId, u64>,
}

impl Breakpoint
{
    /// Whether hits resume automatically.
    pub fn is_tracepoint(&self) -> bool
    {
        self.kind == BreakpointKind::Tracepoint
    }
}

impl fmt::Display for Breakpoint
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let kind = match self.kind {
            BreakpointKind::Breakpoint => "Breakpoint",
            BreakpointKind::Tracepoint => "Tracepoint",
        };
        write!(f, "{kind} {}", self.id)?;
        if let Some(name) = &self.name {
            write!(f, " ({name})")?;
        }
        write!(f, " at {}", self.location)
    }
}

/// Data recorded when a breakpoint is hit.
#[derive(Debug, Clone)]
pub struct BreakpointHit
{
    /// The breakpoint, counters included, as of this hit.
    pub breakpoint: Breakpoint,
    /// Thread that hit it.
    pub thread: ThreadId,
    /// The hitting task, when `capture_task` is set.
    pub task: Option<TaskInfo>,
    /// Innermost frames, when `stack_depth > 0`.
    pub stack: Vec<StackFrame>,
    /// Requested variables; failed loads are unreadable values.
    pub variables: Vec<Variable>,
}

/// Breakpoint records indexed by id, address and name.
#[derive(Debug, Default)]
pub struct BreakpointStore
{
    next_id: u64,
    by_id: BTreeMap<BreakpointId, Breakpoint>,
    by_address: HashMap<Address, BreakpointId>,
    by_name: HashMap<String, BreakpointId>,
}

impl BreakpointStore
{
    /// Create a new empty breakpoint store.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Hand out the next id. Ids are never reused, even after a clear.
    pub fn allocate_id(&mut self) -> BreakpointId
    {
        self.next_id += 1;
        BreakpointId::from_raw(self.next_id)
    }

    /// Store a breakpoint under its id, address and name.
    pub fn insert(&mut self, breakpoint: Breakpoint)
    {
        self.by_address.insert(breakpoint.address, breakpoint.id);
        if let Some(name) = &breakpoint.name {
            self.by_name.insert(name.clone(), breakpoint.id);
        }
        self.by_id.insert(breakpoint.id, breakpoint);
    }

    pub fn get(&self, id: BreakpointId) -> Option<&Breakpoint>
    {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: BreakpointId) -> Option<&mut Breakpoint>
    {
        self.by_id.get_mut(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<BreakpointId>
    {
        self.by_name.get(name).copied()
    }

    /// Breakpoint occupying `address`.
    pub fn id_at(&self, address: Address) -> Option<BreakpointId>
    {
        self.by_address.get(&address).copied()
    }

    /// Point the name index at a new name (or none).
    pub fn rename(&mut self, id: BreakpointId, name: Option<String>)
    {
        let Some(breakpoint) = self.by_id.get_mut(&id) else {
            return;
        };
        if let Some(old) = breakpoint.name.take() {
            self.by_name.remove(&old);
        }
        if let Some(new) = &name {
            self.by_name.insert(new.clone(), id);
        }
        breakpoint.name = name;
    }

    /// Move a breakpoint to a new address.
    pub fn relocate(&mut self, id: BreakpointId, location: Location)
    {
        let Some(breakpoint) = self.by_id.get_mut(&id) else {
            return;
        };
        if self.by_address.get(&breakpoint.address) == Some(&id) {
            self.by_address.remove(&breakpoint.address);
        }
        breakpoint.address = location.pc;
        breakpoint.location = location;
        self.by_address.insert(breakpoint.address, id);
    }

    /// Remove a breakpoint from the store, returning it if it was present.
    pub fn remove(&mut self, id: BreakpointId) -> Option<Breakpoint>
    {
        let breakpoint = self.by_id.remove(&id)?;
        if self.by_address.get(&breakpoint.address) == Some(&id) {
            self.by_address.remove(&breakpoint.address);
        }
        if let Some(name) = &breakpoint.name {
            self.by_name.remove(name);
        }
        Some(breakpoint)
    }

    /// All breakpoints, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Breakpoint>
    {
        self.by_id.values()
    }

    pub fn ids(&self) -> Vec<BreakpointId>
    {
        self.by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize
    {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool
    {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn record(store: &mut BreakpointStore, address: u64, name: Option<&str>) -> BreakpointId
    {
        let id = store.allocate_id();
        store.insert(Breakpoint {
            id,
            name: name.map(str::to_string),
            kind: BreakpointKind::Breakpoint,
            address: Address::from(address),
            location: Location::from_pc(Address::from(address)),
            origin: BreakpointOrigin::Address(Address::from(address)),
            condition: None,
            capture_task: false,
            stack_depth: 0,
            variables: Vec::new(),
            total_hits: 0,
            task_hits: BTreeMap::new(),
        });
        id
    }

    #[test]
    fn test_ids_are_not_reused()
    {
        let mut store = BreakpointStore::new();
        let first = record(&mut store, 0x1000, None);
        store.remove(first);
        let second = record(&mut store, 0x1000, None);
        assert_ne!(first, second);
        assert_eq!(store.id_at(Address::from(0x1000)), Some(second));
    }

    #[test]
    fn test_rename_updates_index()
    {
        let mut store = BreakpointStore::new();
        let id = record(&mut store, 0x1000, Some("old"));
        store.rename(id, Some("new".into()));
        assert_eq!(store.id_by_name("old"), None);
        assert_eq!(store.id_by_name("new"), Some(id));
    }

    #[test]
    fn test_spec_origin_precedence()
    {
        let spec = BreakpointSpec {
            function: Some("main.main".into()),
            file: Some("main.go".into()),
            line: Some(3),
            address: Some(Address::from(0x40)),
            ..BreakpointSpec::default()
        };
        assert_eq!(spec.origin().unwrap(), BreakpointOrigin::Address(Address::from(0x40)));

        let spec = BreakpointSpec {
            function: Some("main.main".into()),
            file: Some("main.go".into()),
            line: Some(3),
            ..BreakpointSpec::default()
        };
        assert!(matches!(spec.origin().unwrap(), BreakpointOrigin::FileLine { line: 3, .. }));

        let spec = BreakpointSpec {
            function: Some("main.main".into()),
            ..BreakpointSpec::default()
        };
        assert_eq!(
            spec.origin().unwrap(),
            BreakpointOrigin::FunctionLine {
                function: "main.main".into(),
                line: -1
            }
        );
    }

    #[test]
    fn test_spec_without_location_is_invalid()
    {
        assert!(BreakpointSpec::default().origin().is_err());
        let spec = BreakpointSpec {
            file: Some("main.go".into()),
            ..BreakpointSpec::default()
        };
        assert!(spec.origin().is_err());
    }
}
