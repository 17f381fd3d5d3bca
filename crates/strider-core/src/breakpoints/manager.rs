//! # Breakpoint Manager
//!
//! Owns the breakpoint set and the trap table.
//!
//! User breakpoints and the stepping engine's internal traps share one trap
//! per address: a trap is installed the first time any user needs it and
//! removed only when neither a breakpoint nor an internal trap still does.
//!
//! ## Hit handling
//!
//! When the target stops on a trap, [`BreakpointManager::on_hit`] decides what
//! the stop means:
//!
//! 1. Condition false (or failing under [`ConditionErrorPolicy::Continue`]):
//!    [`HitDecision::Transparent`], resume without reporting
//! 2. Otherwise count the hit and capture the requested task, stack and
//!    variables
//! 3. Tracepoints yield [`HitDecision::Trace`], breakpoints [`HitDecision::Stop`]

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info, warn};

use super::{
    Breakpoint, BreakpointHit, BreakpointId, BreakpointKind, BreakpointOrigin, BreakpointSpec, BreakpointStore,
    BreakpointUpdate,
};
use crate::config::ConditionErrorPolicy;
use crate::error::{Result, StriderError, TargetFault};
use crate::location::LocationResolver;
use crate::target::TargetControl;
use crate::types::{Address, Location, StackFrame, TaskInfo, ThreadId, Variable};

/// Trap installation, without exposing the rest of the target.
pub(crate) trait TrapOperations
{
    fn set_trap(&mut self, address: Address) -> Result<()>;

    fn clear_trap(&mut self, address: Address) -> Result<()>;
}

impl<T: TargetControl + ?Sized> TrapOperations for T
{
    fn set_trap(&mut self, address: Address) -> Result<()>
    {
        TargetControl::set_trap(self, address)
    }

    fn clear_trap(&mut self, address: Address) -> Result<()>
    {
        TargetControl::clear_trap(self, address)
    }
}

/// What the manager needs from the stopped target to process a hit.
pub(crate) trait HitOperations
{
    /// Evaluate `expr` in the innermost frame of `thread`.
    fn evaluate_condition(&self, thread: ThreadId, expr: &str) -> Result<bool>;

    /// Task running on `thread`, if the target has tasks.
    fn task_of(&self, thread: ThreadId) -> Option<TaskInfo>;

    /// Up to `depth` innermost frames of `thread`.
    fn capture_stack(&self, thread: ThreadId, depth: usize) -> Vec<StackFrame>;

    /// Load `name` in the innermost frame of `thread`.
    fn load_variable(&self, thread: ThreadId, name: &str) -> Variable;
}

/// Outcome of a trap hit.
#[derive(Debug, Clone)]
pub enum HitDecision
{
    /// Condition not met: resume without reporting.
    Transparent,
    /// Report, then resume.
    Trace(Box<BreakpointHit>),
    /// Report and stay stopped.
    Stop(Box<BreakpointHit>),
}

/// Authoritative breakpoint set plus trap reference counts.
#[derive(Debug, Default)]
pub struct BreakpointManager
{
    store: BreakpointStore,
    internal: HashMap<Address, usize>,
    installed: HashSet<Address>,
}

impl BreakpointManager
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// All breakpoints, ordered by id.
    pub fn list(&self) -> Vec<Breakpoint>
    {
        self.store.iter().cloned().collect()
    }

    /// ## Errors
    ///
    /// `NotFound` for an unknown id.
    pub fn get(&self, id: BreakpointId) -> Result<Breakpoint>
    {
        self.store
            .get(id)
            .cloned()
            .ok_or_else(|| StriderError::NotFound(format!("breakpoint {id}")))
    }

    /// ## Errors
    ///
    /// `NotFound` for an unknown name.
    pub fn get_by_name(&self, name: &str) -> Result<Breakpoint>
    {
        self.store
            .id_by_name(name)
            .and_then(|id| self.store.get(id))
            .cloned()
            .ok_or_else(|| StriderError::NotFound(format!("breakpoint named {name}")))
    }

    /// User breakpoint at `address`.
    pub fn at(&self, address: Address) -> Option<&Breakpoint>
    {
        self.store.id_at(address).and_then(|id| self.store.get(id))
    }

    /// Whether a trap is currently installed at `address`.
    pub fn is_installed(&self, address: Address) -> bool
    {
        self.installed.contains(&address)
    }

    /// Whether the stepping engine holds a trap at `address`.
    pub fn is_internal(&self, address: Address) -> bool
    {
        self.internal.contains_key(&address)
    }

    fn validate_name(&self, name: &str, owner: Option<BreakpointId>) -> Result<()>
    {
        if name.parse::<i64>().is_ok() {
            return Err(StriderError::InvalidArgument(format!(
                "breakpoint name {name:?} can not be a number"
            )));
        }
        match self.store.id_by_name(name) {
            Some(existing) if Some(existing) != owner => Err(StriderError::InvalidArgument(format!(
                "breakpoint name {name:?} already used by breakpoint {existing}"
            ))),
            _ => Ok(()),
        }
    }

    fn validate_depth(depth: i64) -> Result<usize>
    {
        usize::try_from(depth)
            .map_err(|_| StriderError::InvalidArgument(format!("stack depth {depth} must not be negative")))
    }

    /// Where `origin` lands in the current image.
    ///
    /// ## Errors
    ///
    /// `NotFound` or `Ambiguous` from resolution.
    pub fn resolve_origin(resolver: &LocationResolver<'_>, origin: &BreakpointOrigin) -> Result<Location>
    {
        match origin {
            BreakpointOrigin::Address(address) => Ok(resolver.location_at(*address)),
            BreakpointOrigin::FileLine { file, line } => {
                let mut files = resolver.matching_files(file);
                match files.len() {
                    0 => Err(StriderError::NotFound(format!("no source file matches {file}"))),
                    1 => {
                        let (path, folded) = files.remove(0);
                        let mut location = resolver.find_file_location(&path, *line)?;
                        location.case_folded = folded;
                        Ok(location)
                    }
                    _ => Err(StriderError::Ambiguous {
                        location: format!("{file}:{line}"),
                        candidates: files
                            .into_iter()
                            .take(crate::location::MAX_CANDIDATES)
                            .map(|(path, _)| path)
                            .collect(),
                    }),
                }
            }
            BreakpointOrigin::FunctionLine { function, line } => {
                let function = resolver.function_named(function)?;
                resolver.find_function_location(&function, *line)
            }
        }
    }

    fn acquire<T: TrapOperations + ?Sized>(&mut self, traps: &mut T, address: Address) -> Result<()>
    {
        if self.installed.contains(&address) {
            return Ok(());
        }
        traps.set_trap(address)?;
        self.installed.insert(address);
        Ok(())
    }

    fn release<T: TrapOperations + ?Sized>(&mut self, traps: &mut T, address: Address) -> Result<()>
    {
        let still_needed = self.store.id_at(address).is_some() || self.internal.contains_key(&address);
        if still_needed || !self.installed.contains(&address) {
            return Ok(());
        }
        traps.clear_trap(address)?;
        self.installed.remove(&address);
        Ok(())
    }

    /// Resolve, install and record a new breakpoint.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: no location, negative stack depth, bad name
    /// - `NotFound` / `Ambiguous`: resolution failed
    /// - `BreakpointExists`: another breakpoint occupies the address
    pub(crate) fn create<T: TrapOperations + ?Sized>(
        &mut self,
        traps: &mut T,
        resolver: &LocationResolver<'_>,
        spec: BreakpointSpec,
    ) -> Result<Breakpoint>
    {
        let origin = spec.origin()?;
        let stack_depth = Self::validate_depth(spec.stack_depth)?;
        if let Some(name) = &spec.name {
            self.validate_name(name, None)?;
        }

        let location = Self::resolve_origin(resolver, &origin)?;
        if let Some(existing) = self.store.id_at(location.pc) {
            return Err(StriderError::BreakpointExists {
                id: existing.raw(),
                address: location.pc,
            });
        }

        self.acquire(traps, location.pc)?;

        let breakpoint = Breakpoint {
            id: self.store.allocate_id(),
            name: spec.name,
            kind: if spec.tracepoint {
                BreakpointKind::Tracepoint
            } else {
                BreakpointKind::Breakpoint
            },
            address: location.pc,
            location,
            origin,
            condition: spec.condition,
            capture_task: spec.capture_task,
            stack_depth,
            variables: spec.variables,
            total_hits: 0,
            task_hits: BTreeMap::new(),
        };
        info!(breakpoint = %breakpoint.id, address = %breakpoint.address, origin = %breakpoint.origin, "breakpoint created");
        self.store.insert(breakpoint.clone());
        Ok(breakpoint)
    }

    /// Apply `update` in place. The trap does not move.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown id, `InvalidArgument` for a bad name or a
    /// negative stack depth.
    pub fn amend(&mut self, update: BreakpointUpdate) -> Result<Breakpoint>
    {
        let id = update.id;
        if self.store.get(id).is_none() {
            return Err(StriderError::NotFound(format!("breakpoint {id}")));
        }
        let stack_depth = update.stack_depth.map(Self::validate_depth).transpose()?;
        if let Some(Some(name)) = &update.name {
            self.validate_name(name, Some(id))?;
        }

        if let Some(name) = update.name {
            self.store.rename(id, name);
        }
        let breakpoint = self
            .store
            .get_mut(id)
            .ok_or_else(|| StriderError::NotFound(format!("breakpoint {id}")))?;
        if let Some(condition) = update.condition {
            breakpoint.condition = condition;
        }
        if let Some(tracepoint) = update.tracepoint {
            breakpoint.kind = if tracepoint {
                BreakpointKind::Tracepoint
            } else {
                BreakpointKind::Breakpoint
            };
        }
        if let Some(capture) = update.capture_task {
            breakpoint.capture_task = capture;
        }
        if let Some(depth) = stack_depth {
            breakpoint.stack_depth = depth;
        }
        if let Some(variables) = update.variables {
            breakpoint.variables = variables;
        }
        debug!(breakpoint = %id, "breakpoint amended");
        Ok(breakpoint.clone())
    }

    /// Remove a breakpoint and its trap, returning it as it was.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown id; trap removal failures leave the
    /// breakpoint in place.
    pub(crate) fn clear<T: TrapOperations + ?Sized>(&mut self, traps: &mut T, id: BreakpointId) -> Result<Breakpoint>
    {
        let address = self
            .store
            .get(id)
            .map(|bp| bp.address)
            .ok_or_else(|| StriderError::NotFound(format!("breakpoint {id}")))?;
        if !self.internal.contains_key(&address) && self.installed.contains(&address) {
            traps.clear_trap(address)?;
            self.installed.remove(&address);
        }
        let breakpoint = self
            .store
            .remove(id)
            .ok_or_else(|| StriderError::NotFound(format!("breakpoint {id}")))?;
        info!(breakpoint = %id, %address, "breakpoint cleared");
        Ok(breakpoint)
    }

    /// [`clear`](Self::clear) by name.
    pub(crate) fn clear_by_name<T: TrapOperations + ?Sized>(&mut self, traps: &mut T, name: &str) -> Result<Breakpoint>
    {
        let id = self
            .store
            .id_by_name(name)
            .ok_or_else(|| StriderError::NotFound(format!("breakpoint named {name}")))?;
        self.clear(traps, id)
    }

    /// Take a reference on an internal trap at `address`.
    pub(crate) fn add_internal<T: TrapOperations + ?Sized>(&mut self, traps: &mut T, address: Address) -> Result<()>
    {
        self.acquire(traps, address)?;
        *self.internal.entry(address).or_default() += 1;
        Ok(())
    }

    /// Drop a reference on an internal trap at `address`.
    pub(crate) fn remove_internal<T: TrapOperations + ?Sized>(&mut self, traps: &mut T, address: Address) -> Result<()>
    {
        match self.internal.get_mut(&address) {
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(())
            }
            Some(_) => {
                self.internal.remove(&address);
                self.release(traps, address)
            }
            None => Ok(()),
        }
    }

    /// Decide what a stop on the trap at `address` means.
    ///
    /// ## Errors
    ///
    /// - `UnknownBreakpoint`: no user breakpoint at `address`
    /// - `Condition`: the condition failed under [`ConditionErrorPolicy::Report`]
    pub(crate) fn on_hit<H: HitOperations + ?Sized>(
        &mut self,
        ops: &H,
        thread: ThreadId,
        address: Address,
        policy: ConditionErrorPolicy,
    ) -> std::result::Result<HitDecision, TargetFault>
    {
        let id = self.store.id_at(address).ok_or(TargetFault::UnknownBreakpoint(address))?;
        let condition = self.store.get(id).and_then(|bp| bp.condition.clone());

        if let Some(condition) = condition {
            match ops.evaluate_condition(thread, &condition) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(breakpoint = %id, %thread, "condition false, resuming");
                    return Ok(HitDecision::Transparent);
                }
                Err(err) => match policy {
                    ConditionErrorPolicy::Continue => {
                        warn!(breakpoint = %id, %thread, condition, error = %err, "breakpoint condition failed, resuming");
                        return Ok(HitDecision::Transparent);
                    }
                    ConditionErrorPolicy::Report => {
                        return Err(TargetFault::Condition {
                            id: id.raw(),
                            message: err.to_string(),
                        });
                    }
                },
            }
        }

        let task = ops.task_of(thread);
        let breakpoint = self
            .store
            .get_mut(id)
            .ok_or(TargetFault::UnknownBreakpoint(address))?;
        breakpoint.total_hits += 1;
        if let Some(task) = &task {
            *breakpoint.task_hits.entry(task.id).or_default() += 1;
        }
        let breakpoint = breakpoint.clone();

        let hit = BreakpointHit {
            thread,
            task: task.filter(|_| breakpoint.capture_task),
            stack: if breakpoint.stack_depth > 0 {
                ops.capture_stack(thread, breakpoint.stack_depth)
            } else {
                Vec::new()
            },
            variables: breakpoint
                .variables
                .iter()
                .map(|name| ops.load_variable(thread, name))
                .collect(),
            breakpoint,
        };
        debug!(breakpoint = %id, %thread, hits = hit.breakpoint.total_hits, "breakpoint hit");

        Ok(match hit.breakpoint.kind {
            BreakpointKind::Tracepoint => HitDecision::Trace(Box::new(hit)),
            BreakpointKind::Breakpoint => HitDecision::Stop(Box::new(hit)),
        })
    }

    /// Forget every installed trap; the process is gone.
    pub(crate) fn invalidate(&mut self)
    {
        self.internal.clear();
        self.installed.clear();
    }

    /// Re-resolve and install every breakpoint in a fresh process
    ///
    /// Hit counts restart at zero. Breakpoints that no longer resolve, or
    /// that now collide with an earlier one, are dropped; their ids are
    /// returned.
    pub(crate) fn reinstall<T: TrapOperations + ?Sized>(
        &mut self,
        traps: &mut T,
        resolver: &LocationResolver<'_>,
    ) -> Vec<BreakpointId>
    {
        self.invalidate();
        let mut dropped = Vec::new();
        let mut placed: HashSet<Address> = HashSet::new();

        for id in self.store.ids() {
            let Some(origin) = self.store.get(id).map(|bp| bp.origin.clone()) else {
                continue;
            };
            let placement = Self::resolve_origin(resolver, &origin).and_then(|location| {
                if placed.contains(&location.pc) {
                    return Err(StriderError::BreakpointExists {
                        id: id.raw(),
                        address: location.pc,
                    });
                }
                traps.set_trap(location.pc)?;
                Ok(location)
            });
            match placement {
                Ok(location) => {
                    placed.insert(location.pc);
                    self.installed.insert(location.pc);
                    self.store.relocate(id, location);
                    if let Some(bp) = self.store.get_mut(id) {
                        bp.total_hits = 0;
                        bp.task_hits.clear();
                    }
                }
                Err(err) => {
                    warn!(breakpoint = %id, %origin, error = %err, "breakpoint dropped on restart");
                    self.store.remove(id);
                    dropped.push(id);
                }
            }
        }
        dropped
    }
}
