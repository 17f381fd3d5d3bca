//! # Debug Session
//!
//! [`Session`] owns the target and is the entry point for every client
//! operation: breakpoints, continue, stepping, stacks, evaluation, symbol
//! listings, restart and detach.
//!
//! ## Lifecycle
//!
//! 1. [`Session::launch`] (restartable) or [`Session::attach`]
//! 2. Set breakpoints, then [`continue_execution`](Session::continue_execution)
//!    or step
//! 3. Inspect the stop: [`state`](Session::state),
//!    [`stacktrace`](Session::stacktrace), [`eval_variable`](Session::eval_variable)
//! 4. Once the process exits every operation except `pid`, `restart`,
//!    `detach` and `halt_handle` returns `ProcessTerminated`
//!
//! ## Thread Safety
//!
//! Run requests take `&mut self`, so at most one is in flight. The only
//! cross-thread operation is interrupting a run through a [`HaltHandle`].

mod process;
mod run;
mod state;

use std::sync::mpsc;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

pub(crate) use process::Process;
pub use run::{ContinueStream, HaltHandle};
pub use state::{ExecutionState, ThreadState};

use crate::breakpoints::{Breakpoint, BreakpointHit, BreakpointId, BreakpointManager, BreakpointSpec, BreakpointUpdate};
use crate::config::{DebuggerConfig, LoadConfig};
use crate::disasm::{disassemble, AsmInstruction};
use crate::error::{Result, StriderError, TargetFault};
use crate::eval::{encode_value, EvalScope, Evaluator, FrameScope, TaskSelector};
use crate::events::{SessionEvent, SessionEventReceiver, SessionEventSender};
use crate::location::{LocationResolver, ResolveContext};
use crate::symbols::SymbolCache;
use crate::target::{Launcher, TargetParts};
use crate::types::{
    Address, Location, ProcessId, Registers, StackFrame, StopReason, TaskId, TaskInfo, ThreadId, ThreadInfo, TraceFrame,
    Variable, VariableKind,
};

/// A debugging session over one process at a time.
pub struct Session
{
    pub(crate) config: DebuggerConfig,
    pub(crate) evaluator: Arc<dyn Evaluator>,
    launcher: Option<Box<dyn Launcher>>,
    pub(crate) process: Process,
    pub(crate) breakpoints: BreakpointManager,
    pub(crate) current_thread: Option<ThreadId>,
    pub(crate) selected_task: Option<TaskId>,
    last_state: Option<ExecutionState>,
    pub(crate) halt: HaltHandle,
    subscribers: Vec<SessionEventSender>,
}

impl std::fmt::Debug for Session
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Session")
            .field("process", &self.process)
            .field("launched", &self.launcher.is_some())
            .field("breakpoints", &self.breakpoints.list().len())
            .field("current_thread", &self.current_thread)
            .field("selected_task", &self.selected_task)
            .finish_non_exhaustive()
    }
}

impl Session
{
    /// Launch a process through `launcher`. The session can be restarted.
    ///
    /// ## Errors
    ///
    /// Whatever the launcher or the initial thread query reports.
    #[instrument(skip_all)]
    pub fn launch(mut launcher: Box<dyn Launcher>, evaluator: Arc<dyn Evaluator>, config: DebuggerConfig) -> Result<Self>
    {
        let parts = launcher.launch()?;
        Self::new(parts, Some(launcher), evaluator, config)
    }

    /// Debug an already running process. The session cannot be restarted.
    ///
    /// ## Errors
    ///
    /// Whatever the initial thread query reports.
    #[instrument(skip_all)]
    pub fn attach(parts: TargetParts, evaluator: Arc<dyn Evaluator>, config: DebuggerConfig) -> Result<Self>
    {
        Self::new(parts, None, evaluator, config)
    }

    fn new(
        parts: TargetParts,
        launcher: Option<Box<dyn Launcher>>,
        evaluator: Arc<dyn Evaluator>,
        config: DebuggerConfig,
    ) -> Result<Self>
    {
        let process = Process::new(parts);
        let halt = HaltHandle::new(process.pid, process.target.interrupter());
        let mut session = Self {
            config,
            evaluator,
            launcher,
            process,
            breakpoints: BreakpointManager::new(),
            current_thread: None,
            selected_task: None,
            last_state: None,
            halt,
            subscribers: Vec::new(),
        };
        session.select_initial_thread()?;
        info!(pid = %session.process.pid, launched = session.launcher.is_some(), "session started");
        Ok(session)
    }

    fn select_initial_thread(&mut self) -> Result<()>
    {
        let threads = self.process.target.threads()?;
        let first = threads
            .iter()
            .find(|thread| thread.task.is_some())
            .or_else(|| threads.first())
            .ok_or_else(|| StriderError::NotFound(format!("process {} has no threads", self.process.pid)))?;
        self.snapshot(first.id, None, None);
        self.halt.set_stopped();
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Process
    // ---------------------------------------------------------------------

    /// Pid of the current process; available even after exit.
    pub fn pid(&self) -> ProcessId
    {
        self.process.pid
    }

    pub fn is_exited(&self) -> bool
    {
        self.process.exited
    }

    pub fn config(&self) -> &DebuggerConfig
    {
        &self.config
    }

    /// Symbol cache of the current process, shareable with query threads.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated` after exit.
    pub fn symbols(&self) -> Result<Arc<SymbolCache>>
    {
        self.process.alive()?;
        Ok(Arc::clone(&self.process.symbols))
    }

    /// The state reported by the last stop.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated` after exit.
    pub fn state(&self) -> Result<ExecutionState>
    {
        self.process.alive()?;
        self.last_state
            .clone()
            .ok_or_else(|| StriderError::NotFound("no stop has been recorded".to_string()))
    }

    /// Handle for interrupting runs from another thread.
    pub fn halt_handle(&self) -> HaltHandle
    {
        self.halt.clone()
    }

    /// Interrupt the target if it is running.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated` after exit.
    pub fn halt(&self) -> Result<()>
    {
        self.halt.halt()
    }

    /// Receive [`SessionEvent`]s from now on.
    pub fn subscribe(&mut self) -> SessionEventReceiver
    {
        let (sender, receiver) = mpsc::channel();
        self.subscribers.push(sender);
        receiver
    }

    pub(crate) fn emit(&mut self, event: SessionEvent)
    {
        debug!(event = %event.describe(), "session event");
        self.subscribers.retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    /// Replace the process with a freshly launched one
    ///
    /// Breakpoints are re-resolved against the new image and installed
    /// before anything runs; those that no longer resolve are dropped.
    /// Works after exit.
    ///
    /// ## Errors
    ///
    /// - `AttachRestricted`: the session was attached
    /// - Whatever the launcher reports
    #[instrument(skip(self), fields(pid = %self.process.pid))]
    pub fn restart(&mut self) -> Result<ProcessId>
    {
        let Some(launcher) = self.launcher.as_mut() else {
            return Err(StriderError::AttachRestricted(self.process.pid));
        };
        let parts = launcher.launch()?;
        let mut process = Process::new(parts);

        if !self.process.exited {
            if let Err(err) = self.process.target.detach(true) {
                warn!(pid = %self.process.pid, error = %err, "old process did not detach cleanly");
            }
        }

        let resolver = LocationResolver::new(&process.symbols, self.config.case_insensitive_paths);
        let dropped = self.breakpoints.reinstall(&mut *process.target, &resolver);

        let old = self.process.pid;
        self.process = process;
        self.halt.rebind(self.process.pid, self.process.target.interrupter());
        self.current_thread = None;
        self.selected_task = None;
        self.last_state = None;
        self.select_initial_thread()?;

        let pid = self.process.pid;
        info!(old = %old, new = %pid, dropped = dropped.len(), "process restarted");
        self.emit(SessionEvent::Restarted { pid, dropped });
        Ok(pid)
    }

    /// Release the process, killing it when `kill` is set. A no-op after exit.
    ///
    /// ## Errors
    ///
    /// Whatever the control layer reports.
    #[instrument(skip(self), fields(pid = %self.process.pid))]
    pub fn detach(&mut self, kill: bool) -> Result<()>
    {
        if self.process.exited {
            return Ok(());
        }
        self.process.target.detach(kill)?;
        self.finish_exit(None, None);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Breakpoints
    // ---------------------------------------------------------------------

    /// Resolve and install a breakpoint.
    ///
    /// ## Errors
    ///
    /// - `ProcessTerminated` after exit
    /// - `InvalidArgument`: no location, negative stack depth, bad name
    /// - `NotFound` / `Ambiguous`: resolution failed
    /// - `BreakpointExists`: the address is taken
    #[instrument(skip(self), fields(pid = %self.process.pid))]
    pub fn create_breakpoint(&mut self, spec: BreakpointSpec) -> Result<Breakpoint>
    {
        self.process.alive()?;
        let resolver = LocationResolver::new(&self.process.symbols, self.config.case_insensitive_paths);
        self.breakpoints.create(&mut *self.process.target, &resolver, spec)
    }

    /// Change condition, name, capture options or kind in place.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated`, `NotFound`, `InvalidArgument`.
    pub fn amend_breakpoint(&mut self, update: BreakpointUpdate) -> Result<Breakpoint>
    {
        self.process.alive()?;
        self.breakpoints.amend(update)
    }

    /// Remove a breakpoint, returning it as it was.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated`, `NotFound`.
    pub fn clear_breakpoint(&mut self, id: BreakpointId) -> Result<Breakpoint>
    {
        self.process.alive()?;
        self.breakpoints.clear(&mut *self.process.target, id)
    }

    /// Remove a breakpoint by name.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated`, `NotFound`.
    pub fn clear_breakpoint_by_name(&mut self, name: &str) -> Result<Breakpoint>
    {
        self.process.alive()?;
        self.breakpoints.clear_by_name(&mut *self.process.target, name)
    }

    pub fn breakpoint(&self, id: BreakpointId) -> Result<Breakpoint>
    {
        self.process.alive()?;
        self.breakpoints.get(id)
    }

    pub fn breakpoint_by_name(&self, name: &str) -> Result<Breakpoint>
    {
        self.process.alive()?;
        self.breakpoints.get_by_name(name)
    }

    /// All breakpoints, ordered by id.
    pub fn breakpoints(&self) -> Result<Vec<Breakpoint>>
    {
        self.process.alive()?;
        Ok(self.breakpoints.list())
    }

    // ---------------------------------------------------------------------
    // Threads and tasks
    // ---------------------------------------------------------------------

    fn thread_state_from(&self, info: &ThreadInfo) -> ThreadState
    {
        ThreadState {
            id: info.id,
            pc: info.pc,
            location: self.process.symbols.location_at(info.pc),
            task: info.task,
            breakpoint: self.breakpoints.at(info.pc).cloned(),
        }
    }

    pub(crate) fn current_thread_id(&self) -> Result<ThreadId>
    {
        self.current_thread
            .ok_or_else(|| StriderError::NotFound("no current thread".to_string()))
    }

    pub fn threads(&self) -> Result<Vec<ThreadState>>
    {
        self.process.alive()?;
        Ok(self
            .process
            .target
            .threads()?
            .iter()
            .map(|info| self.thread_state_from(info))
            .collect())
    }

    /// ## Errors
    ///
    /// `InvalidArgument` for a negative id, `NotFound` for an unknown one.
    pub fn thread(&self, id: i64) -> Result<ThreadState>
    {
        let raw = u64::try_from(id).map_err(|_| StriderError::InvalidArgument(format!("invalid thread id {id}")))?;
        self.threads()?
            .into_iter()
            .find(|thread| thread.id.raw() == raw)
            .ok_or_else(|| StriderError::NotFound(format!("thread {id}")))
    }

    /// Make `id` the current thread (and its task the selected task).
    pub fn switch_thread(&mut self, id: i64) -> Result<ThreadState>
    {
        let thread = self.thread(id)?;
        self.current_thread = Some(thread.id);
        self.selected_task = thread.task;
        debug!(thread = %thread.id, "switched thread");
        Ok(thread)
    }

    pub fn tasks(&self) -> Result<Vec<TaskInfo>>
    {
        self.process.alive()?;
        self.process.target.tasks()
    }

    /// Select a task; if it is running, its thread becomes current.
    pub fn switch_task(&mut self, id: TaskId) -> Result<TaskInfo>
    {
        self.process.alive()?;
        let task = self.process.task(id)?;
        self.selected_task = Some(id);
        if let Some(thread) = task.thread {
            self.current_thread = Some(thread);
        }
        debug!(task = %id, "switched task");
        Ok(task)
    }

    /// Registers of the current thread.
    pub fn registers(&self) -> Result<Registers>
    {
        self.process.alive()?;
        self.process.target.read_registers(self.current_thread_id()?)
    }

    // ---------------------------------------------------------------------
    // Stacks and evaluation
    // ---------------------------------------------------------------------

    fn task_stack(&self, task: TaskSelector, max: usize) -> Result<Vec<StackFrame>>
    {
        self.process.alive()?;
        match task {
            TaskSelector::Id(id) => {
                let task = self.process.task(id)?;
                self.process.task_frames(&task, max)
            }
            TaskSelector::Current => {
                if let Some(task) = self.selected_task.and_then(|id| self.process.task(id).ok()) {
                    return self.process.task_frames(&task, max);
                }
                self.process.thread_frames(self.current_thread_id()?, max)
            }
        }
    }

    /// Frame named by `scope`.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated`, or `NotFound` for an unknown task or a frame
    /// past the outermost one.
    pub fn scope_frame(&self, scope: EvalScope) -> Result<StackFrame>
    {
        let max = scope
            .frame
            .checked_add(1)
            .ok_or_else(|| StriderError::InvalidArgument(format!("invalid frame offset {}", scope.frame)))?;
        self.task_stack(scope.task, max)?
            .into_iter()
            .nth(scope.frame)
            .ok_or_else(|| StriderError::NotFound(format!("frame {} is past the outermost frame", scope.frame)))
    }

    fn frame_scope(&self, scope: EvalScope) -> Result<FrameScope<'_>>
    {
        let frame = self.scope_frame(scope)?;
        Ok(FrameScope::new(&*self.process.target, &self.process.symbols, frame))
    }

    /// Up to `depth` frames of a task, innermost first, with arguments and
    /// locals loaded when `load` is given.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for a negative depth; `ProcessTerminated`; `NotFound`
    /// for an unknown task.
    pub fn stacktrace(&self, task: TaskSelector, depth: i64, load: Option<&LoadConfig>) -> Result<Vec<TraceFrame>>
    {
        let depth =
            usize::try_from(depth).map_err(|_| StriderError::InvalidArgument(format!("negative stack depth {depth}")))?;
        let frames = self.task_stack(task, depth)?;
        Ok(frames
            .into_iter()
            .map(|frame| {
                let scope = FrameScope::new(&*self.process.target, &self.process.symbols, frame);
                let (arguments, locals) = if load.is_some() {
                    (scope.load_all(VariableKind::Argument), scope.load_all(VariableKind::Local))
                } else {
                    (Vec::new(), Vec::new())
                };
                TraceFrame {
                    frame: scope.into_frame(),
                    arguments,
                    locals,
                }
            })
            .collect())
    }

    /// Locals of the scope's frame, in declaration order.
    pub fn locals(&self, scope: EvalScope, _load: &LoadConfig) -> Result<Vec<Variable>>
    {
        Ok(self.frame_scope(scope)?.load_all(VariableKind::Local))
    }

    /// Arguments of the scope's frame, in declaration order.
    pub fn function_args(&self, scope: EvalScope, _load: &LoadConfig) -> Result<Vec<Variable>>
    {
        Ok(self.frame_scope(scope)?.load_all(VariableKind::Argument))
    }

    /// Evaluate `expr` in the scope's frame. The result is named after the
    /// expression text.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated`, scope errors, `Evaluation`.
    pub fn eval_variable(&self, scope: EvalScope, expr: &str, load: &LoadConfig) -> Result<Variable>
    {
        let frame_scope = self.frame_scope(scope)?;
        let mut variable = self.evaluator.evaluate(&frame_scope, expr, load)?;
        variable.name = expr.to_string();
        Ok(variable)
    }

    /// Assign the value of `value_expr` to the variable `name`.
    ///
    /// ## Errors
    ///
    /// `NotFound` for an unknown variable, `Evaluation` when the value does
    /// not fit the variable's type.
    #[instrument(skip(self), fields(pid = %self.process.pid))]
    pub fn set_variable(&mut self, scope: EvalScope, name: &str, value_expr: &str) -> Result<()>
    {
        let (address, bytes) = {
            let frame_scope = self.frame_scope(scope)?;
            let info = frame_scope
                .find(name)
                .ok_or_else(|| StriderError::NotFound(format!("could not find symbol value for {name}")))?;
            let value = self.evaluator.evaluate(&frame_scope, value_expr, &LoadConfig::default())?;
            (frame_scope.address_of(&info), encode_value(&info.ty, &value.value)?)
        };
        self.process.target.write_memory(address, &bytes)?;
        debug!(name, %address, "variable set");
        Ok(())
    }

    /// Resolve a location expression relative to the scope's frame.
    ///
    /// ## Errors
    ///
    /// See [`LocationResolver::resolve`].
    pub fn find_location(&self, scope: EvalScope, expr: &str) -> Result<Vec<Location>>
    {
        self.process.alive()?;
        let frame = self.scope_frame(scope).ok();
        let evaluate = |text: &str| -> Result<Variable> {
            let frame = frame
                .clone()
                .ok_or_else(|| StriderError::NotFound(format!("no frame to evaluate {text} in")))?;
            let frame_scope = FrameScope::new(&*self.process.target, &self.process.symbols, frame);
            self.evaluator.evaluate(&frame_scope, text, &LoadConfig::default())
        };
        let ctx = ResolveContext {
            current: frame.as_ref().map(|frame| &frame.location),
            evaluate: Some(&evaluate),
        };
        LocationResolver::new(&self.process.symbols, self.config.case_insensitive_paths).resolve(expr, &ctx)
    }

    // ---------------------------------------------------------------------
    // Disassembly and symbol listings
    // ---------------------------------------------------------------------

    /// The whole function containing `pc`.
    ///
    /// ## Errors
    ///
    /// `NotFound` if no function contains `pc`.
    pub fn disassemble_pc(&self, scope: EvalScope, pc: Address) -> Result<Vec<AsmInstruction>>
    {
        self.process.alive()?;
        let function = self
            .process
            .symbols
            .function_at(pc)
            .ok_or_else(|| StriderError::NotFound(format!("no function contains {pc}")))?;
        self.disassemble_range(scope, function.entry, function.end)
    }

    /// Every instruction in `[start, end)`.
    pub fn disassemble_range(&self, scope: EvalScope, start: Address, end: Address) -> Result<Vec<AsmInstruction>>
    {
        self.process.alive()?;
        let current_pc = self.scope_frame(scope).ok().map(|frame| frame.pc);
        disassemble(
            &self.process.symbols,
            &*self.process.disassembler,
            start,
            end,
            current_pc,
            |address| self.breakpoints.at(address).is_some(),
        )
    }

    /// Function names matching `filter`, sorted.
    pub fn functions(&self, filter: Option<&str>) -> Result<Vec<String>>
    {
        self.process.alive()?;
        let names = self.process.symbols.functions().iter().map(|f| f.name.as_str());
        listing(names, filter)
    }

    /// Source files matching `filter`, sorted.
    pub fn sources(&self, filter: Option<&str>) -> Result<Vec<String>>
    {
        self.process.alive()?;
        listing(self.process.symbols.files().iter().map(String::as_str), filter)
    }

    /// Type names matching `filter`, sorted.
    pub fn types(&self, filter: Option<&str>) -> Result<Vec<String>>
    {
        self.process.alive()?;
        listing(self.process.symbols.types().iter().map(String::as_str), filter)
    }

    // ---------------------------------------------------------------------
    // Stop bookkeeping shared by continue and stepping
    // ---------------------------------------------------------------------

    /// Record a stop of `thread` as the current position.
    pub(crate) fn snapshot(
        &mut self,
        thread: ThreadId,
        hit: Option<BreakpointHit>,
        error: Option<TargetFault>,
    ) -> ExecutionState
    {
        let current_thread = match self.process.target.read_registers(thread) {
            Ok(regs) => Some(self.thread_state_from(&ThreadInfo {
                id: thread,
                pc: regs.pc,
                task: None,
            })),
            Err(err) => {
                debug!(%thread, error = %err, "registers unavailable for stop");
                None
            }
        };
        let task = self.process.task_on(thread);
        let current_thread = current_thread.map(|mut state| {
            state.task = task.as_ref().map(|task| task.id);
            state
        });
        self.current_thread = Some(thread);
        self.selected_task = task.as_ref().map(|task| task.id);

        let state = ExecutionState {
            pid: self.process.pid,
            exited: false,
            exit_status: None,
            error,
            current_thread,
            current_task: task,
            hit,
            auto_resumed: false,
        };
        self.last_state = Some(state.clone());
        state
    }

    /// The run is over and the target is stopped at `state`.
    pub(crate) fn finish_stop(&mut self, state: ExecutionState) -> ExecutionState
    {
        self.halt.set_stopped();
        self.emit(SessionEvent::Stopped {
            pid: self.process.pid,
            thread: state.current_thread.as_ref().map(|thread| thread.id),
            pc: state.pc(),
            breakpoint: state.hit.as_ref().map(|hit| hit.breakpoint.id),
        });
        state
    }

    /// The process is gone.
    pub(crate) fn finish_exit(&mut self, status: Option<i32>, error: Option<TargetFault>) -> ExecutionState
    {
        let pid = self.process.pid;
        self.process.exited = true;
        self.breakpoints.invalidate();
        self.halt.set_exited();
        info!(%pid, ?status, "process exited");
        let state = ExecutionState::gone(pid, status, error);
        self.last_state = Some(state.clone());
        self.emit(SessionEvent::Exited { pid, status });
        state
    }

    /// Terminal state for an exit or kill reported by the target.
    pub(crate) fn exit_from(&mut self, reason: StopReason) -> ExecutionState
    {
        let pid = self.process.pid;
        match reason {
            StopReason::Killed(signal) => self.finish_exit(None, Some(TargetFault::Killed { pid, signal })),
            StopReason::Exited(status) => {
                let error = (status != 0).then_some(TargetFault::ExitStatus { pid, status });
                self.finish_exit(Some(status), error)
            }
            other => {
                warn!(%pid, reason = %other, "unexpected exit reason");
                self.finish_exit(None, None)
            }
        }
    }

    /// Terminal state for a control-layer failure during a run.
    pub(crate) fn control_failure(&mut self, err: StriderError) -> ExecutionState
    {
        warn!(pid = %self.process.pid, error = %err, "target control failed");
        if err.is_terminated() {
            let pid = self.process.pid;
            return self.finish_exit(None, Some(TargetFault::ProcessTerminated(pid)));
        }
        let fault = TargetFault::from(err);
        match self.current_thread {
            Some(thread) => {
                let state = self.snapshot(thread, None, Some(fault));
                self.finish_stop(state)
            }
            None => {
                self.halt.set_stopped();
                let mut state = ExecutionState::gone(self.process.pid, None, Some(fault));
                state.exited = false;
                state
            }
        }
    }
}

fn listing<'a, I>(names: I, filter: Option<&str>) -> Result<Vec<String>>
where
    I: Iterator<Item = &'a str>,
{
    let filter = filter
        .map(|pattern| {
            Regex::new(pattern).map_err(|err| StriderError::InvalidArgument(format!("invalid filter {pattern:?}: {err}")))
        })
        .transpose()?;
    let mut names: Vec<String> = names
        .filter(|name| filter.as_ref().map_or(true, |re| re.is_match(name)))
        .map(str::to_string)
        .collect();
    names.sort();
    names.dedup();
    Ok(names)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_listing_filters_and_sorts()
    {
        let names = ["main.b", "main.a", "runtime.x", "main.a"];
        let listed = listing(names.iter().copied(), Some(r"^main\.")).unwrap();
        assert_eq!(listed, vec!["main.a".to_string(), "main.b".to_string()]);
    }

    #[test]
    fn test_listing_rejects_bad_regex()
    {
        let err = listing(std::iter::empty(), Some("(")).unwrap_err();
        assert_eq!(err.category(), crate::error::ErrorCategory::InvalidArgument);
    }
}
