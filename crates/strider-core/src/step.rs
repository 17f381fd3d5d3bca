//! # Stepping
//!
//! Line and instruction stepping on the current thread.
//!
//! A line step single-steps the current thread and looks at where each
//! instruction lands:
//!
//! - another task took over the thread: run until the original task is back
//! - a deeper frame: run to the return address (or, stepping into a
//!   function with debug information, to the end of its prologue and stop)
//! - a shallower frame: stop if the caller has source, otherwise keep going
//! - a new source line at the starting depth: stop
//!
//! User breakpoints met on the way end the step; tracepoints report and the
//! step carries on.

use tracing::{debug, instrument};

use crate::breakpoints::manager::HitDecision;
use crate::breakpoints::BreakpointHit;
use crate::error::{Result, StriderError, TargetFault};
use crate::events::SessionEvent;
use crate::session::{ExecutionState, Session};
use crate::types::{Address, StopReason, TaskId, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepMode
{
    Over,
    Into,
}

/// Where a line step started, updated as it returns through code without
/// source.
#[derive(Debug)]
struct StepOrigin
{
    task: Option<TaskId>,
    depth: usize,
    line: Option<(Option<String>, u32)>,
}

/// Result of running to an internal trap.
enum Arrival
{
    At(ThreadId),
    Stopped(ExecutionState),
}

impl Session
{
    /// Step over: run to the next source line of the current function.
    ///
    /// ## Errors
    ///
    /// - `ProcessTerminated` after exit
    /// - `NotFound`: no current thread, or it is not at a source line
    ///
    /// Process exit during the step is reported as an exited state.
    #[instrument(skip(self), fields(pid = %self.process.pid))]
    pub fn next(&mut self) -> Result<ExecutionState>
    {
        self.step_line(StepMode::Over)
    }

    /// Step into: like [`next`](Self::next), but stops inside called
    /// functions that have debug information.
    ///
    /// ## Errors
    ///
    /// Same as [`next`](Self::next).
    #[instrument(skip(self), fields(pid = %self.process.pid))]
    pub fn step(&mut self) -> Result<ExecutionState>
    {
        self.step_line(StepMode::Into)
    }

    /// Execute one instruction on the current thread.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated` after exit, `NotFound` without a current thread.
    #[instrument(skip(self), fields(pid = %self.process.pid))]
    pub fn step_instruction(&mut self) -> Result<ExecutionState>
    {
        self.process.alive()?;
        let thread = self.current_thread_id()?;
        self.begin_run();

        let event = match self.process.target.single_step(thread) {
            Ok(event) => event,
            Err(err) => return Ok(self.control_failure(err)),
        };
        debug!(thread = %event.thread, reason = %event.reason, "instruction stepped");
        Ok(match event.reason {
            StopReason::Exited(_) | StopReason::Killed(_) => self.exit_from(event.reason),
            StopReason::Signal(signal) => self.stop_at(event.thread, None, Some(TargetFault::Signal(signal))),
            _ => self.stop_at(event.thread, None, None),
        })
    }

    fn begin_run(&mut self)
    {
        self.halt.set_running();
        self.emit(SessionEvent::Resumed { pid: self.process.pid });
    }

    fn stop_at(&mut self, thread: ThreadId, hit: Option<BreakpointHit>, error: Option<TargetFault>) -> ExecutionState
    {
        let state = self.snapshot(thread, hit, error);
        self.finish_stop(state)
    }

    fn step_line(&mut self, mode: StepMode) -> Result<ExecutionState>
    {
        self.process.alive()?;
        let thread = self.current_thread_id()?;
        let regs = self.process.target.read_registers(thread)?;
        let start = self.process.symbols.location_at(regs.pc);
        if !start.has_source() {
            return Err(StriderError::NotFound(format!("no source line at {}", regs.pc)));
        }

        let mut origin = StepOrigin {
            task: self.process.task_on(thread).map(|task| task.id),
            depth: self.process.depth(&regs, self.config.max_unwind_depth),
            line: Some((start.file.clone(), start.line)),
        };
        debug!(?mode, ?origin, "line step started");

        self.begin_run();
        match self.step_loop(thread, mode, &mut origin) {
            Ok(state) => Ok(state),
            Err(err) => Ok(self.control_failure(err)),
        }
    }

    fn step_loop(&mut self, mut thread: ThreadId, mode: StepMode, origin: &mut StepOrigin) -> Result<ExecutionState>
    {
        let max = self.config.max_unwind_depth;
        loop {
            let event = self.process.target.single_step(thread)?;
            thread = event.thread;
            match event.reason {
                StopReason::Exited(_) | StopReason::Killed(_) => return Ok(self.exit_from(event.reason)),
                StopReason::Interrupted | StopReason::EmbeddedTrap => return Ok(self.stop_at(thread, None, None)),
                StopReason::Signal(signal) => {
                    return Ok(self.stop_at(thread, None, Some(TargetFault::Signal(signal))));
                }
                StopReason::Trap(pc) => {
                    if let Some(state) = self.user_trap(thread, pc) {
                        return Ok(state);
                    }
                }
                StopReason::SingleStep => {}
            }

            if let Some(task) = origin.task {
                if self.process.task_on(thread).map(|info| info.id) != Some(task) {
                    let Ok(info) = self.process.task(task) else {
                        debug!(%task, "stepped task is gone");
                        return Ok(self.stop_at(thread, None, None));
                    };
                    debug!(%task, pc = %info.pc, "task switched away, waiting for it");
                    match self.run_to(info.pc, Some(task), None)? {
                        Arrival::At(at) => thread = at,
                        Arrival::Stopped(state) => return Ok(state),
                    }
                }
            }

            let mut regs = self.process.target.read_registers(thread)?;
            let depth = self.process.depth(&regs, max);

            if depth > origin.depth {
                if mode == StepMode::Into {
                    if let Some(function) = self.process.symbols.function_at(regs.pc).filter(|f| f.has_debug_info()) {
                        let body = self.process.symbols.prologue_end(&function);
                        if regs.pc != body {
                            match self.run_to(body, origin.task, Some(depth))? {
                                Arrival::At(at) => thread = at,
                                Arrival::Stopped(state) => return Ok(state),
                            }
                        }
                        debug!(function = %function.name, "stepped into function");
                        return Ok(self.stop_at(thread, None, None));
                    }
                }
                let return_address = self.process.return_address(&regs)?;
                debug!(%return_address, "stepping over call");
                match self.run_to(return_address, origin.task, Some(origin.depth))? {
                    Arrival::At(at) => thread = at,
                    Arrival::Stopped(state) => return Ok(state),
                }
                regs = self.process.target.read_registers(thread)?;
            }

            let depth = self.process.depth(&regs, max);
            let location = self.process.symbols.location_at(regs.pc);

            if depth < origin.depth {
                if location.has_source() {
                    return Ok(self.stop_at(thread, None, None));
                }
                debug!(pc = %regs.pc, "returned into code without source");
                origin.depth = depth;
                origin.line = None;
                continue;
            }

            if location.has_source() {
                let line = (location.file.clone(), location.line);
                if origin.line.as_ref() != Some(&line) {
                    return Ok(self.stop_at(thread, None, None));
                }
            }
        }
    }

    /// Handle a trap met while stepping; `Some` ends the step.
    fn user_trap(&mut self, thread: ThreadId, pc: Address) -> Option<ExecutionState>
    {
        if self.breakpoints.at(pc).is_none() {
            return None;
        }
        match self.on_trap(thread, pc) {
            Ok(HitDecision::Stop(hit)) => Some(self.stop_at(thread, Some(*hit), None)),
            Ok(HitDecision::Trace(hit)) => {
                let mut state = self.snapshot(thread, Some(*hit), None);
                state.auto_resumed = true;
                self.report_tracepoint(&state);
                None
            }
            Ok(HitDecision::Transparent) => None,
            Err(fault) => Some(self.stop_at(thread, None, Some(fault))),
        }
    }

    /// Resume until `task` reaches `address` with at most `max_depth` frames.
    fn run_to(
        &mut self,
        address: Address,
        task: Option<TaskId>,
        max_depth: Option<usize>,
    ) -> Result<Arrival>
    {
        self.breakpoints.add_internal(&mut *self.process.target, address)?;
        let outcome = self.run_until(address, task, max_depth);
        if let Err(err) = self.breakpoints.remove_internal(&mut *self.process.target, address) {
            debug!(%address, error = %err, "internal trap not removed");
        }
        outcome
    }

    fn run_until(
        &mut self,
        address: Address,
        task: Option<TaskId>,
        max_depth: Option<usize>,
    ) -> Result<Arrival>
    {
        loop {
            self.process.target.resume()?;
            let event = self.process.target.wait()?;
            let thread = event.thread;
            match event.reason {
                StopReason::Trap(pc) => {
                    if let Some(state) = self.user_trap(thread, pc) {
                        return Ok(Arrival::Stopped(state));
                    }
                    if pc == address && self.arrived(thread, task, max_depth)? {
                        return Ok(Arrival::At(thread));
                    }
                }
                StopReason::Exited(_) | StopReason::Killed(_) => {
                    return Ok(Arrival::Stopped(self.exit_from(event.reason)));
                }
                StopReason::Signal(signal) => {
                    return Ok(Arrival::Stopped(self.stop_at(
                        thread,
                        None,
                        Some(TargetFault::Signal(signal)),
                    )));
                }
                StopReason::EmbeddedTrap | StopReason::Interrupted | StopReason::SingleStep => {
                    return Ok(Arrival::Stopped(self.stop_at(thread, None, None)));
                }
            }
        }
    }

    fn arrived(&self, thread: ThreadId, task: Option<TaskId>, max_depth: Option<usize>) -> Result<bool>
    {
        if task.is_some() && self.process.task_on(thread).map(|info| info.id) != task {
            return Ok(false);
        }
        let Some(max_depth) = max_depth else {
            return Ok(true);
        };
        let regs = self.process.target.read_registers(thread)?;
        Ok(self.process.depth(&regs, self.config.max_unwind_depth) <= max_depth)
    }
}
