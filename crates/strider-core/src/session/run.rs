//! # Continue Orchestration
//!
//! [`ContinueStream`] drives resume/wait cycles and turns each reported stop
//! into an [`ExecutionState`]. [`HaltHandle`] lets another thread interrupt
//! a running target.

use std::iter::FusedIterator;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, info, instrument};

use super::process::Process;
use super::{ExecutionState, Session};
use crate::breakpoints::manager::{HitDecision, HitOperations};
use crate::config::LoadConfig;
use crate::error::{Result, StriderError, TargetFault};
use crate::eval::{EvalContext, Evaluator, FrameScope};
use crate::events::SessionEvent;
use crate::target::Interrupt;
use crate::types::{Address, ProcessId, StackFrame, StopReason, TaskInfo, ThreadId, Variable};

const STOPPED: u8 = 0;
const RUNNING: u8 = 1;
const EXITED: u8 = 2;

struct HaltShared
{
    state: AtomicU8,
    pid: AtomicU32,
    interrupter: RwLock<Arc<dyn Interrupt>>,
}

/// Interrupts a running target from any thread
///
/// Cloneable and `Send + Sync`. A halt while the target is stopped does
/// nothing; a halt after the process exited is `ProcessTerminated`.
///
/// ## Example
///
/// ```rust,no_run
/// # fn demo(session: &mut strider_core::session::Session) {
/// let handle = session.halt_handle();
/// std::thread::spawn(move || {
///     while !handle.is_running() {
///         std::thread::yield_now();
///     }
///     handle.halt().ok();
/// });
/// let state = session.continue_execution().terminal();
/// # }
/// ```
#[derive(Clone)]
pub struct HaltHandle
{
    shared: Arc<HaltShared>,
}

impl std::fmt::Debug for HaltHandle
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("HaltHandle")
            .field("pid", &self.pid())
            .field("state", &self.shared.state.load(Ordering::SeqCst))
            .finish()
    }
}

impl HaltHandle
{
    pub(crate) fn new(pid: ProcessId, interrupter: Arc<dyn Interrupt>) -> Self
    {
        Self {
            shared: Arc::new(HaltShared {
                state: AtomicU8::new(STOPPED),
                pid: AtomicU32::new(pid.0),
                interrupter: RwLock::new(interrupter),
            }),
        }
    }

    /// Ask the running target to stop.
    ///
    /// ## Errors
    ///
    /// `ProcessTerminated` after exit; whatever the interrupter reports.
    pub fn halt(&self) -> Result<()>
    {
        match self.shared.state.load(Ordering::SeqCst) {
            EXITED => Err(StriderError::ProcessTerminated(self.pid())),
            RUNNING => {
                debug!(pid = %self.pid(), "halt requested");
                let interrupter = self
                    .shared
                    .interrupter
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                interrupter.interrupt()
            }
            _ => Ok(()),
        }
    }

    /// Whether a continue or step is in flight.
    pub fn is_running(&self) -> bool
    {
        self.shared.state.load(Ordering::SeqCst) == RUNNING
    }

    /// Process the handle currently targets.
    pub fn pid(&self) -> ProcessId
    {
        ProcessId(self.shared.pid.load(Ordering::SeqCst))
    }

    pub(crate) fn set_running(&self)
    {
        self.shared.state.store(RUNNING, Ordering::SeqCst);
    }

    pub(crate) fn set_stopped(&self)
    {
        self.shared.state.store(STOPPED, Ordering::SeqCst);
    }

    pub(crate) fn set_exited(&self)
    {
        self.shared.state.store(EXITED, Ordering::SeqCst);
    }

    /// Point the handle at a new process.
    pub(crate) fn rebind(&self, pid: ProcessId, interrupter: Arc<dyn Interrupt>)
    {
        *self
            .shared
            .interrupter
            .write()
            .unwrap_or_else(PoisonError::into_inner) = interrupter;
        self.shared.pid.store(pid.0, Ordering::SeqCst);
        self.set_stopped();
    }
}

/// States produced by one continue
///
/// Yields zero or more tracepoint states (`auto_resumed`), then exactly one
/// terminal state, then nothing. Each call to `next` resumes the target, so
/// the stream only advances as fast as it is consumed.
#[derive(Debug)]
pub struct ContinueStream<'s>
{
    session: &'s mut Session,
    done: bool,
}

impl<'s> ContinueStream<'s>
{
    pub(crate) fn new(session: &'s mut Session) -> Self
    {
        Self { session, done: false }
    }

    /// Run to the terminal state, discarding tracepoint states.
    pub fn terminal(mut self) -> ExecutionState
    {
        let mut last = None;
        for state in self.by_ref() {
            last = Some(state);
        }
        last.unwrap_or_else(|| self.session.terminated_state())
    }
}

impl Iterator for ContinueStream<'_>
{
    type Item = ExecutionState;

    fn next(&mut self) -> Option<ExecutionState>
    {
        if self.done {
            return None;
        }
        let state = self.session.continue_cycle();
        self.done = state.is_terminal();
        Some(state)
    }
}

impl FusedIterator for ContinueStream<'_> {}

impl Drop for ContinueStream<'_>
{
    fn drop(&mut self)
    {
        // Abandoned after a tracepoint: the target is parked on it.
        if !self.done && !self.session.process.exited {
            self.session.halt.set_stopped();
        }
    }
}

/// Access to the stopped target for breakpoint hit processing.
pub(crate) struct HitContext<'a>
{
    pub process: &'a Process,
    pub evaluator: &'a dyn Evaluator,
}

impl HitContext<'_>
{
    fn innermost(&self, thread: ThreadId) -> Result<FrameScope<'_>>
    {
        let frame = self.process.innermost_frame(thread)?;
        Ok(FrameScope::new(&*self.process.target, &self.process.symbols, frame))
    }
}

impl HitOperations for HitContext<'_>
{
    fn evaluate_condition(&self, thread: ThreadId, expr: &str) -> Result<bool>
    {
        let scope = self.innermost(thread)?;
        let result = self.evaluator.evaluate(&scope, expr, &LoadConfig::shallow())?;
        result
            .value
            .as_bool()
            .ok_or_else(|| StriderError::Evaluation(format!("condition {expr:?} is not boolean: {}", result.value)))
    }

    fn task_of(&self, thread: ThreadId) -> Option<TaskInfo>
    {
        self.process.task_on(thread)
    }

    fn capture_stack(&self, thread: ThreadId, depth: usize) -> Vec<StackFrame>
    {
        self.process.thread_frames(thread, depth).unwrap_or_else(|err| {
            debug!(%thread, error = %err, "stack capture failed");
            Vec::new()
        })
    }

    fn load_variable(&self, thread: ThreadId, name: &str) -> Variable
    {
        self.innermost(thread)
            .and_then(|scope| scope.lookup(name))
            .unwrap_or_else(|err| Variable::unreadable(name, err.to_string()))
    }
}

impl Session
{
    /// Resume the target and report what happens.
    ///
    /// On an exited process the stream yields a single state carrying
    /// `ProcessTerminated`.
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// # fn demo(session: &mut strider_core::session::Session) {
    /// for state in session.continue_execution() {
    ///     if let Some(hit) = &state.hit {
    ///         println!("{} hit, {:?}", hit.breakpoint, hit.variables);
    ///     }
    /// }
    /// # }
    /// ```
    pub fn continue_execution(&mut self) -> ContinueStream<'_>
    {
        ContinueStream::new(self)
    }

    /// State reported for any run request on an exited process.
    pub(crate) fn terminated_state(&self) -> ExecutionState
    {
        let pid = self.process.pid;
        ExecutionState::gone(pid, None, Some(TargetFault::ProcessTerminated(pid)))
    }

    /// Let the breakpoint manager judge a trap stop.
    pub(crate) fn on_trap(&mut self, thread: ThreadId, pc: Address) -> std::result::Result<HitDecision, TargetFault>
    {
        let ctx = HitContext {
            process: &self.process,
            evaluator: &*self.evaluator,
        };
        self.breakpoints
            .on_hit(&ctx, thread, pc, self.config.condition_error_policy)
    }

    /// One resume/wait cycle, up to the next reportable stop.
    #[instrument(level = "debug", skip(self), fields(pid = %self.process.pid))]
    pub(crate) fn continue_cycle(&mut self) -> ExecutionState
    {
        if self.process.exited {
            return self.terminated_state();
        }
        self.halt.set_running();
        self.emit(SessionEvent::Resumed { pid: self.process.pid });

        loop {
            if let Err(err) = self.process.target.resume() {
                return self.control_failure(err);
            }
            let event = match self.process.target.wait() {
                Ok(event) => event,
                Err(err) => return self.control_failure(err),
            };
            let thread = event.thread;
            debug!(%thread, reason = %event.reason, "target stopped");

            match event.reason {
                StopReason::Trap(pc) => match self.on_trap(thread, pc) {
                    Ok(HitDecision::Transparent) => {}
                    Ok(HitDecision::Trace(hit)) => {
                        let mut state = self.snapshot(thread, Some(*hit), None);
                        state.auto_resumed = true;
                        self.report_tracepoint(&state);
                        return state;
                    }
                    Ok(HitDecision::Stop(hit)) => {
                        let state = self.snapshot(thread, Some(*hit), None);
                        return self.finish_stop(state);
                    }
                    Err(fault) => {
                        let state = self.snapshot(thread, None, Some(fault));
                        return self.finish_stop(state);
                    }
                },
                StopReason::Exited(_) | StopReason::Killed(_) => return self.exit_from(event.reason),
                StopReason::Signal(signal) => {
                    let state = self.snapshot(thread, None, Some(TargetFault::Signal(signal)));
                    return self.finish_stop(state);
                }
                StopReason::EmbeddedTrap | StopReason::Interrupted | StopReason::SingleStep => {
                    let state = self.snapshot(thread, None, None);
                    return self.finish_stop(state);
                }
            }
        }
    }

    /// Publish a tracepoint state without stopping.
    pub(crate) fn report_tracepoint(&mut self, state: &ExecutionState)
    {
        let Some(hit) = &state.hit else {
            return;
        };
        info!(
            breakpoint = %hit.breakpoint.id,
            thread = %hit.thread,
            hits = hit.breakpoint.total_hits,
            "tracepoint"
        );
        self.emit(SessionEvent::Tracepoint {
            pid: self.process.pid,
            thread: hit.thread,
            breakpoint: hit.breakpoint.id,
        });
    }
}
