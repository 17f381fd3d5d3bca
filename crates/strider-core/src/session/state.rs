//! Snapshots produced at each stop.

use crate::breakpoints::{Breakpoint, BreakpointHit};
use crate::error::TargetFault;
use crate::types::{Address, Location, ProcessId, TaskId, TaskInfo, ThreadId};

/// One thread as seen at a stop.
#[derive(Debug, Clone)]
pub struct ThreadState
{
    pub id: ThreadId,
    pub pc: Address,
    pub location: Location,
    /// Task the thread is running, if the target has tasks.
    pub task: Option<TaskId>,
    /// Breakpoint the thread is stopped exactly on.
    pub breakpoint: Option<Breakpoint>,
}

/// What the target looked like after a continue or step
///
/// Immutable once produced. A continue yields one of these per reported
/// tracepoint hit (`auto_resumed` set) and exactly one terminal state.
#[derive(Debug, Clone)]
pub struct ExecutionState
{
    pub pid: ProcessId,
    /// The process is gone.
    pub exited: bool,
    /// Exit status, when it exited normally or with a status.
    pub exit_status: Option<i32>,
    /// What went wrong while the target ran.
    pub error: Option<TargetFault>,
    /// The thread that stopped (or is selected).
    pub current_thread: Option<ThreadState>,
    /// The task that stopped (or is selected).
    pub current_task: Option<TaskInfo>,
    /// Breakpoint or tracepoint hit that produced this state.
    pub hit: Option<BreakpointHit>,
    /// The target kept running after this state was reported.
    pub auto_resumed: bool,
}

impl ExecutionState
{
    /// State of a process that is no longer there.
    pub(crate) fn gone(pid: ProcessId, exit_status: Option<i32>, error: Option<TargetFault>) -> Self
    {
        Self {
            pid,
            exited: true,
            exit_status,
            error,
            current_thread: None,
            current_task: None,
            hit: None,
            auto_resumed: false,
        }
    }

    /// Program counter of the current thread.
    pub fn pc(&self) -> Option<Address>
    {
        self.current_thread.as_ref().map(|thread| thread.pc)
    }

    /// Source line of the current thread (0 when unknown).
    pub fn line(&self) -> u32
    {
        self.current_thread.as_ref().map_or(0, |thread| thread.location.line)
    }

    /// Function the current thread is in.
    pub fn function_name(&self) -> Option<&str>
    {
        self.current_thread.as_ref().and_then(|thread| thread.location.function_name())
    }

    /// Whether this is the last state of a continue.
    pub fn is_terminal(&self) -> bool
    {
        !self.auto_resumed
    }
}
