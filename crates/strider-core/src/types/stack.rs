//! Stack frame types.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::symbols::{Function, Location, VariableInfo};
use super::variables::Variable;
use super::{Address, TaskId, ThreadId};

/// Indicates how reliable a frame's unwind data is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus
{
    /// Recovered from the saved frame-pointer chain.
    Complete,
    /// Recovered from the stack pointer or link register before the frame was
    /// set up (may be inaccurate if the prologue pushed anything else).
    Heuristic,
}

/// One frame of a task's call stack
///
/// `index` 0 is the innermost frame. Arguments and locals are fetched from
/// the symbol service on first use and kept for the lifetime of the frame.
#[derive(Debug, Clone)]
pub struct StackFrame
{
    /// Position in the trace (0 = innermost).
    pub index: usize,
    /// Owning task, when the target has tasks.
    pub task: Option<TaskId>,
    /// Thread the task was running on, if any.
    pub thread: Option<ThreadId>,
    /// Program counter of the frame (return address for callers).
    pub pc: Address,
    /// Stack pointer snapshot.
    pub sp: Address,
    /// Frame pointer snapshot.
    pub fp: Address,
    /// Canonical frame address: the caller's stack pointer before the call.
    pub cfa: Address,
    /// Where this frame returns to, if known.
    pub return_address: Option<Address>,
    /// Source position of the frame.
    pub location: Location,
    /// Reliability indicator.
    pub status: FrameStatus,
    variables: OnceCell<Arc<[VariableInfo]>>,
}

impl StackFrame
{
    /// Build a frame with an empty variable cache.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        task: Option<TaskId>,
        thread: Option<ThreadId>,
        pc: Address,
        sp: Address,
        fp: Address,
        cfa: Address,
        return_address: Option<Address>,
        location: Location,
        status: FrameStatus,
    ) -> Self
    {
        Self {
            index,
            task,
            thread,
            pc,
            sp,
            fp,
            cfa,
            return_address,
            location,
            status,
            variables: OnceCell::new(),
        }
    }

    /// Function executing in this frame.
    pub fn function(&self) -> Option<&Arc<Function>>
    {
        self.location.function.as_ref()
    }

    /// Variable descriptors of the frame, computed once.
    pub fn variables_with<F>(&self, load: F) -> Arc<[VariableInfo]>
    where
        F: FnOnce() -> Vec<VariableInfo>,
    {
        self.variables.get_or_init(|| Arc::from(load())).clone()
    }
}

/// A frame together with its loaded arguments and locals.
#[derive(Debug, Clone)]
pub struct TraceFrame
{
    /// The frame.
    pub frame: StackFrame,
    /// Arguments, in declaration order.
    pub arguments: Vec<Variable>,
    /// Locals, in declaration order.
    pub locals: Vec<Variable>,
}
