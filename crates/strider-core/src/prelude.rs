//! Common module for library exports

pub use crate::breakpoints::{
    Breakpoint, BreakpointBuilder, BreakpointHit, BreakpointId, BreakpointKind, BreakpointSpec, BreakpointUpdate,
};
pub use crate::config::{ConditionErrorPolicy, DebuggerConfig, LoadConfig};
pub use crate::error::{ErrorCategory, Result, StriderError, TargetFault};
pub use crate::eval::{EvalContext, EvalScope, Evaluator, TaskSelector};
pub use crate::events::SessionEvent;
pub use crate::session::{ContinueStream, ExecutionState, HaltHandle, Session, ThreadState};
pub use crate::target::{Launcher, TargetControl, TargetParts};
pub use crate::types::{
    Address, Location, ProcessId, StackFrame, StopReason, TaskId, TaskInfo, ThreadId, TraceFrame, Value, Variable,
};
