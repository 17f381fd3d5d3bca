//! # Types
//!
//! Target-agnostic types used throughout the debugger core.
//!
//! These types describe the target (processes, threads, tasks, registers) and
//! the symbol data the core reasons about (functions, line tables, locations,
//! frames and variables) without committing to any particular control layer
//! or object-file format.

pub mod address;
pub mod process;
pub mod registers;
pub mod stack;
pub mod symbols;
pub mod variables;

pub use address::Address;
pub use process::{Architecture, ProcessId, StopEvent, StopReason, TaskId, TaskInfo, TaskStatus, ThreadId, ThreadInfo};
pub use registers::{RegisterId, Registers};
pub use stack::{FrameStatus, StackFrame, TraceFrame};
pub use symbols::{Function, LineEntry, Location, TypeInfo, TypeKind, VarLocation, VariableInfo, VariableKind};
pub use variables::{Value, Variable};
