//! # Error Types
//!
//! Error handling for the debugger core.
//!
//! We use `thiserror` to generate `Error` implementations and messages. Two
//! types live here:
//!
//! - [`StriderError`]: returned synchronously by every fallible operation.
//! - [`TargetFault`]: a clonable error carried inside an
//!   [`ExecutionState`](crate::session::ExecutionState) when something goes
//!   wrong while the target is running.

use thiserror::Error;

use crate::types::{Address, ProcessId};

/// Main error type for debugger operations
///
/// ## Error Categories
///
/// 1. **Lookup errors**: NotFound, Ambiguous
/// 2. **Request errors**: InvalidArgument, BreakpointExists
/// 3. **Lifecycle errors**: ProcessTerminated, AttachRestricted
/// 4. **Evaluation errors**: Evaluation
/// 5. **Control layer errors**: MemoryAccess, Target, Io
#[derive(Error, Debug)]
pub enum StriderError
{
    /// A location, breakpoint, thread, task or frame does not exist
    ///
    /// This happens when:
    /// - A location expression matches no file or function
    /// - A line has no code
    /// - A breakpoint id or name is unknown
    /// - A frame offset is past the outermost frame
    #[error("not found: {0}")]
    NotFound(String),

    /// A location expression matched more than one place
    ///
    /// `candidates` lists at most five of the matches.
    #[error("location \"{location}\" ambiguous: {}", candidates.join(", "))]
    Ambiguous
    {
        /// The expression as written.
        location: String,
        /// Matching files or functions.
        candidates: Vec<String>,
    },

    /// Malformed request
    ///
    /// Examples:
    /// - Malformed location syntax
    /// - Negative stack depth, frame offset or thread id
    /// - Invalid regex filter
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A breakpoint already occupies the resolved address.
    #[error("breakpoint {id} already exists at {address}")]
    BreakpointExists
    {
        /// Identifier of the existing breakpoint.
        id: u64,
        /// Address both requests resolved to.
        address: Address,
    },

    /// The process has exited or was detached
    ///
    /// Once returned, every operation except `pid`, `restart`, `detach` and
    /// `halt_handle` keeps returning it.
    #[error("process {0} has exited or was detached")]
    ProcessTerminated(ProcessId),

    /// Restart was requested on a process that was attached rather than launched.
    #[error("cannot restart process {0}: it was attached, not launched")]
    AttachRestricted(ProcessId),

    /// An expression or breakpoint condition failed to evaluate.
    #[error("evaluation failed: {0}")]
    Evaluation(String),

    /// Target memory could not be read or written.
    #[error("memory access failed at {address}: {details}")]
    MemoryAccess
    {
        /// First address of the failed access.
        address: Address,
        /// What went wrong.
        details: String,
    },

    /// The control layer reported a failure.
    #[error("target error: {0}")]
    Target(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`StriderError`].
///
/// ```rust
/// use strider_core::error::{ErrorCategory, StriderError};
///
/// let err = StriderError::NotFound("main.go:99".into());
/// assert_eq!(err.category(), ErrorCategory::NotFound);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory
{
    NotFound,
    Ambiguous,
    InvalidArgument,
    AlreadyExists,
    ProcessTerminated,
    AttachRestricted,
    Evaluation,
    Target,
}

impl StriderError
{
    /// Which part of the taxonomy this error belongs to.
    pub fn category(&self) -> ErrorCategory
    {
        match self {
            StriderError::NotFound(_) => ErrorCategory::NotFound,
            StriderError::Ambiguous { .. } => ErrorCategory::Ambiguous,
            StriderError::InvalidArgument(_) => ErrorCategory::InvalidArgument,
            StriderError::BreakpointExists { .. } => ErrorCategory::AlreadyExists,
            StriderError::ProcessTerminated(_) => ErrorCategory::ProcessTerminated,
            StriderError::AttachRestricted(_) => ErrorCategory::AttachRestricted,
            StriderError::Evaluation(_) => ErrorCategory::Evaluation,
            StriderError::MemoryAccess { .. } | StriderError::Target(_) | StriderError::Io(_) => ErrorCategory::Target,
        }
    }

    /// Shorthand for `matches!(err, StriderError::ProcessTerminated(_))`.
    pub fn is_terminated(&self) -> bool
    {
        matches!(self, StriderError::ProcessTerminated(_))
    }
}

/// Error carried in an execution state
///
/// Unlike [`StriderError`] this is `Clone`, so states can be stored and
/// handed out repeatedly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TargetFault
{
    /// The process exited with a non-zero status.
    #[error("process {pid} has exited with status {status}")]
    ExitStatus
    {
        /// Process that exited.
        pid: ProcessId,
        /// Exit status.
        status: i32,
    },

    /// The process was killed by a signal.
    #[error("process {pid} was killed by signal {signal}")]
    Killed
    {
        /// Process that died.
        pid: ProcessId,
        /// Terminating signal.
        signal: i32,
    },

    /// The process stopped on a non-fatal signal.
    #[error("stopped by signal {0}")]
    Signal(i32),

    /// The target stopped on a trap the debugger has no record of.
    #[error("stopped at {0} but no breakpoint is installed there")]
    UnknownBreakpoint(Address),

    /// Continue was requested after the process exited.
    #[error("process {0} has exited or was detached")]
    ProcessTerminated(ProcessId),

    /// A breakpoint condition failed to evaluate.
    #[error("error evaluating condition of breakpoint {id}: {message}")]
    Condition
    {
        /// Breakpoint whose condition failed.
        id: u64,
        /// Evaluation error message.
        message: String,
    },

    /// Any other error raised while the target was running.
    #[error("{0}")]
    Internal(String),
}

impl From<StriderError> for TargetFault
{
    fn from(err: StriderError) -> Self
    {
        match err {
            StriderError::ProcessTerminated(pid) => TargetFault::ProcessTerminated(pid),
            other => TargetFault::Internal(other.to_string()),
        }
    }
}

/// Convenience type alias for `Result<T, StriderError>`
///
/// ```rust
/// use strider_core::error::Result;
/// fn foo() -> Result<()>
/// {
///     Ok(())
/// }
/// ```
pub type Result<T> = std::result::Result<T, StriderError>;
