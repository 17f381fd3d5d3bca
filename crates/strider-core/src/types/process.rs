//! Process, thread, and task types.

use std::fmt;

use super::Address;

/// Process identifier (PID)
///
/// A restart hands out a fresh `ProcessId`; nothing keyed by the old value
/// survives it.
///
/// ## Example
///
/// ```rust
/// use strider_core::types::ProcessId;
///
/// let pid = ProcessId::from(4242);
/// assert_eq!(u32::from(pid), 4242);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(pub u32);

impl From<u32> for ProcessId
{
    fn from(pid: u32) -> Self
    {
        ProcessId(pid)
    }
}

impl From<ProcessId> for u32
{
    fn from(pid: ProcessId) -> Self
    {
        pid.0
    }
}

impl fmt::Display for ProcessId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Thread identifier
///
/// An OS-level execution context inside the target. The numeric value is
/// whatever the control layer uses natively (a TID on Linux, a thread port on
/// macOS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl ThreadId
{
    /// Raw `u64` representation of the thread identifier.
    ///
    /// ```rust
    /// use strider_core::types::ThreadId;
    ///
    /// assert_eq!(ThreadId::from(17).raw(), 17);
    /// ```
    #[must_use]
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for ThreadId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for ThreadId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Task identifier
///
/// A task is a runtime-scheduled unit of execution (a goroutine, a green
/// thread) that may or may not be running on an OS thread at a given stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

impl TaskId
{
    /// Raw `u64` representation of the task identifier.
    #[must_use]
    pub fn raw(&self) -> u64
    {
        self.0
    }
}

impl From<u64> for TaskId
{
    fn from(value: u64) -> Self
    {
        Self(value)
    }
}

impl fmt::Display for TaskId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0)
    }
}

/// Why `TargetControl::wait` (or a single step) returned
///
/// ## State Transitions
///
/// - resume → `Trap(addr)`: a thread reached a debugger-installed trap at `addr`;
///   the thread's PC is reported *at* `addr` (the control layer rewinds it)
/// - resume → `EmbeddedTrap`: the program executed a trap instruction that was
///   compiled into it; the PC is past that instruction
/// - single step → `SingleStep`
/// - resume → `Interrupted`: a halt request was delivered
/// - resume → `Signal(n)`: a non-fatal signal stopped the process
/// - any → `Exited(code)` / `Killed(signal)`: the process is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason
{
    /// Stopped on a debugger-owned trap at the given address.
    Trap(Address),
    /// Stopped on a trap instruction that is part of the program itself.
    EmbeddedTrap,
    /// A single-step request completed.
    SingleStep,
    /// Stopped because an interrupt (halt) was requested.
    Interrupted,
    /// Stopped by a non-fatal signal.
    Signal(i32),
    /// Process exited with the given status code.
    Exited(i32),
    /// Process was terminated by the given signal.
    Killed(i32),
}

impl StopReason
{
    /// Whether the process is gone after this stop.
    #[must_use]
    pub const fn is_exit(self) -> bool
    {
        matches!(self, StopReason::Exited(_) | StopReason::Killed(_))
    }
}

impl fmt::Display for StopReason
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            StopReason::Trap(addr) => write!(f, "hit trap at {addr}"),
            StopReason::EmbeddedTrap => write!(f, "hit embedded trap instruction"),
            StopReason::SingleStep => write!(f, "single step complete"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::Signal(sig) => write!(f, "stopped by signal {sig}"),
            StopReason::Exited(code) => write!(f, "exited with status {code}"),
            StopReason::Killed(sig) => write!(f, "killed by signal {sig}"),
        }
    }
}

/// A stop reported by the control layer, attributed to one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopEvent
{
    /// Thread that caused (or observed) the stop.
    pub thread: ThreadId,
    /// What happened.
    pub reason: StopReason,
}

impl StopEvent
{
    /// Build a stop event.
    #[must_use]
    pub const fn new(thread: ThreadId, reason: StopReason) -> Self
    {
        Self { thread, reason }
    }
}

/// Scheduling status of a task at the last stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus
{
    /// Currently executing on a thread.
    Running,
    /// Ready to run, waiting for a thread.
    Runnable,
    /// Blocked on something (channel, lock, timer).
    Waiting,
}

/// Snapshot of one task, taken at a stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo
{
    /// Task identity.
    pub id: TaskId,
    /// Where the task resumes (or is executing, if running).
    pub pc: Address,
    /// Saved stack pointer.
    pub sp: Address,
    /// Saved frame pointer.
    pub fp: Address,
    /// Entry point the task was started at.
    pub start_pc: Address,
    /// Thread the task is running on, if any.
    pub thread: Option<ThreadId>,
    /// Scheduling status.
    pub status: TaskStatus,
}

/// Snapshot of one OS thread, taken at a stop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo
{
    /// Thread identity.
    pub id: ThreadId,
    /// Current program counter.
    pub pc: Address,
    /// Task the thread is executing, if the runtime has tasks.
    pub task: Option<TaskId>,
}

/// CPU architecture of the target
///
/// Selects the frame layout the unwinder expects: on both supported
/// architectures the frame pointer addresses a `(saved fp, return address)`
/// pair, but before the frame is set up the return address lives at the stack
/// pointer on x86-64 and in the link register on ARM64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture
{
    /// 64-bit ARM.
    Arm64,
    /// 64-bit x86.
    X86_64,
    /// Anything else; unwinding falls back to frame pointers only.
    Unknown(&'static str),
}

impl Architecture
{
    /// Architecture of the machine running the debugger.
    #[must_use]
    pub const fn current() -> Self
    {
        #[cfg(target_arch = "aarch64")]
        {
            Architecture::Arm64
        }

        #[cfg(target_arch = "x86_64")]
        {
            Architecture::X86_64
        }

        #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
        {
            Architecture::Unknown(std::env::consts::ARCH)
        }
    }

    /// Size of a pointer in bytes for this architecture.
    #[must_use]
    pub const fn pointer_size_bytes(self) -> u8
    {
        8
    }

    /// DWARF-style index of the link register in `Registers::general`, if any.
    #[must_use]
    pub const fn link_register(self) -> Option<usize>
    {
        match self {
            Architecture::Arm64 => Some(30),
            Architecture::X86_64 | Architecture::Unknown(_) => None,
        }
    }
}

impl fmt::Display for Architecture
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Architecture::Arm64 => write!(f, "arm64"),
            Architecture::X86_64 => write!(f, "x86_64"),
            Architecture::Unknown(name) => write!(f, "{name}"),
        }
    }
}
