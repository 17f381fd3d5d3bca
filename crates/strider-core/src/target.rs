//! # Target Control
//!
//! The minimal process-control surface the core drives.
//!
//! Everything OS specific (ptrace, Mach exceptions, the Windows debug loop)
//! lives behind [`TargetControl`]. The core never patches instructions
//! itself: it asks for a trap at an address and gets told when a thread
//! reaches it.
//!
//! ## Trap contract
//!
//! - `set_trap` / `clear_trap` are idempotent per address from the control
//!   layer's point of view; the core never sets the same address twice.
//! - A thread stopped by a trap is reported with its PC *at* the trap address.
//! - `resume` and `single_step` move a thread that is parked on a trap past it
//!   without reporting the trap again.
//!
//! ## Lifecycle
//!
//! 1. A [`Launcher`] (or the caller, for attach) produces [`TargetParts`]
//! 2. The session resumes / waits / single-steps through this trait
//! 3. `wait` reports `Exited` or `Killed` once; after that only `pid` and
//!    `detach` are meaningful

use std::fmt;
use std::sync::Arc;

use crate::disasm::Disassembler;
use crate::error::{Result, StriderError};
use crate::symbols::SymbolService;
use crate::types::{Address, Architecture, ProcessId, Registers, StopEvent, TaskInfo, ThreadId, ThreadInfo};

/// Process control primitives
///
/// ## Thread Safety
///
/// A `TargetControl` is owned by exactly one session and is only `Send`.
/// The one operation that may run concurrently with a blocking
/// [`wait`](TargetControl::wait) is interrupting it, which goes through the
/// separately shareable [`Interrupt`] handle.
pub trait TargetControl: Send
{
    /// Process identifier.
    fn pid(&self) -> ProcessId;

    /// Architecture of the target.
    fn architecture(&self) -> Architecture;

    /// Read `len` bytes of target memory.
    ///
    /// ## Errors
    ///
    /// - `MemoryAccess`: any byte of the range is unmapped
    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>;

    /// Write bytes into target memory, returning the number written.
    fn write_memory(&mut self, address: Address, data: &[u8]) -> Result<usize>;

    /// Register set of a thread.
    fn read_registers(&self, thread: ThreadId) -> Result<Registers>;

    /// Replace the register set of a thread.
    fn write_registers(&mut self, thread: ThreadId, registers: &Registers) -> Result<()>;

    /// Install an execution trap at `address`.
    fn set_trap(&mut self, address: Address) -> Result<()>;

    /// Remove the execution trap at `address`.
    fn clear_trap(&mut self, address: Address) -> Result<()>;

    /// Let every thread run.
    fn resume(&mut self) -> Result<()>;

    /// Execute exactly one instruction on `thread`, leaving the others stopped.
    ///
    /// Synchronous: returns the resulting stop, normally
    /// [`StopReason::SingleStep`](crate::types::StopReason::SingleStep) but
    /// possibly a trap, an embedded trap, or process exit.
    fn single_step(&mut self, thread: ThreadId) -> Result<StopEvent>;

    /// Block until the resumed target stops.
    fn wait(&mut self) -> Result<StopEvent>;

    /// Handle that can interrupt a blocking [`wait`](TargetControl::wait)
    /// from another thread.
    fn interrupter(&self) -> Arc<dyn Interrupt>;

    /// All OS threads at the last stop.
    fn threads(&self) -> Result<Vec<ThreadInfo>>;

    /// All runtime tasks at the last stop (empty for targets without tasks).
    fn tasks(&self) -> Result<Vec<TaskInfo>>;

    /// Terminate the process.
    fn kill(&mut self) -> Result<()>;

    /// Release the process, terminating it when `kill` is set.
    fn detach(&mut self, kill: bool) -> Result<()>;

    /// Read a little-endian `u64`.
    fn read_u64(&self, address: Address) -> Result<u64>
    {
        let bytes = self.read_memory(address, 8)?;
        let word: [u8; 8] = bytes.as_slice().try_into().map_err(|_| StriderError::MemoryAccess {
            address,
            details: format!("short read: {} of 8 bytes", bytes.len()),
        })?;
        Ok(u64::from_le_bytes(word))
    }
}

/// Request that a running target stop
///
/// Safe from any thread. Has no effect on a target that is not running.
pub trait Interrupt: Send + Sync
{
    /// Ask the target to stop. The running `wait` returns
    /// [`StopReason::Interrupted`](crate::types::StopReason::Interrupted).
    fn interrupt(&self) -> Result<()>;
}

/// Everything the core needs to debug one process.
pub struct TargetParts
{
    /// Process control.
    pub target: Box<dyn TargetControl>,
    /// Symbol queries for the process image.
    pub symbols: Arc<dyn SymbolService>,
    /// Instruction decoder for the process image.
    pub disassembler: Arc<dyn Disassembler>,
}

impl fmt::Debug for TargetParts
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_struct("TargetParts")
            .field("pid", &self.target.pid())
            .field("architecture", &self.target.architecture())
            .finish_non_exhaustive()
    }
}

/// Starts a process under debugger control
///
/// Each call produces a fresh process (new pid), stopped before its first
/// instruction. Used for the initial launch and for every restart.
pub trait Launcher: Send
{
    /// Spawn the process and hand back its parts.
    fn launch(&mut self) -> Result<TargetParts>;
}
