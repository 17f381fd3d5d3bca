//! The live target plus the symbol data derived from it.

use std::sync::Arc;

use tracing::debug;

use crate::disasm::Disassembler;
use crate::error::{Result, StriderError};
use crate::symbols::SymbolCache;
use crate::target::{TargetControl, TargetParts};
use crate::types::{Address, ProcessId, Registers, StackFrame, TaskId, TaskInfo, ThreadId};
use crate::unwind::{FrameOwner, StackUnwinder, UnwindStart};

/// One debugged process
///
/// Replaced wholesale on restart; nothing in here outlives its pid.
pub(crate) struct Process
{
    pub pid: ProcessId,
    pub target: Box<dyn TargetControl>,
    pub symbols: Arc<SymbolCache>,
    pub disassembler: Arc<dyn Disassembler>,
    pub exited: bool,
}

impl std::fmt::Debug for Process
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("Process")
            .field("pid", &self.pid)
            .field("exited", &self.exited)
            .finish_non_exhaustive()
    }
}

impl Process
{
    pub fn new(parts: TargetParts) -> Self
    {
        Self {
            pid: parts.target.pid(),
            symbols: Arc::new(SymbolCache::new(parts.symbols)),
            disassembler: parts.disassembler,
            target: parts.target,
            exited: false,
        }
    }

    /// `ProcessTerminated` once the process is gone.
    pub fn alive(&self) -> Result<()>
    {
        if self.exited {
            return Err(StriderError::ProcessTerminated(self.pid));
        }
        Ok(())
    }

    pub fn unwinder(&self) -> StackUnwinder<'_, dyn TargetControl>
    {
        StackUnwinder::new(self.target.architecture(), &self.symbols, &*self.target)
    }

    /// Task running on `thread`, if any.
    pub fn task_on(&self, thread: ThreadId) -> Option<TaskInfo>
    {
        match self.target.tasks() {
            Ok(tasks) => tasks.into_iter().find(|task| task.thread == Some(thread)),
            Err(err) => {
                debug!(%thread, error = %err, "task list unavailable");
                None
            }
        }
    }

    /// Snapshot of one task.
    pub fn task(&self, id: TaskId) -> Result<TaskInfo>
    {
        self.target
            .tasks()?
            .into_iter()
            .find(|task| task.id == id)
            .ok_or_else(|| StriderError::NotFound(format!("task {id}")))
    }

    /// Frames of the task running on `thread`, from live registers.
    pub fn thread_frames(&self, thread: ThreadId, max: usize) -> Result<Vec<StackFrame>>
    {
        let regs = self.target.read_registers(thread)?;
        let owner = FrameOwner {
            task: self.task_on(thread).map(|task| task.id),
            thread: Some(thread),
        };
        Ok(self.unwinder().unwind(UnwindStart::from_registers(&regs), owner, max))
    }

    /// Frames of a task: live registers when it is running, its saved
    /// context otherwise.
    pub fn task_frames(&self, task: &TaskInfo, max: usize) -> Result<Vec<StackFrame>>
    {
        if let Some(thread) = task.thread {
            return self.thread_frames(thread, max);
        }
        let owner = FrameOwner {
            task: Some(task.id),
            thread: None,
        };
        Ok(self.unwinder().unwind(UnwindStart::from_task(task), owner, max))
    }

    /// Innermost frame of `thread`.
    pub fn innermost_frame(&self, thread: ThreadId) -> Result<StackFrame>
    {
        self.thread_frames(thread, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| StriderError::NotFound(format!("no frames on thread {thread}")))
    }

    /// Number of frames on the stack described by `regs`.
    pub fn depth(&self, regs: &Registers, max: usize) -> usize
    {
        self.unwinder().depth(UnwindStart::from_registers(regs), max)
    }

    /// Where the innermost frame described by `regs` returns to.
    pub fn return_address(&self, regs: &Registers) -> Result<Address>
    {
        self.unwinder()
            .unwind(UnwindStart::from_registers(regs), FrameOwner::default(), 1)
            .first()
            .and_then(|frame| frame.return_address)
            .ok_or_else(|| StriderError::NotFound(format!("no return address for frame at {}", regs.pc)))
    }
}
