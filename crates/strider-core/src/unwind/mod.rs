//! # Stack Unwinding
//!
//! Frame-pointer unwinder with a stack-scan fallback for the innermost frame.
//!
//! Every frame that has been set up stores `(saved fp, return address)` at
//! its frame pointer, so the canonical frame address is `fp + 16`. While the
//! innermost function is still in its prologue (PC before the function's
//! frame-setup address) nothing has been pushed yet: the return address is at
//! the stack pointer on x86-64 and in the link register on ARM64.
//!
//! The walk ends at `max_frames`, at a zero return address (outermost frame),
//! on an unreadable frame record, or when the chain stops growing toward the
//! stack base.

use tracing::debug;

use crate::error::Result;
use crate::symbols::SymbolCache;
use crate::target::TargetControl;
use crate::types::{Address, Architecture, FrameStatus, Registers, StackFrame, TaskId, TaskInfo, ThreadId};

/// Minimal memory accessor required for stack unwinding.
pub trait MemoryAccess
{
    fn read_u64(&self, address: Address) -> Result<u64>;
}

impl<T: TargetControl + ?Sized> MemoryAccess for T
{
    fn read_u64(&self, address: Address) -> Result<u64>
    {
        TargetControl::read_u64(self, address)
    }
}

/// Register values the walk starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnwindStart
{
    pub pc: Address,
    pub sp: Address,
    pub fp: Address,
    /// Link register, on architectures that have one.
    pub link: Option<Address>,
}

impl UnwindStart
{
    /// Start from a live thread's registers.
    pub fn from_registers(regs: &Registers) -> Self
    {
        Self {
            pc: regs.pc,
            sp: regs.sp,
            fp: regs.fp,
            link: regs.link_register(),
        }
    }

    /// Start from a parked task's saved context.
    pub fn from_task(task: &TaskInfo) -> Self
    {
        Self {
            pc: task.pc,
            sp: task.sp,
            fp: task.fp,
            link: None,
        }
    }
}

/// Who the frames belong to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameOwner
{
    pub task: Option<TaskId>,
    pub thread: Option<ThreadId>,
}

/// Frame-pointer stack unwinder.
pub struct StackUnwinder<'a, M: ?Sized>
{
    architecture: Architecture,
    symbols: &'a SymbolCache,
    memory: &'a M,
}

struct UnwindStep
{
    cfa: Address,
    return_address: Address,
    next: UnwindStart,
    status: FrameStatus,
}

impl<'a, M: MemoryAccess + ?Sized> StackUnwinder<'a, M>
{
    pub fn new(architecture: Architecture, symbols: &'a SymbolCache, memory: &'a M) -> Self
    {
        Self {
            architecture,
            symbols,
            memory,
        }
    }

    /// Walk at most `max_frames` frames, innermost first.
    pub fn unwind(&self, start: UnwindStart, owner: FrameOwner, max_frames: usize) -> Vec<StackFrame>
    {
        let mut frames = Vec::new();
        let mut cursor = start;
        let mut last_cfa: Option<Address> = None;

        while frames.len() < max_frames && !cursor.pc.is_zero() {
            let index = frames.len();
            // Callers sit on their return address; look up the call instead.
            let lookup_pc = if index == 0 { cursor.pc } else { cursor.pc - 1 };
            let mut location = self.symbols.location_at(lookup_pc);
            location.pc = cursor.pc;

            let in_prologue = index == 0
                && location
                    .function
                    .as_ref()
                    .and_then(|f| f.frame_setup)
                    .is_some_and(|setup| cursor.pc < setup);

            let step = if in_prologue {
                self.prologue_step(&cursor)
            } else {
                self.frame_pointer_step(&cursor)
            };

            let step = match step {
                Ok(step) => step,
                Err(err) => {
                    debug!(pc = %cursor.pc, error = %err, "frame record unreadable, ending walk");
                    None
                }
            };

            let Some(step) = step else {
                frames.push(StackFrame::new(
                    index,
                    owner.task,
                    owner.thread,
                    cursor.pc,
                    cursor.sp,
                    cursor.fp,
                    cursor.sp,
                    None,
                    location,
                    FrameStatus::Heuristic,
                ));
                break;
            };

            if last_cfa.is_some_and(|previous| step.cfa <= previous) {
                debug!(pc = %cursor.pc, cfa = %step.cfa, "frame chain not growing, ending walk");
                break;
            }
            last_cfa = Some(step.cfa);

            let return_address = (!step.return_address.is_zero()).then_some(step.return_address);
            frames.push(StackFrame::new(
                index,
                owner.task,
                owner.thread,
                cursor.pc,
                cursor.sp,
                cursor.fp,
                step.cfa,
                return_address,
                location,
                step.status,
            ));

            if return_address.is_none() {
                break;
            }
            cursor = step.next;
        }

        frames
    }

    /// Number of frames between the innermost frame and the outermost one.
    pub fn depth(&self, start: UnwindStart, max_frames: usize) -> usize
    {
        self.unwind(start, FrameOwner::default(), max_frames).len()
    }

    fn frame_pointer_step(&self, cursor: &UnwindStart) -> Result<Option<UnwindStep>>
    {
        if cursor.fp.is_zero() {
            return Ok(None);
        }
        let saved_fp = self.memory.read_u64(cursor.fp)?;
        let return_address = self.memory.read_u64(cursor.fp + 8)?;
        let cfa = cursor.fp + 16;
        Ok(Some(UnwindStep {
            cfa,
            return_address: Address::from(return_address),
            next: UnwindStart {
                pc: Address::from(return_address),
                sp: cfa,
                fp: Address::from(saved_fp),
                link: None,
            },
            status: FrameStatus::Complete,
        }))
    }

    fn prologue_step(&self, cursor: &UnwindStart) -> Result<Option<UnwindStep>>
    {
        match self.architecture {
            Architecture::Arm64 => {
                let Some(link) = cursor.link else {
                    return self.frame_pointer_step(cursor);
                };
                Ok(Some(UnwindStep {
                    cfa: cursor.sp,
                    return_address: link,
                    next: UnwindStart {
                        pc: link,
                        sp: cursor.sp,
                        fp: cursor.fp,
                        link: None,
                    },
                    status: FrameStatus::Heuristic,
                }))
            }
            Architecture::X86_64 => {
                if cursor.sp.is_zero() {
                    return Ok(None);
                }
                let return_address = self.memory.read_u64(cursor.sp)?;
                let cfa = cursor.sp + 8;
                Ok(Some(UnwindStep {
                    cfa,
                    return_address: Address::from(return_address),
                    next: UnwindStart {
                        pc: Address::from(return_address),
                        sp: cfa,
                        fp: cursor.fp,
                        link: None,
                    },
                    status: FrameStatus::Heuristic,
                }))
            }
            Architecture::Unknown(_) => self.frame_pointer_step(cursor),
        }
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::HashMap;
    use std::sync::Arc;

    use super::*;
    use crate::error::StriderError;
    use crate::symbols::SymbolService;
    use crate::types::{Function, LineEntry, VariableInfo};

    struct Words(HashMap<u64, u64>);

    impl MemoryAccess for Words
    {
        fn read_u64(&self, address: Address) -> Result<u64>
        {
            self.0.get(&address.value()).copied().ok_or(StriderError::MemoryAccess {
                address,
                details: "unmapped".into(),
            })
        }
    }

    struct TwoFunctions(Vec<Arc<Function>>, Vec<String>);

    impl SymbolService for TwoFunctions
    {
        fn functions(&self) -> &[Arc<Function>]
        {
            &self.0
        }

        fn files(&self) -> &[String]
        {
            &self.1
        }

        fn variables(&self, _function: &Function, _pc: Address) -> Vec<VariableInfo>
        {
            Vec::new()
        }
    }

    fn function(name: &str, entry: u64, line: u32) -> Arc<Function>
    {
        let mut f = Function::new(name, Address::from(entry), Address::from(entry + 0x100));
        f.file = Some("main.go".into());
        f.decl_line = line;
        f.frame_setup = Some(Address::from(entry + 0x10));
        f.lines = vec![LineEntry {
            address: Address::from(entry),
            file: "main.go".into(),
            line,
            is_stmt: true,
            prologue_end: false,
        }];
        Arc::new(f)
    }

    fn symbols() -> SymbolCache
    {
        SymbolCache::new(Arc::new(TwoFunctions(
            vec![function("main.main", 0x1000, 5), function("main.callee", 0x2000, 20)],
            vec!["main.go".into()],
        )))
    }

    #[test]
    fn test_frame_pointer_chain()
    {
        // callee frame at fp=0x7f00 returns into main at 0x1040; main's frame
        // at 0x7f40 is the outermost (return address 0)
        let memory = Words(HashMap::from([(0x7f00, 0x7f40), (0x7f08, 0x1040), (0x7f40, 0), (0x7f48, 0)]));
        let symbols = symbols();
        let unwinder = StackUnwinder::new(Architecture::X86_64, &symbols, &memory);
        let start = UnwindStart {
            pc: Address::from(0x2020),
            sp: Address::from(0x7ef0),
            fp: Address::from(0x7f00),
            link: None,
        };

        let frames = unwinder.unwind(start, FrameOwner::default(), 16);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].location.function_name(), Some("main.callee"));
        assert_eq!(frames[0].cfa, Address::from(0x7f10));
        assert_eq!(frames[1].pc, Address::from(0x1040));
        assert_eq!(frames[1].location.function_name(), Some("main.main"));
        assert_eq!(frames[1].return_address, None);
    }

    #[test]
    fn test_prologue_reads_return_address_at_sp()
    {
        let memory = Words(HashMap::from([(0x7f08, 0x1040), (0x7f40, 0), (0x7f48, 0)]));
        let symbols = symbols();
        let unwinder = StackUnwinder::new(Architecture::X86_64, &symbols, &memory);
        let start = UnwindStart {
            pc: Address::from(0x2000),
            sp: Address::from(0x7f08),
            fp: Address::from(0x7f40),
            link: None,
        };

        let frames = unwinder.unwind(start, FrameOwner::default(), 16);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].status, FrameStatus::Heuristic);
        assert_eq!(frames[0].return_address, Some(Address::from(0x1040)));
        assert_eq!(frames[1].status, FrameStatus::Complete);
    }

    #[test]
    fn test_max_frames_limits_walk()
    {
        let memory = Words(HashMap::from([(0x7f00, 0x7f40), (0x7f08, 0x1040), (0x7f40, 0), (0x7f48, 0)]));
        let symbols = symbols();
        let unwinder = StackUnwinder::new(Architecture::X86_64, &symbols, &memory);
        let start = UnwindStart {
            pc: Address::from(0x2020),
            sp: Address::from(0x7ef0),
            fp: Address::from(0x7f00),
            link: None,
        };
        assert_eq!(unwinder.depth(start, 1), 1);
        assert!(unwinder.unwind(start, FrameOwner::default(), 0).is_empty());
    }

    #[test]
    fn test_non_growing_chain_stops()
    {
        // saved fp points below the current frame
        let memory = Words(HashMap::from([(0x7f00, 0x7e00), (0x7f08, 0x1040), (0x7e00, 0x7f00), (0x7e08, 0x1040)]));
        let symbols = symbols();
        let unwinder = StackUnwinder::new(Architecture::X86_64, &symbols, &memory);
        let start = UnwindStart {
            pc: Address::from(0x2020),
            sp: Address::from(0x7ef0),
            fp: Address::from(0x7f00),
            link: None,
        };
        assert_eq!(unwinder.unwind(start, FrameOwner::default(), 16).len(), 1);
    }
}
