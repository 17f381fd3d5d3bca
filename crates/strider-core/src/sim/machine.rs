//! # Simulated Process
//!
//! [`Machine`] executes a [`ProgramImage`] and implements [`TargetControl`]
//! over it.
//!
//! ## Execution model
//!
//! - One OS thread (id 1) runs tasks; any extra threads are parked and never
//!   run anything.
//! - Tasks are scheduled cooperatively: `YIELD` moves the running task to
//!   the back of the run queue, `GOEXIT` drops it.
//! - Memory is split into regions: read-only code, writable globals, and one
//!   stack per task. Touching anything else kills the process with `SIGSEGV`.
//! - Traps are kept in a set and checked before each instruction; code bytes
//!   are never patched.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::program::{Arg, Op, ProgramImage, Slot, CODE_BASE, GLOBALS_BASE};
use crate::error::{Result, StriderError};
use crate::target::{Interrupt, TargetControl};
use crate::types::{
    Address, Architecture, ProcessId, Registers, StopEvent, StopReason, TaskId, TaskInfo, TaskStatus, ThreadId, ThreadInfo,
    VarLocation,
};

/// First task stack.
pub const STACK_REGION: u64 = 0x7000_0000;
/// Bytes per task stack.
pub const STACK_SIZE: u64 = 0x4000;
const STACK_STRIDE: u64 = 0x1_0000;

/// The thread that runs tasks.
pub const RUNNING_THREAD: ThreadId = ThreadId(1);

#[derive(Debug)]
struct Region
{
    start: u64,
    data: Vec<u8>,
    writable: bool,
}

impl Region
{
    fn contains(&self, address: u64, len: usize) -> bool
    {
        address >= self.start
            && address
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.start + self.data.len() as u64)
    }
}

#[derive(Debug, Clone)]
struct SimTask
{
    id: TaskId,
    pc: Address,
    sp: Address,
    fp: Address,
    start_pc: Address,
    stack: u64,
}

/// Interrupt flag shared with the session's halt handle.
#[derive(Debug, Default)]
pub struct SimInterrupt
{
    requested: AtomicBool,
}

impl SimInterrupt
{
    fn take(&self) -> bool
    {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

impl Interrupt for SimInterrupt
{
    fn interrupt(&self) -> Result<()>
    {
        self.requested.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A running instance of a [`ProgramImage`].
#[derive(Debug)]
pub struct Machine
{
    pid: ProcessId,
    image: Arc<ProgramImage>,
    regions: Vec<Region>,
    tasks: BTreeMap<TaskId, SimTask>,
    run_queue: VecDeque<TaskId>,
    current: TaskId,
    next_task: u64,
    threads: usize,
    traps: HashSet<Address>,
    skip_trap: Option<Address>,
    interrupt: Arc<SimInterrupt>,
    exited: Option<StopReason>,
}

impl Machine
{
    /// Load `image` into a fresh process stopped at its entry point.
    pub fn new(pid: ProcessId, image: Arc<ProgramImage>) -> Self
    {
        let regions = vec![
            Region {
                start: CODE_BASE,
                data: image.code().to_vec(),
                writable: false,
            },
            Region {
                start: GLOBALS_BASE,
                data: image.global_data().to_vec(),
                writable: true,
            },
        ];
        let mut machine = Self {
            pid,
            threads: image.threads(),
            image,
            regions,
            tasks: BTreeMap::new(),
            run_queue: VecDeque::new(),
            current: TaskId(1),
            next_task: 1,
            traps: HashSet::new(),
            skip_trap: None,
            interrupt: Arc::new(SimInterrupt::default()),
            exited: None,
        };

        let entry = machine.image.entry();
        let (id, top) = machine.allocate_stack();
        // Zero frame record: the entry function is the outermost frame.
        let fp = Address::from(top - 16);
        machine.tasks.insert(
            id,
            SimTask {
                id,
                pc: entry,
                sp: fp,
                fp,
                start_pc: entry,
                stack: top,
            },
        );
        machine.current = id;
        debug!(pid = %pid, entry = %entry, "simulated process created");
        machine
    }

    /// Whether the process has exited or been killed.
    pub fn has_exited(&self) -> bool
    {
        self.exited.is_some()
    }

    fn allocate_stack(&mut self) -> (TaskId, u64)
    {
        let id = TaskId(self.next_task);
        self.next_task += 1;
        let start = STACK_REGION + (id.0 - 1) * STACK_STRIDE;
        self.regions.push(Region {
            start,
            data: vec![0; STACK_SIZE as usize],
            writable: true,
        });
        (id, start + STACK_SIZE)
    }

    fn alive(&self) -> Result<()>
    {
        match self.exited {
            Some(_) => Err(StriderError::ProcessTerminated(self.pid)),
            None => Ok(()),
        }
    }

    fn region(&self, address: Address, len: usize) -> Result<&Region>
    {
        self.regions
            .iter()
            .find(|region| region.contains(address.value(), len))
            .ok_or_else(|| StriderError::MemoryAccess {
                address,
                details: format!("{len} bytes not mapped"),
            })
    }

    fn read(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        let region = self.region(address, len)?;
        let offset = (address.value() - region.start) as usize;
        Ok(region.data[offset..offset + len].to_vec())
    }

    fn write(&mut self, address: Address, data: &[u8]) -> Result<()>
    {
        let region = self
            .regions
            .iter_mut()
            .find(|region| region.contains(address.value(), data.len()))
            .ok_or_else(|| StriderError::MemoryAccess {
                address,
                details: format!("{} bytes not mapped", data.len()),
            })?;
        if !region.writable {
            return Err(StriderError::MemoryAccess {
                address,
                details: "region is read-only".to_string(),
            });
        }
        let offset = (address.value() - region.start) as usize;
        region.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn task(&self) -> Result<&SimTask>
    {
        self.tasks
            .get(&self.current)
            .ok_or_else(|| StriderError::Target(format!("no task {} scheduled", self.current)))
    }

    fn task_mut(&mut self) -> Result<&mut SimTask>
    {
        let current = self.current;
        self.tasks
            .get_mut(&current)
            .ok_or_else(|| StriderError::Target(format!("no task {current} scheduled")))
    }

    fn push(&mut self, value: u64) -> Result<()>
    {
        let sp = self.task()?.sp - 8;
        self.write(sp, &value.to_le_bytes())?;
        self.task_mut()?.sp = sp;
        Ok(())
    }

    fn pop(&mut self) -> Result<u64>
    {
        let sp = self.task()?.sp;
        let value = TargetControl::read_u64(self, sp)?;
        self.task_mut()?.sp = sp + 8;
        Ok(value)
    }

    fn slot_address(&self, slot: &Slot) -> Result<Address>
    {
        Ok(match slot.location {
            VarLocation::Cfa(offset) => (self.task()?.fp + 16).offset(offset),
            VarLocation::Absolute(address) => address,
        })
    }

    fn read_slot(&self, slot: &Slot) -> Result<i64>
    {
        let size = usize::from(slot.size);
        let bytes = self.read(self.slot_address(slot)?, size)?;
        let mut word = [0u8; 8];
        word[..size].copy_from_slice(&bytes);
        let shift = 64 - 8 * u32::from(slot.size);
        Ok((i64::from_le_bytes(word) << shift) >> shift)
    }

    fn write_slot(&mut self, slot: &Slot, value: i64) -> Result<()>
    {
        let address = self.slot_address(slot)?;
        self.write(address, &value.to_le_bytes()[..usize::from(slot.size)])
    }

    fn arg_values(&self, args: &[Arg]) -> Result<Vec<i64>>
    {
        args.iter()
            .map(|arg| match arg {
                Arg::Imm(value) => Ok(*value),
                Arg::Slot(slot) => self.read_slot(slot),
            })
            .collect()
    }

    fn spawn(&mut self, target: Address, args: &[i64]) -> Result<()>
    {
        let (id, top) = self.allocate_stack();
        let fp = top - 16;
        let cfa = fp - 8 * args.len() as u64;
        for (index, value) in args.iter().enumerate() {
            self.write(Address::from(cfa + 8 * index as u64), &value.to_le_bytes())?;
        }
        let sp = cfa - 8;
        self.write(Address::from(sp), &self.image.task_return().value().to_le_bytes())?;
        self.tasks.insert(
            id,
            SimTask {
                id,
                pc: target,
                sp: Address::from(sp),
                fp: Address::from(fp),
                start_pc: target,
                stack: top,
            },
        );
        self.run_queue.push_back(id);
        trace!(task = %id, entry = %target, "task spawned");
        Ok(())
    }

    fn switch_task(&mut self)
    {
        if let Some(next) = self.run_queue.pop_front() {
            self.run_queue.push_back(self.current);
            trace!(from = %self.current, to = %next, "task switch");
            self.current = next;
        }
    }

    fn terminate(&mut self, reason: StopReason) -> StopReason
    {
        debug!(pid = %self.pid, %reason, "simulated process terminated");
        self.exited = Some(reason);
        self.tasks.clear();
        self.run_queue.clear();
        self.traps.clear();
        reason
    }

    /// Execute the instruction at the current task's PC.
    ///
    /// Returns a stop reason when the instruction ends the run on its own.
    fn execute(&mut self) -> Result<Option<StopReason>>
    {
        let image = Arc::clone(&self.image);
        let pc = self.task()?.pc;
        let Some(instruction) = image.instruction(pc) else {
            debug!(%pc, "no instruction at pc");
            return Ok(Some(self.terminate(StopReason::Killed(libc::SIGILL))));
        };
        let next = pc + instruction.len();
        match self.apply(&instruction.op, next) {
            Ok(reason) => Ok(reason),
            Err(StriderError::MemoryAccess { address, details }) => {
                debug!(%pc, %address, %details, "memory fault");
                Ok(Some(self.terminate(StopReason::Killed(libc::SIGSEGV))))
            }
            Err(err) => Err(err),
        }
    }

    fn apply(&mut self, op: &Op, next: Address) -> Result<Option<StopReason>>
    {
        let mut jump = next;
        match op {
            Op::StackCheck | Op::Nop => {}
            Op::Enter { frame_size } => {
                let fp = self.task()?.fp;
                self.push(fp.value())?;
                let task = self.task_mut()?;
                task.fp = task.sp;
                task.sp = task.sp - *frame_size;
            }
            Op::Set { slot, value } => self.write_slot(slot, *value)?,
            Op::StoreFunc { slot, entry } => self.write_slot(slot, entry.value() as i64)?,
            Op::Add { slot, delta } => {
                let value = self.read_slot(slot)?.wrapping_add(*delta);
                self.write_slot(slot, value)?;
            }
            Op::JumpIf {
                slot,
                cmp,
                value,
                target,
            } => {
                if cmp.holds(self.read_slot(slot)?, *value) {
                    jump = *target;
                }
            }
            Op::Jump { target } => jump = *target,
            Op::Call { target, args } => {
                let values = self.arg_values(args)?;
                let sp = self.task()?.sp;
                for (index, value) in values.iter().enumerate() {
                    self.write(sp + 8 * index as u64, &value.to_le_bytes())?;
                }
                self.push(next.value())?;
                jump = *target;
            }
            Op::Spawn { target, args } => {
                let values = self.arg_values(args)?;
                self.spawn(*target, &values)?;
            }
            Op::Ret => {
                let fp = self.task()?.fp;
                self.task_mut()?.sp = fp;
                let saved_fp = self.pop()?;
                let return_address = self.pop()?;
                self.task_mut()?.fp = Address::from(saved_fp);
                jump = Address::from(return_address);
            }
            Op::Yield => {
                self.task_mut()?.pc = next;
                self.switch_task();
                return Ok(None);
            }
            Op::TaskExit => {
                let finished = self.current;
                let Some(next_task) = self.run_queue.pop_front() else {
                    // All remaining tasks are blocked.
                    return Ok(Some(self.terminate(StopReason::Exited(2))));
                };
                if let Some(task) = self.tasks.remove(&finished) {
                    let base = task.stack - STACK_SIZE;
                    self.regions.retain(|region| region.start != base);
                }
                trace!(task = %finished, "task exited");
                self.current = next_task;
                return Ok(None);
            }
            Op::Trap => {
                self.task_mut()?.pc = next;
                return Ok(Some(StopReason::EmbeddedTrap));
            }
            Op::Exit { code } => return Ok(Some(self.terminate(StopReason::Exited(*code)))),
            Op::Fault { signal } => {
                self.task_mut()?.pc = next;
                return Ok(Some(StopReason::Signal(*signal)));
            }
            Op::Abort { signal } => return Ok(Some(self.terminate(StopReason::Killed(*signal)))),
        }
        self.task_mut()?.pc = jump;
        Ok(None)
    }

    fn check_thread(&self, thread: ThreadId) -> Result<()>
    {
        if thread.0 == 0 || thread.0 > self.threads as u64 {
            return Err(StriderError::NotFound(format!("thread {thread}")));
        }
        Ok(())
    }

    fn stop(&self, reason: StopReason) -> StopEvent
    {
        StopEvent::new(RUNNING_THREAD, reason)
    }
}

impl TargetControl for Machine
{
    fn pid(&self) -> ProcessId
    {
        self.pid
    }

    fn architecture(&self) -> Architecture
    {
        Architecture::X86_64
    }

    fn read_memory(&self, address: Address, len: usize) -> Result<Vec<u8>>
    {
        self.alive()?;
        self.read(address, len)
    }

    fn write_memory(&mut self, address: Address, data: &[u8]) -> Result<usize>
    {
        self.alive()?;
        self.write(address, data)?;
        Ok(data.len())
    }

    fn read_registers(&self, thread: ThreadId) -> Result<Registers>
    {
        self.alive()?;
        self.check_thread(thread)?;
        let mut regs = Registers::new().with_arch(Architecture::X86_64);
        if thread == RUNNING_THREAD {
            let task = self.task()?;
            regs.pc = task.pc;
            regs.sp = task.sp;
            regs.fp = task.fp;
        }
        Ok(regs)
    }

    fn write_registers(&mut self, thread: ThreadId, registers: &Registers) -> Result<()>
    {
        self.alive()?;
        self.check_thread(thread)?;
        if thread != RUNNING_THREAD {
            return Err(StriderError::Target(format!("thread {thread} is parked")));
        }
        let task = self.task_mut()?;
        task.pc = registers.pc;
        task.sp = registers.sp;
        task.fp = registers.fp;
        Ok(())
    }

    fn set_trap(&mut self, address: Address) -> Result<()>
    {
        self.alive()?;
        if self.image.instruction(address).is_none() {
            return Err(StriderError::Target(format!("{address} is not an instruction address")));
        }
        self.traps.insert(address);
        Ok(())
    }

    fn clear_trap(&mut self, address: Address) -> Result<()>
    {
        self.alive()?;
        self.traps.remove(&address);
        Ok(())
    }

    fn resume(&mut self) -> Result<()>
    {
        self.alive()?;
        self.skip_trap = Some(self.task()?.pc);
        Ok(())
    }

    fn single_step(&mut self, thread: ThreadId) -> Result<StopEvent>
    {
        self.alive()?;
        self.check_thread(thread)?;
        if thread != RUNNING_THREAD {
            return Err(StriderError::Target(format!("thread {thread} is parked")));
        }
        if self.interrupt.take() {
            return Ok(self.stop(StopReason::Interrupted));
        }
        self.skip_trap = None;
        if let Some(reason) = self.execute()? {
            return Ok(self.stop(reason));
        }
        let pc = self.task()?.pc;
        if self.traps.contains(&pc) {
            return Ok(self.stop(StopReason::Trap(pc)));
        }
        Ok(self.stop(StopReason::SingleStep))
    }

    fn wait(&mut self) -> Result<StopEvent>
    {
        self.alive()?;
        loop {
            if self.interrupt.take() {
                return Ok(self.stop(StopReason::Interrupted));
            }
            let pc = self.task()?.pc;
            if self.traps.contains(&pc) && self.skip_trap != Some(pc) {
                return Ok(self.stop(StopReason::Trap(pc)));
            }
            self.skip_trap = None;
            if let Some(reason) = self.execute()? {
                return Ok(self.stop(reason));
            }
        }
    }

    fn interrupter(&self) -> Arc<dyn Interrupt>
    {
        self.interrupt.clone()
    }

    fn threads(&self) -> Result<Vec<ThreadInfo>>
    {
        self.alive()?;
        let running = self.task()?;
        Ok((1..=self.threads as u64)
            .map(|raw| {
                if raw == RUNNING_THREAD.0 {
                    ThreadInfo {
                        id: RUNNING_THREAD,
                        pc: running.pc,
                        task: Some(running.id),
                    }
                } else {
                    ThreadInfo {
                        id: ThreadId(raw),
                        pc: Address::ZERO,
                        task: None,
                    }
                }
            })
            .collect())
    }

    fn tasks(&self) -> Result<Vec<TaskInfo>>
    {
        self.alive()?;
        Ok(self
            .tasks
            .values()
            .map(|task| {
                let running = task.id == self.current;
                TaskInfo {
                    id: task.id,
                    pc: task.pc,
                    sp: task.sp,
                    fp: task.fp,
                    start_pc: task.start_pc,
                    thread: running.then_some(RUNNING_THREAD),
                    status: if running {
                        TaskStatus::Running
                    } else {
                        TaskStatus::Runnable
                    },
                }
            })
            .collect())
    }

    fn kill(&mut self) -> Result<()>
    {
        self.alive()?;
        self.terminate(StopReason::Killed(libc::SIGKILL));
        Ok(())
    }

    fn detach(&mut self, kill: bool) -> Result<()>
    {
        if self.exited.is_none() {
            debug!(pid = %self.pid, kill, "detaching simulated process");
            self.traps.clear();
            if kill {
                self.terminate(StopReason::Killed(libc::SIGKILL));
            } else {
                self.exited = Some(StopReason::Exited(0));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::sim::{Cmp, ProgramBuilder};
    use crate::symbols::SymbolService;

    fn machine(image: ProgramImage) -> (Machine, Arc<ProgramImage>)
    {
        let image = Arc::new(image);
        (Machine::new(ProcessId(1), Arc::clone(&image)), image)
    }

    #[test]
    fn test_runs_to_exit()
    {
        let (mut m, _) = machine(
            ProgramBuilder::new()
                .function("main.main", 1, |f| {
                    f.local("i");
                    f.line(2).set("i", 0);
                    f.line(3).label("top").add("i", 1);
                    f.line(4).jump_if("i", Cmp::Lt, 10, "top");
                    f.line(5).ret();
                })
                .build(),
        );
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::Exited(0));
        assert!(m.wait().unwrap_err().is_terminated());
    }

    #[test]
    fn test_trap_reported_at_address_and_skipped_on_resume()
    {
        let (mut m, image) = machine(
            ProgramBuilder::new()
                .function("main.main", 1, |f| {
                    f.line(2).nop();
                    f.line(3).ret();
                })
                .build(),
        );
        let main = image.function_by_name("main.main").unwrap();
        m.set_trap(main.prologue_end()).unwrap();
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::Trap(main.prologue_end()));
        assert_eq!(m.read_registers(RUNNING_THREAD).unwrap().pc, main.prologue_end());
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::Exited(0));
    }

    #[test]
    fn test_call_passes_arguments()
    {
        let (mut m, image) = machine(
            ProgramBuilder::new()
                .global("main.out", crate::types::TypeInfo::int(), 0)
                .function("main.main", 1, |f| {
                    f.line(2).call_with("main.inc", vec![41.into()]);
                    f.line(3).ret();
                })
                .function("main.inc", 10, |f| {
                    f.arg("n");
                    f.line(11).add("n", 1);
                    f.line(12).trap();
                    f.line(13).ret();
                })
                .build(),
        );
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::EmbeddedTrap);
        let regs = m.read_registers(RUNNING_THREAD).unwrap();
        let n = TargetControl::read_u64(&m, regs.fp + 16).unwrap();
        assert_eq!(n, 42);
        let inc = image.function_by_name("main.inc").unwrap();
        assert!(inc.contains(regs.pc));
    }

    #[test]
    fn test_spawned_task_runs_after_yield()
    {
        let (mut m, _) = machine(
            ProgramBuilder::new()
                .function("main.main", 1, |f| {
                    f.line(2).spawn("main.worker");
                    f.line(3).yield_now();
                    f.line(4).ret();
                })
                .function("main.worker", 10, |f| {
                    f.line(11).trap();
                    f.line(12).ret();
                })
                .build(),
        );
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::EmbeddedTrap);
        let tasks = m.tasks().unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[1].status, TaskStatus::Running);
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::Exited(0));
    }

    #[test]
    fn test_interrupt_stops_wait()
    {
        let (mut m, _) = machine(
            ProgramBuilder::new()
                .function("main.main", 1, |f| {
                    f.line(2).label("spin").jump("spin");
                })
                .build(),
        );
        m.interrupter().interrupt().unwrap();
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::Interrupted);
    }

    #[test]
    fn test_bad_memory_kills_process()
    {
        let (mut m, _) = machine(ProgramBuilder::new().function("main.main", 1, |f| {
            f.line(2).nop();
        })
        .build());
        // main.main falls off its end into padding.
        m.resume().unwrap();
        assert_eq!(m.wait().unwrap().reason, StopReason::Killed(libc::SIGILL));
        assert!(m.read_memory(Address::from(CODE_BASE), 1).is_err());
    }
}
