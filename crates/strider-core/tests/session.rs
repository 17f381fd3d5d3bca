//! Session lifecycle: restart, attach, detach and symbol listings

mod common;

use std::collections::VecDeque;
use std::sync::Arc;

use strider_core::prelude::*;
use strider_core::sim::{self, ProgramBuilder, ProgramImage, SimEvaluator};

use common::{call_program, launch, run};

/// Hands out one image per launch, so a restart can pick up a rebuilt program.
struct QueueLauncher
{
    images: VecDeque<Arc<ProgramImage>>,
    next_pid: u32,
}

impl Launcher for QueueLauncher
{
    fn launch(&mut self) -> Result<TargetParts>
    {
        let image = self
            .images
            .pop_front()
            .ok_or_else(|| StriderError::Target("no program left to launch".into()))?;
        let pid = ProcessId(self.next_pid);
        self.next_pid += 1;
        Ok(sim::attach(pid, image))
    }
}

fn with_helper() -> ProgramImage
{
    ProgramBuilder::new()
        .function("main.main", 1, |f| {
            f.line(2).call("main.helper");
            f.line(3).ret();
        })
        .function("main.helper", 10, |f| {
            f.line(11).nop();
            f.line(12).ret();
        })
        .build()
}

fn without_helper() -> ProgramImage
{
    ProgramBuilder::new()
        .function("main.main", 1, |f| {
            f.line(2).nop();
            f.line(3).ret();
        })
        .build()
}

#[test]
fn test_initial_state_is_stopped_at_entry()
{
    let session = launch(call_program());
    assert_eq!(session.pid(), ProcessId(sim::FIRST_PID));
    assert!(!session.is_exited());

    let state = session.state().unwrap();
    assert!(!state.exited);
    assert_eq!(state.function_name(), Some("runtime.rt0"));
    assert!(!session.halt_handle().is_running());
}

#[test]
fn test_restart_keeps_breakpoints_and_resets_hits()
{
    let mut session = launch(call_program());
    let events = session.subscribe();
    let bp = BreakpointBuilder::function("main.inner").create(&mut session).unwrap();
    run(&mut session);
    assert_eq!(session.breakpoint(bp.id).unwrap().total_hits, 1);

    let pid = session.restart().unwrap();
    assert_eq!(pid, ProcessId(sim::FIRST_PID + 1));
    assert_eq!(session.pid(), pid);

    let kept = session.breakpoint(bp.id).unwrap();
    assert_eq!(kept.total_hits, 0);
    assert_eq!(kept.address, bp.address);
    assert_eq!(session.state().unwrap().function_name(), Some("runtime.rt0"));

    assert!(events
        .try_iter()
        .any(|event| event == SessionEvent::Restarted { pid, dropped: Vec::new() }));

    let state = run(&mut session);
    assert_eq!(state.hit.map(|hit| hit.breakpoint.total_hits), Some(1));
}

#[test]
fn test_restart_after_exit_revives_session()
{
    let mut session = launch(call_program());
    assert!(run(&mut session).exited);
    assert!(session.is_exited());

    session.restart().unwrap();
    assert!(!session.is_exited());
    assert!(session.state().is_ok());
    assert!(run(&mut session).exited);
}

#[test]
fn test_restart_drops_breakpoints_that_no_longer_resolve()
{
    let launcher = QueueLauncher {
        images: VecDeque::from([Arc::new(with_helper()), Arc::new(without_helper())]),
        next_pid: 100,
    };
    let mut session = Session::launch(Box::new(launcher), Arc::new(SimEvaluator), DebuggerConfig::default()).unwrap();
    let events = session.subscribe();

    let helper = BreakpointBuilder::function("main.helper").create(&mut session).unwrap();
    let ret = BreakpointBuilder::file_line("main.go", 3).create(&mut session).unwrap();

    let pid = session.restart().unwrap();
    assert_eq!(pid, ProcessId(101));

    let remaining: Vec<_> = session.breakpoints().unwrap().iter().map(|bp| bp.id).collect();
    assert_eq!(remaining, vec![ret.id]);
    assert_eq!(session.breakpoint(helper.id).unwrap_err().category(), ErrorCategory::NotFound);
    assert!(events.try_iter().any(|event| event
        == SessionEvent::Restarted {
            pid,
            dropped: vec![helper.id],
        }));

    // Nothing left to launch
    let err = session.restart().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Target);
    assert_eq!(session.pid(), pid);
}

#[test]
fn test_attached_session_cannot_restart()
{
    let parts = sim::attach(ProcessId(777), Arc::new(call_program()));
    let mut session = Session::attach(parts, Arc::new(SimEvaluator), DebuggerConfig::default()).unwrap();
    assert_eq!(session.pid(), ProcessId(777));

    let err = session.restart().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::AttachRestricted);

    let state = run(&mut session);
    assert!(state.exited);
    assert_eq!(state.pid, ProcessId(777));
}

#[test]
fn test_operations_after_detach()
{
    let mut session = launch(call_program());
    let pid = session.pid();
    session.detach(true).unwrap();

    assert!(session.is_exited());
    assert_eq!(session.pid(), pid);

    assert!(session.state().unwrap_err().is_terminated());
    assert!(session.breakpoints().unwrap_err().is_terminated());
    assert!(BreakpointBuilder::function("main.main")
        .create(&mut session)
        .unwrap_err()
        .is_terminated());
    assert!(session.next().unwrap_err().is_terminated());
    assert!(session.step_instruction().unwrap_err().is_terminated());
    assert!(session
        .stacktrace(TaskSelector::Current, 10, None)
        .unwrap_err()
        .is_terminated());
    assert!(session.functions(None).unwrap_err().is_terminated());
    assert!(session.halt().unwrap_err().is_terminated());

    let states: Vec<ExecutionState> = session.continue_execution().collect();
    assert_eq!(states.len(), 1);
    assert!(states[0].exited);
    assert_eq!(states[0].error, Some(TargetFault::ProcessTerminated(pid)));

    // A second detach has nothing to release
    session.detach(false).unwrap();
}

#[test]
fn test_detach_emits_exit_event()
{
    let mut session = launch(call_program());
    let events = session.subscribe();
    let pid = session.pid();
    session.detach(false).unwrap();

    let received: Vec<SessionEvent> = events.try_iter().collect();
    assert_eq!(received, vec![SessionEvent::Exited { pid, status: None }]);
}

#[test]
fn test_symbol_listings()
{
    let session = launch(call_program());

    let all = session.functions(None).unwrap();
    assert!(all.contains(&"runtime.rt0".to_string()));
    assert!(all.contains(&"runtime.helper".to_string()));
    let mut sorted = all.clone();
    sorted.sort();
    assert_eq!(all, sorted);

    let user = session.functions(Some(r"^main\.")).unwrap();
    assert_eq!(user, vec!["main.inner", "main.main", "main.outer"]);

    assert_eq!(session.sources(None).unwrap(), vec!["main.go"]);
    assert!(session.sources(Some("nothing")).unwrap().is_empty());
    assert!(session.types(None).unwrap().contains(&"int".to_string()));

    let err = session.functions(Some("[")).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
}

#[test]
fn test_disassemble_function_at_pc()
{
    let mut session = launch(call_program());
    BreakpointBuilder::function("main.outer").create(&mut session).unwrap();
    let state = run(&mut session);
    let pc = state.pc().unwrap();

    let outer = session.symbols().unwrap().function_by_name("main.outer").unwrap();
    let listing = session.disassemble_pc(EvalScope::current(), pc).unwrap();
    assert_eq!(listing[0].location.pc, outer.entry);
    assert!(listing.iter().all(|insn| insn.location.pc < outer.end));

    let current: Vec<_> = listing.iter().filter(|insn| insn.at_pc).collect();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].location.pc, pc);
    assert!(current[0].breakpoint);
    assert_eq!(listing.iter().filter(|insn| insn.breakpoint).count(), 1);

    let call = listing
        .iter()
        .find(|insn| insn.text.starts_with("CALL"))
        .expect("call to inner");
    let destination = call.destination.as_ref().and_then(|loc| loc.function_name());
    assert_eq!(destination, Some("main.inner"));

    let err = session.disassemble_pc(EvalScope::current(), Address::new(0x10)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[test]
fn test_disassemble_range_rejects_inverted_bounds()
{
    let session = launch(call_program());
    let pc = session.state().unwrap().pc().unwrap();
    let err = session.disassemble_range(EvalScope::current(), pc + 4, pc).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
}
