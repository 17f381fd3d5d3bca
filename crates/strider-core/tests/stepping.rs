//! Step over, step into and instruction stepping

mod common;

use strider_core::prelude::*;
use strider_core::sim::{Cmp, ProgramBuilder};
use strider_core::types::TypeInfo;

use common::{call_program, global, launch, run, run_to_function, task_program};

fn recursive_program() -> strider_core::sim::ProgramImage
{
    // 70 func rec() {
    // 71     level--
    // 72     if level <= 0 { return }
    // 73     rec()
    // 74     visits++
    // 75 }
    ProgramBuilder::new()
        .global("main.level", TypeInfo::int(), 3)
        .global("main.visits", TypeInfo::int(), 0)
        .function("main.main", 80, |f| {
            f.line(81).call("main.rec");
            f.line(82).ret();
        })
        .function("main.rec", 70, |f| {
            f.line(71).add("main.level", -1);
            f.line(72).jump_if("main.level", Cmp::Le, 0, "done");
            f.line(73).call("main.rec");
            f.line(74).add("main.visits", 1);
            f.line(75).label("done").ret();
        })
        .build()
}

#[test]
fn test_next_walks_lines_and_steps_over_calls()
{
    let mut session = launch(call_program());
    let state = run_to_function(&mut session, "main.main");
    assert_eq!(state.line(), 21);

    for expected in [22, 23, 24, 25] {
        let state = session.next().unwrap();
        assert!(!state.exited);
        assert_eq!(state.line(), expected);
        assert_eq!(state.function_name(), Some("main.main"));
    }
}

#[test]
fn test_next_off_the_end_runs_to_exit()
{
    let mut session = launch(call_program());
    let bp = BreakpointBuilder::file_line("main.go", 25).create(&mut session).unwrap();
    run(&mut session);
    session.clear_breakpoint(bp.id).unwrap();

    // The caller has no source, so the step carries on until the process ends.
    let state = session.next().unwrap();
    assert!(state.exited);
    assert_eq!(state.exit_status, Some(0));

    let err = session.next().unwrap_err();
    assert!(err.is_terminated());
}

#[test]
fn test_step_enters_functions_with_debug_info()
{
    let mut session = launch(call_program());
    BreakpointBuilder::file_line("main.go", 22).create(&mut session).unwrap();
    run(&mut session);

    let state = session.step().unwrap();
    assert_eq!(state.function_name(), Some("main.outer"));
    assert_eq!(state.line(), 31);

    let state = session.step().unwrap();
    assert_eq!(state.line(), 32);

    let state = session.step().unwrap();
    assert_eq!(state.function_name(), Some("main.inner"));
    assert_eq!(state.line(), 41);

    let frames = session.stacktrace(TaskSelector::Current, 10, None).unwrap();
    let names: Vec<_> = frames.iter().map(|f| f.frame.location.function_name()).collect();
    assert_eq!(
        names,
        vec![
            Some("main.inner"),
            Some("main.outer"),
            Some("main.main"),
            Some("runtime.rt0")
        ]
    );
}

#[test]
fn test_step_skips_functions_without_debug_info()
{
    let mut session = launch(call_program());
    BreakpointBuilder::file_line("main.go", 23).create(&mut session).unwrap();
    run(&mut session);

    let state = session.step().unwrap();
    assert_eq!(state.function_name(), Some("main.main"));
    assert_eq!(state.line(), 24);
}

#[test]
fn test_returning_stops_in_caller()
{
    let mut session = launch(call_program());
    BreakpointBuilder::file_line("main.go", 42).create(&mut session).unwrap();
    run(&mut session);

    let state = session.next().unwrap();
    assert_eq!(state.function_name(), Some("main.outer"));
    assert_eq!(state.line(), 33);
}

#[test]
fn test_breakpoint_in_callee_ends_next()
{
    let mut session = launch(call_program());
    BreakpointBuilder::file_line("main.go", 22).create(&mut session).unwrap();
    run(&mut session);
    let inner = BreakpointBuilder::function("main.inner").create(&mut session).unwrap();

    let state = session.next().unwrap();
    let hit = state.hit.as_ref().expect("breakpoint hit during next");
    assert_eq!(hit.breakpoint.id, inner.id);
    assert_eq!(state.function_name(), Some("main.inner"));
}

#[test]
fn test_tracepoint_in_callee_does_not_end_next()
{
    let mut session = launch(call_program());
    BreakpointBuilder::file_line("main.go", 22).create(&mut session).unwrap();
    run(&mut session);
    let tp = BreakpointBuilder::function("main.outer")
        .tracepoint()
        .variable("v")
        .create(&mut session)
        .unwrap();
    let events = session.subscribe();

    let state = session.next().unwrap();
    assert_eq!(state.line(), 23);
    assert!(state.hit.is_none());
    assert_eq!(session.breakpoint(tp.id).unwrap().total_hits, 1);
    assert!(events
        .try_iter()
        .any(|event| matches!(event, SessionEvent::Tracepoint { breakpoint, .. } if breakpoint == tp.id)));
}

#[test]
fn test_next_over_recursive_call_waits_for_same_frame()
{
    let mut session = launch(recursive_program());
    let state = run_to_function(&mut session, "main.rec");
    assert_eq!(state.line(), 71);

    assert_eq!(session.next().unwrap().line(), 72);
    assert_eq!(session.next().unwrap().line(), 73);

    let state = session.next().unwrap();
    assert_eq!(state.line(), 74);
    assert_eq!(state.function_name(), Some("main.rec"));
    // The nested call already passed line 74 once.
    assert_eq!(global(&session, "main.visits"), 1);
    assert_eq!(session.stacktrace(TaskSelector::Current, 10, None).unwrap().len(), 3);
}

#[test]
fn test_next_waits_for_task_after_yield()
{
    let mut session = launch(task_program());
    let state = run_to_function(&mut session, "main.main");
    assert_eq!(state.line(), 51);
    let main_task = state.current_task.as_ref().map(|task| task.id);

    assert_eq!(session.next().unwrap().line(), 52);

    let state = session.next().unwrap();
    assert_eq!(state.line(), 53);
    assert_eq!(state.current_task.as_ref().map(|task| task.id), main_task);
    assert_eq!(global(&session, "main.count"), 1);
}

#[test]
fn test_step_instruction_advances_pc()
{
    let mut session = launch(call_program());
    let state = run_to_function(&mut session, "main.main");
    let before = state.pc().unwrap();

    let state = session.step_instruction().unwrap();
    let after = state.pc().unwrap();
    assert!(after > before);
    assert!(!state.exited);

    let listing = session.disassemble_range(EvalScope::current(), before, after).unwrap();
    assert_eq!(listing.len(), 1);
    assert!(listing[0].text.starts_with("MOV"));
}

#[test]
fn test_stepping_without_source_is_rejected()
{
    let mut session = launch(call_program());
    // Stopped at the runtime entry point, which has no line table.
    let err = session.next().unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);

    let state = session.step_instruction().unwrap();
    assert_eq!(state.function_name(), Some("main.main"));
}
