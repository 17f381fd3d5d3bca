//! Stack traces, evaluation scopes, variables, threads and tasks

mod common;

use strider_core::prelude::*;

use common::{call_program, launch, run, task_program};

fn stopped_in_inner() -> Session
{
    let mut session = launch(call_program());
    BreakpointBuilder::function("main.inner").create(&mut session).unwrap();
    let state = run(&mut session);
    assert_eq!(state.line(), 41);
    session
}

fn int(variable: &Variable) -> i64
{
    variable.value.as_i64().expect("integer value")
}

#[test]
fn test_stacktrace_depth_limits()
{
    let session = stopped_in_inner();

    let full = session.stacktrace(TaskSelector::Current, 50, None).unwrap();
    assert_eq!(full.len(), 4);
    assert_eq!(full[0].frame.index, 0);
    assert_eq!(full[3].frame.index, 3);
    assert!(full.iter().all(|f| f.arguments.is_empty() && f.locals.is_empty()));

    let two = session.stacktrace(TaskSelector::Current, 2, None).unwrap();
    assert_eq!(two.len(), 2);
    assert_eq!(two[1].frame.location.function_name(), Some("main.outer"));
    assert_eq!(two[1].frame.location.line, 32);

    assert!(session.stacktrace(TaskSelector::Current, 0, None).unwrap().is_empty());

    let err = session.stacktrace(TaskSelector::Current, -1, None).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
}

#[test]
fn test_stacktrace_loads_variables()
{
    let session = stopped_in_inner();
    let frames = session
        .stacktrace(TaskSelector::Current, 3, Some(&LoadConfig::default()))
        .unwrap();

    assert_eq!(frames[0].arguments.len(), 1);
    assert_eq!(frames[0].arguments[0].name, "w");
    assert_eq!(int(&frames[0].arguments[0]), 1);

    assert_eq!(frames[1].arguments[0].name, "v");
    assert_eq!(frames[1].locals[0].name, "depth");
    assert_eq!(int(&frames[1].locals[0]), 1);

    assert_eq!(frames[2].locals[0].name, "x");
    assert_eq!(int(&frames[2].locals[0]), 1);
}

#[test]
fn test_scope_frames()
{
    let session = stopped_in_inner();
    let load = LoadConfig::default();

    let args = session.function_args(EvalScope::current(), &load).unwrap();
    assert_eq!(args.iter().map(|v| v.name.as_str()).collect::<Vec<_>>(), vec!["w"]);
    assert!(session.locals(EvalScope::current(), &load).unwrap().is_empty());

    let locals = session.locals(EvalScope::frame(1), &load).unwrap();
    assert_eq!(locals.len(), 1);
    assert_eq!(int(&locals[0]), 1);

    let frame = session.scope_frame(EvalScope::frame(2)).unwrap();
    assert_eq!(frame.location.function_name(), Some("main.main"));

    let err = session.scope_frame(EvalScope::frame(9)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[test]
fn test_eval_names_result_after_expression()
{
    let session = stopped_in_inner();
    let load = LoadConfig::default();

    let sum = session.eval_variable(EvalScope::current(), "w + 41", &load).unwrap();
    assert_eq!(sum.name, "w + 41");
    assert_eq!(int(&sum), 42);

    let depth = session.eval_variable(EvalScope::frame(1), "depth", &load).unwrap();
    assert_eq!(depth.name, "depth");
    assert_eq!(int(&depth), 1);

    let err = session.eval_variable(EvalScope::current(), "nonexistent", &load).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Evaluation);
}

#[test]
fn test_set_variable_changes_execution()
{
    let mut session = stopped_in_inner();
    session.set_variable(EvalScope::current(), "w", "5").unwrap();
    let state = session.next().unwrap();
    assert_eq!(state.line(), 42);

    let w = session
        .eval_variable(EvalScope::current(), "w", &LoadConfig::default())
        .unwrap();
    assert_eq!(int(&w), 15);

    let err = session.set_variable(EvalScope::current(), "nope", "1").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[test]
fn test_registers_match_stop()
{
    let mut session = launch(call_program());
    BreakpointBuilder::function("main.outer").create(&mut session).unwrap();
    let state = run(&mut session);
    let regs = session.registers().unwrap();
    assert_eq!(Some(regs.pc), state.pc());
}

#[test]
fn test_task_stacks()
{
    let mut session = launch(task_program());
    BreakpointBuilder::function("main.worker")
        .capture_task()
        .create(&mut session)
        .unwrap();
    let state = run(&mut session);
    let worker = state.hit.as_ref().and_then(|hit| hit.task.clone()).expect("captured task");
    assert_eq!(worker.id, TaskId(2));

    let tasks = session.tasks().unwrap();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().any(|task| task.id == TaskId(1) && task.thread.is_none()));

    let current = session.stacktrace(TaskSelector::Current, 10, None).unwrap();
    assert_eq!(current[0].frame.location.function_name(), Some("main.worker"));
    assert_eq!(current.last().unwrap().frame.location.function_name(), Some("runtime.goexit"));

    let parked = session.stacktrace(TaskSelector::Id(TaskId(1)), 10, None).unwrap();
    assert_eq!(parked.len(), 2);
    assert_eq!(parked[0].frame.location.function_name(), Some("main.main"));
    assert_eq!(parked[0].frame.location.line, 53);
    assert_eq!(parked[0].frame.task, Some(TaskId(1)));
    assert_eq!(parked[1].frame.location.function_name(), Some("runtime.rt0"));

    let id = session
        .eval_variable(EvalScope::current(), "id", &LoadConfig::default())
        .unwrap();
    assert_eq!(int(&id), 7);

    let err = session.stacktrace(TaskSelector::Id(TaskId(99)), 10, None).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[test]
fn test_switch_task_changes_current_scope()
{
    let mut session = launch(task_program());
    BreakpointBuilder::function("main.worker").create(&mut session).unwrap();
    run(&mut session);

    let task = session.switch_task(TaskId(1)).unwrap();
    assert_eq!(task.id, TaskId(1));
    let frame = session.scope_frame(EvalScope::current()).unwrap();
    assert_eq!(frame.location.function_name(), Some("main.main"));

    let frame = session.scope_frame(EvalScope::task(TaskId(2), 0)).unwrap();
    assert_eq!(frame.location.function_name(), Some("main.worker"));

    let err = session.switch_task(TaskId(42)).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[test]
fn test_threads()
{
    let image = strider_core::sim::ProgramBuilder::new()
        .threads(2)
        .function("main.main", 1, |f| {
            f.line(2).nop();
            f.line(3).ret();
        })
        .build();
    let mut session = launch(image);
    BreakpointBuilder::file_line("main.go", 3).create(&mut session).unwrap();
    run(&mut session);

    let threads = session.threads().unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].id, ThreadId(1));
    assert!(threads[0].breakpoint.is_some());
    assert_eq!(threads[0].location.line, 3);
    assert!(threads[1].task.is_none());

    let err = session.thread(-1).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
    let err = session.thread(7).unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);

    let parked = session.switch_thread(2).unwrap();
    assert_eq!(parked.id, ThreadId(2));
    assert_eq!(session.registers().unwrap().pc, Address::ZERO);

    session.switch_thread(1).unwrap();
    assert_eq!(session.registers().unwrap().pc, threads[0].pc);
}
