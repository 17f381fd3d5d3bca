//! Programs and session helpers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use strider_core::prelude::*;
use strider_core::sim::{Cmp, ProgramBuilder, ProgramImage, SimEvaluator, SimLauncher};
use strider_core::types::TypeInfo;

/// Loop calling a helper five times.
///
/// ```text
///  3 func main() {
///  4     i := 0
///  5     accumulate(i)          // label top
///  6     i++
///  7     if i < 5 { goto top }
///  8 }
///
/// 11 func accumulate(n int) {
/// 12     total += 1
/// 13 }
/// ```
pub fn loop_program() -> ProgramImage
{
    ProgramBuilder::new()
        .global("main.total", TypeInfo::int(), 0)
        .function("main.main", 3, |f| {
            f.local("i");
            f.line(4).set("i", 0);
            f.line(5).label("top").call_with("main.accumulate", vec!["i".into()]);
            f.line(6).add("i", 1);
            f.line(7).jump_if("i", Cmp::Lt, 5, "top");
            f.line(8).ret();
        })
        .function("main.accumulate", 11, |f| {
            f.arg("n");
            f.line(12).add("main.total", 1);
            f.line(13).ret();
        })
        .build()
}

/// A call chain with a function without debug information in the middle.
///
/// ```text
/// 20 func main() {
/// 21     x := 1
/// 22     outer(x)
/// 23     helper()              // no debug info
/// 24     x = 2
/// 25 }
///
/// 30 func outer(v int) {
/// 31     depth := 1
/// 32     inner(v)
/// 33     depth = 2
/// 34 }
///
/// 40 func inner(w int) {
/// 41     w += 10
/// 42 }
/// ```
pub fn call_program() -> ProgramImage
{
    ProgramBuilder::new()
        .function("main.main", 20, |f| {
            f.local("x");
            f.line(21).set("x", 1);
            f.line(22).call_with("main.outer", vec!["x".into()]);
            f.line(23).call("runtime.helper");
            f.line(24).set("x", 2);
            f.line(25).ret();
        })
        .function("main.outer", 30, |f| {
            f.arg("v");
            f.local("depth");
            f.line(31).set("depth", 1);
            f.line(32).call_with("main.inner", vec!["v".into()]);
            f.line(33).set("depth", 2);
            f.line(34).ret();
        })
        .function("main.inner", 40, |f| {
            f.arg("w");
            f.line(41).add("w", 10);
            f.line(42).ret();
        })
        .extern_function("runtime.helper", |f| {
            f.nop().nop().ret();
        })
        .build()
}

/// Main spawns a worker task and yields to it.
///
/// ```text
/// 50 func main() {
/// 51     go worker(7)
/// 52     runtime.Gosched()
/// 53     done()
/// 54 }
///
/// 60 func worker(id int) {
/// 61     count += 1
/// 62 }
/// ```
pub fn task_program() -> ProgramImage
{
    ProgramBuilder::new()
        .global("main.count", TypeInfo::int(), 0)
        .function("main.main", 50, |f| {
            f.line(51).spawn_with("main.worker", vec![7.into()]);
            f.line(52).yield_now();
            f.line(53).nop();
            f.line(54).ret();
        })
        .function("main.worker", 60, |f| {
            f.arg("id");
            f.line(61).add("main.count", 1);
            f.line(62).ret();
        })
        .build()
}

pub fn launch_with(image: ProgramImage, config: DebuggerConfig) -> Session
{
    strider_utils::init_test_logging();
    Session::launch(
        Box::new(SimLauncher::new(Arc::new(image))),
        Arc::new(SimEvaluator),
        config,
    )
    .expect("launch simulated process")
}

pub fn launch(image: ProgramImage) -> Session
{
    launch_with(image, DebuggerConfig::default())
}

/// Continue and return the terminal state.
pub fn run(session: &mut Session) -> ExecutionState
{
    session.continue_execution().terminal()
}

/// Break at `function`, continue to it, then clear the breakpoint.
pub fn run_to_function(session: &mut Session, function: &str) -> ExecutionState
{
    let bp = BreakpointBuilder::function(function)
        .create(session)
        .expect("create breakpoint");
    let state = run(session);
    assert_eq!(state.function_name(), Some(function), "stopped in {:?}", state.function_name());
    session.clear_breakpoint(bp.id).expect("clear breakpoint");
    state
}

/// Load a global as an integer in the current scope.
pub fn global(session: &Session, name: &str) -> i64
{
    session
        .eval_variable(EvalScope::current(), name, &LoadConfig::default())
        .expect("evaluate global")
        .value
        .as_i64()
        .expect("integer global")
}
