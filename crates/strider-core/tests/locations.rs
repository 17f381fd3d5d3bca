//! Location expressions resolved through a stopped session

mod common;

use strider_core::prelude::*;
use strider_core::sim::ProgramBuilder;
use strider_core::types::TypeInfo;

use common::{launch, launch_with, loop_program, run};

fn find(session: &Session, expr: &str) -> Result<Vec<Location>>
{
    session.find_location(EvalScope::current(), expr)
}

fn stopped_on_line_6() -> Session
{
    let mut session = launch(loop_program());
    BreakpointBuilder::file_line("main.go", 6).create(&mut session).unwrap();
    run(&mut session);
    session
}

/// Two packages with same-named files and methods.
fn package_program() -> strider_core::sim::ProgramImage
{
    ProgramBuilder::new()
        .file("/src/app/main.go")
        .function("main.main", 3, |f| {
            f.local_typed("callback", TypeInfo::func());
            f.line(4).store_func("callback", "net/http.(*Server).Serve");
            f.line(5).call("net/http.(*Server).Serve");
            f.line(6).call("example.com/db.(*Conn).Serve");
            f.line(7).ret();
        })
        .file("/src/net/http/server.go")
        .function("net/http.(*Server).Serve", 10, |f| {
            f.line(11).nop();
            f.line(12).ret();
        })
        .file("/src/db/server.go")
        .function("example.com/db.(*Conn).Serve", 20, |f| {
            f.line(21).nop();
            f.line(22).ret();
        })
        .build()
}

#[test]
fn test_function_forms()
{
    let session = launch(package_program());

    let full = find(&session, "net/http.(*Server).Serve").unwrap();
    assert_eq!(full.len(), 1);
    assert_eq!(full[0].line, 11);

    let receiver = find(&session, "Server.Serve").unwrap();
    assert_eq!(receiver[0].pc, full[0].pc);

    let package = find(&session, "http.Serve").unwrap();
    assert_eq!(package[0].pc, full[0].pc);

    let err = find(&session, "Serve").unwrap_err();
    match err {
        StriderError::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 2),
        other => panic!("expected Ambiguous, got {other:?}"),
    }

    let offset = find(&session, "db.Serve:2").unwrap();
    assert_eq!(offset[0].line, 22);
}

#[test]
fn test_file_forms()
{
    let session = launch(package_program());

    let exact = find(&session, "/src/app/main.go:5").unwrap();
    assert_eq!(exact[0].line, 5);
    assert_eq!(exact[0].function_name(), Some("main.main"));

    let suffix = find(&session, "http/server.go:12").unwrap();
    assert_eq!(suffix[0].function_name(), Some("net/http.(*Server).Serve"));

    let err = find(&session, "server.go:11").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Ambiguous);

    let err = find(&session, "main.go").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);

    let err = find(&session, "nowhere.go:1").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[test]
fn test_case_insensitive_paths()
{
    let strict = launch(package_program());
    let err = find(&strict, "APP/MAIN.GO:5").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);

    let folding = launch_with(
        package_program(),
        DebuggerConfig::default().with_case_insensitive_paths(true),
    );
    let found = find(&folding, "APP/MAIN.GO:5").unwrap();
    assert_eq!(found[0].line, 5);
    assert!(found[0].case_folded);
}

#[test]
fn test_regex_matches_every_function()
{
    let session = launch(package_program());
    let found = find(&session, "/Serve$/").unwrap();
    assert_eq!(found.len(), 2);
    assert!(found[0].pc < found[1].pc);

    let symbols = session.symbols().unwrap();
    for (location, name) in found.iter().zip(["net/http.(*Server).Serve", "example.com/db.(*Conn).Serve"]) {
        let function = symbols.function_by_name(name).unwrap();
        assert_eq!(location.pc, symbols.prologue_end(&function));
        assert_eq!(location.function_name(), Some(name));
    }

    let none = find(&session, "/^nothing/").unwrap();
    assert!(none.is_empty());

    let err = find(&session, "/(/").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
}

#[test]
fn test_address_forms()
{
    let mut session = launch(package_program());
    let serve = session
        .symbols()
        .unwrap()
        .function_by_name("net/http.(*Server).Serve")
        .unwrap();

    let literal = find(&session, &format!("*{:#x}", serve.entry.value())).unwrap();
    assert_eq!(literal[0].pc, serve.entry);

    // Needs a frame where `callback` is set.
    BreakpointBuilder::file_line("main.go", 5).create(&mut session).unwrap();
    run(&mut session);
    let through_variable = find(&session, "*callback").unwrap();
    assert_eq!(through_variable[0].line, 11);

    let err = find(&session, "*-1").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::InvalidArgument);
}

#[test]
fn test_relative_forms()
{
    let session = stopped_on_line_6();

    let here = find(&session, "+0").unwrap();
    assert_eq!(here[0].line, 6);

    let next = find(&session, "+1").unwrap();
    assert_eq!(next[0].line, 7);

    let previous = find(&session, "-2").unwrap();
    assert_eq!(previous[0].line, 4);

    let absolute = find(&session, "8").unwrap();
    assert_eq!(absolute[0].line, 8);

    let err = find(&session, "+50").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}

#[test]
fn test_relative_forms_need_a_source_location()
{
    // Stopped at the runtime entry point.
    let session = launch(loop_program());
    let err = find(&session, "+1").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
}
