//! Tests for error handling

use strider_core::error::{ErrorCategory, Result, StriderError, TargetFault};
use strider_core::types::{Address, ProcessId};

#[test]
fn test_error_categories()
{
    let cases = [
        (StriderError::NotFound("x".into()), ErrorCategory::NotFound),
        (
            StriderError::Ambiguous {
                location: "Serve".into(),
                candidates: vec!["a.Serve".into(), "b.Serve".into()],
            },
            ErrorCategory::Ambiguous,
        ),
        (StriderError::InvalidArgument("x".into()), ErrorCategory::InvalidArgument),
        (
            StriderError::BreakpointExists {
                id: 1,
                address: Address::new(0x10),
            },
            ErrorCategory::AlreadyExists,
        ),
        (StriderError::ProcessTerminated(ProcessId(1)), ErrorCategory::ProcessTerminated),
        (StriderError::AttachRestricted(ProcessId(1)), ErrorCategory::AttachRestricted),
        (StriderError::Evaluation("x".into()), ErrorCategory::Evaluation),
        (StriderError::Target("x".into()), ErrorCategory::Target),
        (
            StriderError::MemoryAccess {
                address: Address::new(0x10),
                details: "unmapped".into(),
            },
            ErrorCategory::Target,
        ),
    ];
    for (err, category) in cases {
        assert_eq!(err.category(), category, "{err}");
    }
}

#[test]
fn test_error_messages()
{
    let err = StriderError::Ambiguous {
        location: "Serve".into(),
        candidates: vec!["a.Serve".into(), "b.Serve".into()],
    };
    assert_eq!(err.to_string(), "location \"Serve\" ambiguous: a.Serve, b.Serve");

    let err = StriderError::ProcessTerminated(ProcessId(4000));
    assert_eq!(err.to_string(), "process 4000 has exited or was detached");
    assert!(err.is_terminated());

    let err = StriderError::NotFound("main.go:99".into());
    assert!(err.to_string().contains("main.go:99"));
    assert!(!err.is_terminated());
}

#[test]
fn test_io_error_converts()
{
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
    let err: StriderError = io.into();
    assert_eq!(err.category(), ErrorCategory::Target);
    assert!(err.to_string().contains("pipe closed"));
}

#[test]
fn test_target_fault_from_error()
{
    let fault = TargetFault::from(StriderError::ProcessTerminated(ProcessId(9)));
    assert_eq!(fault, TargetFault::ProcessTerminated(ProcessId(9)));

    let fault = TargetFault::from(StriderError::Target("lost thread".into()));
    assert_eq!(fault, TargetFault::Internal("target error: lost thread".into()));
}

#[test]
fn test_target_fault_messages()
{
    let fault = TargetFault::ExitStatus {
        pid: ProcessId(12),
        status: 3,
    };
    assert_eq!(fault.to_string(), "process 12 has exited with status 3");

    let fault = TargetFault::Condition {
        id: 2,
        message: "unknown name".into(),
    };
    assert!(fault.to_string().contains("breakpoint 2"));
}

#[test]
fn test_result_type_alias()
{
    fn parse(text: &str) -> Result<u32>
    {
        text.parse()
            .map_err(|_| StriderError::InvalidArgument(format!("not a number: {text}")))
    }

    assert_eq!(parse("7").unwrap(), 7);
    assert_eq!(parse("x").unwrap_err().category(), ErrorCategory::InvalidArgument);
}
