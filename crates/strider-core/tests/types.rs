//! Tests for platform-agnostic types

use strider_core::types::{Address, ProcessId, RegisterId, Registers, StopReason, TaskId, ThreadId, Value, Variable};

#[test]
fn test_process_id_conversions()
{
    let pid = ProcessId::from(12345);
    assert_eq!(pid.0, 12345);
    let value: u32 = pid.into();
    assert_eq!(value, 12345);
    assert_eq!(pid.to_string(), "12345");
}

#[test]
fn test_process_id_equality()
{
    let pid1 = ProcessId::from(12345);
    let pid2 = ProcessId::from(12345);
    let pid3 = ProcessId::from(54321);

    assert_eq!(pid1, pid2);
    assert_ne!(pid1, pid3);
}

#[test]
fn test_thread_and_task_ids()
{
    assert_eq!(ThreadId::from(7).raw(), 7);
    assert_eq!(TaskId::from(3).raw(), 3);
    assert!(ThreadId(1) < ThreadId(2));
}

#[test]
fn test_address_display_is_hex()
{
    assert_eq!(Address::new(0x401000).to_string(), "0x401000");
    assert_eq!(format!("{:x}", Address::new(0xbeef)), "beef");
    assert_eq!(Address::ZERO.to_string(), "0x0");
}

#[test]
fn test_address_arithmetic()
{
    let base = Address::new(0x1000);
    assert_eq!(base + 0x10, Address::new(0x1010));
    assert_eq!(base - 0x10, Address::new(0x0ff0));
    assert_eq!(base.offset(-8), Address::new(0x0ff8));
    assert_eq!(base.offset(8), Address::new(0x1008));
    assert_eq!(Address::new(0x1010).distance_from(base), Some(0x10));
    assert_eq!(base.distance_from(Address::new(0x1010)), None);
}

#[test]
fn test_address_checked_arithmetic()
{
    assert_eq!(Address::new(u64::MAX).checked_add(1), None);
    assert_eq!(Address::ZERO.checked_sub(1), None);
    assert_eq!(Address::new(4).checked_sub(4), Some(Address::ZERO));
    assert!(Address::ZERO.is_zero());
    assert!(!Address::new(1).is_zero());
}

#[test]
fn test_registers_new()
{
    let regs = Registers::new();
    assert_eq!(regs.pc, Address::ZERO);
    assert_eq!(regs.sp, Address::ZERO);
    assert_eq!(regs.fp, Address::ZERO);
    assert_eq!(regs.general.len(), 0);
    assert_eq!(regs.status, 0);
    assert_eq!(Registers::default(), regs);
}

#[test]
fn test_registers_get_and_set()
{
    let mut regs = Registers::new();
    regs.general = vec![0; 4];

    assert_eq!(regs.set(RegisterId::Pc, 0x401000), Some(()));
    assert_eq!(regs.pc, Address::new(0x401000));
    assert_eq!(regs.get(RegisterId::Pc), Some(0x401000));

    assert_eq!(regs.set(RegisterId::General(2), 99), Some(()));
    assert_eq!(regs.get(RegisterId::General(2)), Some(99));

    // Out of range leaves the set untouched
    assert_eq!(regs.set(RegisterId::General(9), 1), None);
    assert_eq!(regs.get(RegisterId::General(9)), None);
}

#[test]
fn test_stop_reason_exit_classification()
{
    assert!(StopReason::Exited(0).is_exit());
    assert!(StopReason::Killed(9).is_exit());
    assert!(!StopReason::Signal(11).is_exit());
    assert!(!StopReason::Trap(Address::new(0x10)).is_exit());
    assert!(!StopReason::Interrupted.is_exit());
}

#[test]
fn test_stop_reason_display()
{
    assert_eq!(StopReason::Trap(Address::new(0x10)).to_string(), "hit trap at 0x10");
    assert_eq!(StopReason::Exited(3).to_string(), "exited with status 3");
    assert_eq!(StopReason::Killed(9).to_string(), "killed by signal 9");
}

#[test]
fn test_value_views()
{
    assert_eq!(Value::Int(-4).as_i64(), Some(-4));
    assert_eq!(Value::Uint(u64::MAX).as_i64(), None);
    assert_eq!(Value::Bool(true).as_i64(), Some(1));
    assert_eq!(Value::Bool(false).as_bool(), Some(false));
    assert_eq!(Value::Int(1).as_bool(), None);
    assert!(Value::Unreadable("gone".into()).is_unreadable());
}

#[test]
fn test_func_value_display()
{
    let named = Value::Func {
        entry: Address::new(0x401000),
        name: Some("main.main".into()),
    };
    assert_eq!(named.to_string(), "main.main");

    let nil = Value::Func {
        entry: Address::ZERO,
        name: None,
    };
    assert_eq!(nil.to_string(), "nil");
}

#[test]
fn test_unreadable_variable()
{
    let var = Variable::unreadable("x", "no frame");
    assert_eq!(var.to_string(), "x = (unreadable no frame)");
    assert!(var.address.is_none());
}
