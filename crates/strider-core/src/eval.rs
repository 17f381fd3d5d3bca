//! # Evaluation Scope
//!
//! Binds a `(task, frame)` pair to concrete stack memory and exposes its
//! variables to an external [`Evaluator`].
//!
//! The core does not parse expressions. It resolves an [`EvalScope`] to a
//! [`FrameScope`], which implements [`EvalContext`]: name lookup over the
//! frame's arguments and locals, then globals, with values read from target
//! memory on demand.

use std::sync::Arc;

use tracing::trace;

use crate::config::LoadConfig;
use crate::error::{Result, StriderError};
use crate::symbols::SymbolCache;
use crate::target::TargetControl;
use crate::types::{
    Address, Function, StackFrame, TaskId, TypeInfo, TypeKind, Value, VarLocation, Variable, VariableInfo, VariableKind,
};

/// Which task a scope refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskSelector
{
    /// The task (or thread) that most recently stopped or was selected.
    Current,
    /// A specific task.
    Id(TaskId),
}

/// `(task, frame offset)` pair naming a frame to evaluate in
///
/// Frame offset 0 is the innermost frame.
///
/// ```rust
/// use strider_core::eval::{EvalScope, TaskSelector};
///
/// let scope = EvalScope::from_raw(-1, 2).unwrap();
/// assert_eq!(scope.task, TaskSelector::Current);
/// assert_eq!(scope.frame, 2);
/// assert!(EvalScope::from_raw(-2, 0).is_err());
/// assert!(EvalScope::from_raw(-1, -1).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalScope
{
    /// Task to evaluate in.
    pub task: TaskSelector,
    /// Frames outward from the innermost.
    pub frame: usize,
}

impl Default for EvalScope
{
    fn default() -> Self
    {
        Self::current()
    }
}

impl EvalScope
{
    /// Innermost frame of the current task.
    pub const fn current() -> Self
    {
        Self {
            task: TaskSelector::Current,
            frame: 0,
        }
    }

    /// `frame` frames out from the innermost frame of the current task.
    pub const fn frame(frame: usize) -> Self
    {
        Self {
            task: TaskSelector::Current,
            frame,
        }
    }

    /// A frame of a specific task.
    pub const fn task(task: TaskId, frame: usize) -> Self
    {
        Self {
            task: TaskSelector::Id(task),
            frame,
        }
    }

    /// Build from wire-style integers where task `-1` means "current".
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` for any other negative task id or a negative frame.
    pub fn from_raw(task: i64, frame: i64) -> Result<Self>
    {
        let task = match task {
            -1 => TaskSelector::Current,
            id if id < 0 => return Err(StriderError::InvalidArgument(format!("invalid task id {id}"))),
            id => TaskSelector::Id(TaskId(id.unsigned_abs())),
        };
        let frame = usize::try_from(frame)
            .map_err(|_| StriderError::InvalidArgument(format!("invalid frame offset {frame}")))?;
        Ok(Self { task, frame })
    }
}

/// What an [`Evaluator`] can ask of the scope it runs in.
pub trait EvalContext
{
    /// The frame being evaluated in.
    fn frame(&self) -> &StackFrame;

    /// Load a variable by name: arguments and locals first, then globals.
    ///
    /// ## Errors
    ///
    /// `NotFound` if no such variable is visible.
    fn lookup(&self, name: &str) -> Result<Variable>;

    /// Function with this fully qualified name, for function-valued
    /// expressions.
    fn function_named(&self, name: &str) -> Option<Arc<Function>>;
}

/// Expression evaluation, supplied by the embedder.
pub trait Evaluator: Send + Sync
{
    /// Evaluate `expr` in `ctx`.
    ///
    /// ## Errors
    ///
    /// `Evaluation` on syntax errors, type errors or unknown names.
    fn evaluate(&self, ctx: &dyn EvalContext, expr: &str, load: &LoadConfig) -> Result<Variable>;
}

/// A resolved scope: one frame plus the means to read its variables.
pub struct FrameScope<'a>
{
    target: &'a dyn TargetControl,
    symbols: &'a SymbolCache,
    frame: StackFrame,
}

impl<'a> FrameScope<'a>
{
    pub(crate) fn new(target: &'a dyn TargetControl, symbols: &'a SymbolCache, frame: StackFrame) -> Self
    {
        Self { target, symbols, frame }
    }

    /// Descriptors of the frame's arguments and locals.
    pub fn variable_infos(&self) -> Arc<[VariableInfo]>
    {
        self.frame.variables_with(|| match self.frame.function() {
            Some(function) => self.symbols.variables(function, self.frame.pc),
            None => Vec::new(),
        })
    }

    /// Load every variable of one kind, in declaration order.
    pub fn load_all(&self, kind: VariableKind) -> Vec<Variable>
    {
        self.variable_infos()
            .iter()
            .filter(|info| info.kind == kind)
            .map(|info| self.load(info))
            .collect()
    }

    /// Load one variable; a failed read yields an unreadable value.
    pub fn load(&self, info: &VariableInfo) -> Variable
    {
        load_variable(self.target, self.symbols, self.frame.cfa, info)
    }

    /// Find a visible variable descriptor by name.
    pub fn find(&self, name: &str) -> Option<VariableInfo>
    {
        let infos = self.variable_infos();
        infos
            .iter()
            .rev()
            .find(|info| info.name == name)
            .or_else(|| self.symbols.globals().iter().find(|info| info.name == name))
            .cloned()
    }

    /// Address a variable lives at in this frame.
    pub fn address_of(&self, info: &VariableInfo) -> Address
    {
        variable_address(self.frame.cfa, info)
    }

    /// Consume the scope, keeping the frame.
    pub fn into_frame(self) -> StackFrame
    {
        self.frame
    }
}

impl EvalContext for FrameScope<'_>
{
    fn frame(&self) -> &StackFrame
    {
        &self.frame
    }

    fn lookup(&self, name: &str) -> Result<Variable>
    {
        let info = self
            .find(name)
            .ok_or_else(|| StriderError::NotFound(format!("could not find symbol value for {name}")))?;
        Ok(self.load(&info))
    }

    fn function_named(&self, name: &str) -> Option<Arc<Function>>
    {
        self.symbols.function_by_name(name)
    }
}

fn variable_address(cfa: Address, info: &VariableInfo) -> Address
{
    match info.location {
        VarLocation::Cfa(offset) => cfa.offset(offset),
        VarLocation::Absolute(address) => address,
    }
}

/// Read and decode a variable relative to a frame's CFA.
pub(crate) fn load_variable(target: &dyn TargetControl, symbols: &SymbolCache, cfa: Address, info: &VariableInfo) -> Variable
{
    let address = variable_address(cfa, info);
    let value = match target.read_memory(address, usize::from(info.ty.size)) {
        Ok(bytes) => decode_value(symbols, &info.ty, &bytes),
        Err(err) => {
            trace!(name = %info.name, %address, error = %err, "variable unreadable");
            Value::Unreadable(err.to_string())
        }
    };
    Variable {
        name: info.name.clone(),
        address: Some(address),
        type_name: info.ty.name.clone(),
        value,
    }
}

fn decode_value(symbols: &SymbolCache, ty: &TypeInfo, bytes: &[u8]) -> Value
{
    if bytes.len() != usize::from(ty.size) || bytes.is_empty() || bytes.len() > 8 {
        return Value::Unreadable(format!("short read of {} bytes for {}", bytes.len(), ty.name));
    }
    let mut word = [0u8; 8];
    word[..bytes.len()].copy_from_slice(bytes);
    let raw = u64::from_le_bytes(word);
    match ty.kind {
        TypeKind::Int => {
            let shift = 64 - 8 * bytes.len() as u32;
            Value::Int(((raw << shift) as i64) >> shift)
        }
        TypeKind::Uint => Value::Uint(raw),
        TypeKind::Bool => Value::Bool(raw != 0),
        TypeKind::Pointer => Value::Pointer(Address::from(raw)),
        TypeKind::Func => {
            let entry = Address::from(raw);
            let name = symbols
                .function_at(entry)
                .filter(|f| f.entry == entry)
                .map(|f| f.name.clone());
            Value::Func { entry, name }
        }
    }
}

/// Encode a value for a variable of type `ty`.
pub(crate) fn encode_value(ty: &TypeInfo, value: &Value) -> Result<Vec<u8>>
{
    if ty.size == 0 || ty.size > 8 {
        return Err(StriderError::Evaluation(format!(
            "cannot assign to {}: unsupported size {}",
            ty.name, ty.size
        )));
    }
    let raw: u64 = match (ty.kind, value) {
        (_, Value::Unreadable(reason)) => {
            return Err(StriderError::Evaluation(format!("cannot assign unreadable value: {reason}")));
        }
        (TypeKind::Bool, Value::Bool(v)) => u64::from(*v),
        (TypeKind::Bool, other) => {
            return Err(StriderError::Evaluation(format!("cannot assign {other} to {}", ty.name)));
        }
        (TypeKind::Int | TypeKind::Uint, Value::Int(v)) => *v as u64,
        (TypeKind::Int | TypeKind::Uint, Value::Uint(v)) => *v,
        (TypeKind::Pointer, Value::Pointer(addr)) => addr.value(),
        (TypeKind::Pointer | TypeKind::Func, Value::Int(0) | Value::Uint(0)) => 0,
        (TypeKind::Func, Value::Func { entry, .. }) => entry.value(),
        (_, other) => {
            return Err(StriderError::Evaluation(format!("cannot assign {other} to {}", ty.name)));
        }
    };
    Ok(raw.to_le_bytes()[..usize::from(ty.size)].to_vec())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_from_raw_accepts_explicit_task()
    {
        let scope = EvalScope::from_raw(7, 0).unwrap();
        assert_eq!(scope.task, TaskSelector::Id(TaskId(7)));
    }

    #[test]
    fn test_encode_value_truncates_to_size()
    {
        let ty = TypeInfo {
            name: "int32".into(),
            kind: TypeKind::Int,
            size: 4,
        };
        assert_eq!(encode_value(&ty, &Value::Int(-1)).unwrap(), vec![0xff; 4]);
    }

    #[test]
    fn test_encode_value_rejects_unsupported_sizes()
    {
        for size in [0, 9, 16] {
            let ty = TypeInfo {
                name: "wide".into(),
                kind: TypeKind::Int,
                size,
            };
            let err = encode_value(&ty, &Value::Int(1)).unwrap_err();
            assert!(matches!(err, StriderError::Evaluation(_)), "size {size}: {err}");
        }
    }

    #[test]
    fn test_encode_value_rejects_bool_for_int()
    {
        assert!(encode_value(&TypeInfo::int(), &Value::Bool(true)).is_err());
        assert!(encode_value(&TypeInfo::bool(), &Value::Int(1)).is_err());
    }
}
