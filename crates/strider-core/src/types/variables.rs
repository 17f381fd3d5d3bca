//! Variable values as seen by clients.

use std::fmt;

use super::Address;

/// Scalar value of a variable
///
/// ```rust
/// use strider_core::types::Value;
///
/// assert_eq!(Value::Int(-3).to_string(), "-3");
/// assert_eq!(Value::Bool(true).to_string(), "true");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value
{
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    Uint(u64),
    /// Boolean.
    Bool(bool),
    /// Data pointer.
    Pointer(Address),
    /// Function reference.
    Func
    {
        /// Entry address (zero for a nil function value).
        entry: Address,
        /// Name of the referenced function, if it resolved.
        name: Option<String>,
    },
    /// The value could not be loaded.
    Unreadable(String),
}

impl Value
{
    /// Integer view of the value (booleans are 0/1, pointers their address).
    pub fn as_i64(&self) -> Option<i64>
    {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(i64::from(*v)),
            Value::Pointer(addr) => i64::try_from(addr.value()).ok(),
            Value::Func { entry, .. } => i64::try_from(entry.value()).ok(),
            Value::Unreadable(_) => None,
        }
    }

    /// Boolean view of the value.
    pub fn as_bool(&self) -> Option<bool>
    {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Whether loading the value failed.
    pub fn is_unreadable(&self) -> bool
    {
        matches!(self, Value::Unreadable(_))
    }
}

impl fmt::Display for Value
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Pointer(addr) => write!(f, "{addr}"),
            Value::Func { name: Some(name), .. } => write!(f, "{name}"),
            Value::Func { entry, name: None } if entry.is_zero() => write!(f, "nil"),
            Value::Func { entry, name: None } => write!(f, "{entry}"),
            Value::Unreadable(reason) => write!(f, "(unreadable {reason})"),
        }
    }
}

/// A named, typed value
///
/// For evaluated expressions the name is the expression text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable
{
    /// Variable name or expression text.
    pub name: String,
    /// Address the value was loaded from, if it has one.
    pub address: Option<Address>,
    /// Type name.
    pub type_name: String,
    /// Loaded value.
    pub value: Value,
}

impl Variable
{
    /// A variable whose value could not be loaded.
    pub fn unreadable(name: impl Into<String>, reason: impl Into<String>) -> Self
    {
        Self {
            name: name.into(),
            address: None,
            type_name: String::new(),
            value: Value::Unreadable(reason.into()),
        }
    }
}

impl fmt::Display for Variable
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{} = {}", self.name, self.value)
    }
}
