//! Function, line table, and source location types.

use std::fmt;
use std::sync::Arc;

use super::Address;

/// One row of a function's line table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEntry
{
    /// First address of the row.
    pub address: Address,
    /// Source file of the row.
    pub file: String,
    /// 1-based source line.
    pub line: u32,
    /// Whether the row is a recommended breakpoint location for its line.
    pub is_stmt: bool,
    /// Whether the row is the first one after the function's prologue.
    pub prologue_end: bool,
}

/// A function known to the symbol service
///
/// Functions without debug information (runtime trampolines, foreign code)
/// have an empty line table and no file.
///
/// ## Name layout
///
/// Names are fully qualified: `package/path.Receiver.method` or
/// `package/path.function`. The package path may contain `/`; the package,
/// receiver and base components are split on `.` only after the last `/`.
///
/// ```rust
/// use strider_core::types::{Address, Function};
///
/// let f = Function::new("io/ioutil.(*File).ReadAt", Address::from(0x1000), Address::from(0x1080));
/// assert_eq!(f.package_name(), "io/ioutil");
/// assert_eq!(f.receiver_name(), "(*File)");
/// assert_eq!(f.base_name(), "ReadAt");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Function
{
    /// Fully qualified name.
    pub name: String,
    /// First instruction.
    pub entry: Address,
    /// One past the last instruction.
    pub end: Address,
    /// Declaring source file, when debug info is present.
    pub file: Option<String>,
    /// Line of the declaration.
    pub decl_line: u32,
    /// Address at which the frame pointer chain is established, if known.
    pub frame_setup: Option<Address>,
    /// Line table rows, sorted by address.
    pub lines: Vec<LineEntry>,
}

impl Function
{
    /// A function with no debug information.
    pub fn new(name: impl Into<String>, entry: Address, end: Address) -> Self
    {
        Self {
            name: name.into(),
            entry,
            end,
            file: None,
            decl_line: 0,
            frame_setup: None,
            lines: Vec::new(),
        }
    }

    /// Whether the function carries a line table.
    pub fn has_debug_info(&self) -> bool
    {
        !self.lines.is_empty()
    }

    /// Whether `pc` lies inside `[entry, end)`.
    pub fn contains(&self, pc: Address) -> bool
    {
        pc >= self.entry && pc < self.end
    }

    /// First address after the prologue
    ///
    /// The first row flagged `prologue_end`; failing that, the first row past
    /// the entry; failing that, the entry itself.
    pub fn prologue_end(&self) -> Address
    {
        if let Some(row) = self.lines.iter().find(|row| row.prologue_end) {
            return row.address;
        }
        self.lines
            .iter()
            .find(|row| row.address > self.entry)
            .map_or(self.entry, |row| row.address)
    }

    /// Line table row covering `pc`.
    pub fn line_for(&self, pc: Address) -> Option<&LineEntry>
    {
        if !self.contains(pc) {
            return None;
        }
        self.lines.iter().take_while(|row| row.address <= pc).last()
    }

    fn after_path(&self) -> (usize, &str)
    {
        let start = self.name.rfind('/').unwrap_or(0);
        (start, &self.name[start..])
    }

    /// Package component of the name (empty if none).
    pub fn package_name(&self) -> &str
    {
        let (start, tail) = self.after_path();
        match tail.find('.') {
            Some(dot) => &self.name[..start + dot],
            None => "",
        }
    }

    /// Receiver component of the name, decorations included (empty if none).
    pub fn receiver_name(&self) -> &str
    {
        let (start, tail) = self.after_path();
        match (tail.find('.'), tail.rfind('.')) {
            (Some(first), Some(last)) if first != last => &self.name[start + first + 1..start + last],
            _ => "",
        }
    }

    /// Unqualified function name.
    pub fn base_name(&self) -> &str
    {
        match self.name.rfind('.') {
            Some(dot) => &self.name[dot + 1..],
            None => &self.name,
        }
    }
}

impl fmt::Display for Function
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.name)
    }
}

/// A resolved code location
///
/// Purely derived from symbol data; never mutated after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location
{
    /// Program counter.
    pub pc: Address,
    /// Source file, when known.
    pub file: Option<String>,
    /// Source line (0 when unknown).
    pub line: u32,
    /// Enclosing function, when known.
    pub function: Option<Arc<Function>>,
    /// The file only matched after case folding.
    pub case_folded: bool,
}

impl Location
{
    /// A location carrying only an address.
    pub fn from_pc(pc: Address) -> Self
    {
        Self {
            pc,
            file: None,
            line: 0,
            function: None,
            case_folded: false,
        }
    }

    /// Name of the enclosing function, if any.
    pub fn function_name(&self) -> Option<&str>
    {
        self.function.as_deref().map(|f| f.name.as_str())
    }

    /// Whether the location maps to a source line.
    pub fn has_source(&self) -> bool
    {
        self.file.is_some() && self.line != 0
    }
}

impl fmt::Display for Location
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.pc)?;
        if let Some(name) = self.function_name() {
            write!(f, " in {name}")?;
        }
        if let Some(file) = &self.file {
            write!(f, " at {file}:{}", self.line)?;
        }
        Ok(())
    }
}

/// Scalar kind of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind
{
    /// Signed integer.
    Int,
    /// Unsigned integer.
    Uint,
    /// Boolean.
    Bool,
    /// Data pointer.
    Pointer,
    /// Function reference (entry address).
    Func,
}

/// Name, kind and size of a type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfo
{
    /// Display name (`int`, `*main.T`, `func()`).
    pub name: String,
    /// Scalar kind.
    pub kind: TypeKind,
    /// Size in bytes (1..=8).
    pub size: u8,
}

impl TypeInfo
{
    /// 64-bit signed integer.
    pub fn int() -> Self
    {
        Self {
            name: "int".to_string(),
            kind: TypeKind::Int,
            size: 8,
        }
    }

    /// Boolean.
    pub fn bool() -> Self
    {
        Self {
            name: "bool".to_string(),
            kind: TypeKind::Bool,
            size: 1,
        }
    }

    /// Function value.
    pub fn func() -> Self
    {
        Self {
            name: "func()".to_string(),
            kind: TypeKind::Func,
            size: 8,
        }
    }
}

/// Where a variable lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarLocation
{
    /// Offset from the frame's canonical frame address.
    Cfa(i64),
    /// Fixed address (globals).
    Absolute(Address),
}

/// Role of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind
{
    /// Function argument.
    Argument,
    /// Function-local variable.
    Local,
    /// Package-level variable.
    Global,
}

/// Variable descriptor from the symbol service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo
{
    /// Variable name (qualified for globals).
    pub name: String,
    /// Role.
    pub kind: VariableKind,
    /// Type.
    pub ty: TypeInfo,
    /// Storage location.
    pub location: VarLocation,
}
