//! # Simulated Program Images
//!
//! [`ProgramBuilder`] assembles a small instruction set into a
//! [`ProgramImage`] that carries everything a real object file would: code
//! bytes, a line table per function, variable descriptors, globals and type
//! names. The image is the [`SymbolService`] and [`Disassembler`] of the
//! simulated process.
//!
//! ## Layout
//!
//! - Code starts at [`CODE_BASE`]: `runtime.rt0` first (calls `main.main`,
//!   then exits 0), then `runtime.goexit` (where spawned tasks return to),
//!   then the user functions in declaration order, each 16-byte aligned.
//! - Every function built with [`ProgramBuilder::function`] or
//!   [`ProgramBuilder::extern_function`] starts with a two-instruction
//!   prologue, `STACKCHECK` then `ENTER`, on its declaration line. The frame
//!   is set up once `ENTER` has executed.
//! - Arguments live at `CFA + 8*i`, locals at `CFA - 24 - 8*i`. Globals live
//!   at [`GLOBALS_BASE`], 8 bytes apart.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::disasm::{DecodedInstruction, Disassembler, InstructionBytes};
use crate::error::{Result, StriderError};
use crate::symbols::SymbolService;
use crate::types::{Address, Function, LineEntry, TypeInfo, VarLocation, VariableInfo, VariableKind};

/// First code address.
pub const CODE_BASE: u64 = 0x40_1000;
/// First global variable address.
pub const GLOBALS_BASE: u64 = 0x60_0000;
/// File given to functions declared before any [`ProgramBuilder::file`] call.
pub const DEFAULT_FILE: &str = "main.go";
/// Process entry point.
pub const RUNTIME_ENTRY: &str = "runtime.rt0";
/// Return target of spawned tasks.
pub const RUNTIME_GOEXIT: &str = "runtime.goexit";

const PROLOGUE_SIZE: u64 = 9 + 8;

/// Comparison used by conditional jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp
{
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp
{
    /// Whether `lhs <op> rhs` holds.
    pub fn holds(self, lhs: i64, rhs: i64) -> bool
    {
        match self {
            Cmp::Eq => lhs == rhs,
            Cmp::Ne => lhs != rhs,
            Cmp::Lt => lhs < rhs,
            Cmp::Le => lhs <= rhs,
            Cmp::Gt => lhs > rhs,
            Cmp::Ge => lhs >= rhs,
        }
    }

    fn mnemonic(self) -> &'static str
    {
        match self {
            Cmp::Eq => "JEQ",
            Cmp::Ne => "JNE",
            Cmp::Lt => "JLT",
            Cmp::Le => "JLE",
            Cmp::Gt => "JGT",
            Cmp::Ge => "JGE",
        }
    }
}

/// Call argument: an immediate or a variable of the calling frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand
{
    Imm(i64),
    Var(String),
}

impl From<i64> for Operand
{
    fn from(value: i64) -> Self
    {
        Operand::Imm(value)
    }
}

impl From<&str> for Operand
{
    fn from(name: &str) -> Self
    {
        Operand::Var(name.to_string())
    }
}

/// Storage of a variable an instruction touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Slot
{
    pub location: VarLocation,
    pub size: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arg
{
    Imm(i64),
    Slot(Slot),
}

/// Executable form of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Op
{
    StackCheck,
    Enter
    {
        frame_size: u64,
    },
    Nop,
    Set
    {
        slot: Slot,
        value: i64,
    },
    StoreFunc
    {
        slot: Slot,
        entry: Address,
    },
    Add
    {
        slot: Slot,
        delta: i64,
    },
    JumpIf
    {
        slot: Slot,
        cmp: Cmp,
        value: i64,
        target: Address,
    },
    Jump
    {
        target: Address,
    },
    Call
    {
        target: Address,
        args: Vec<Arg>,
    },
    Spawn
    {
        target: Address,
        args: Vec<Arg>,
    },
    Ret,
    Yield,
    TaskExit,
    Trap,
    Exit
    {
        code: i32,
    },
    Fault
    {
        signal: i32,
    },
    Abort
    {
        signal: i32,
    },
}

/// One assembled instruction.
#[derive(Debug, Clone)]
pub(crate) struct Instruction
{
    pub op: Op,
    pub bytes: InstructionBytes,
    pub text: String,
    pub call_target: Option<Address>,
}

impl Instruction
{
    pub fn len(&self) -> u64
    {
        self.bytes.len() as u64
    }
}

#[derive(Debug, Clone)]
enum Draft
{
    StackCheck,
    Enter,
    Nop,
    Set
    {
        var: String,
        value: i64,
    },
    StoreFunc
    {
        var: String,
        function: String,
    },
    Add
    {
        var: String,
        delta: i64,
    },
    JumpIf
    {
        var: String,
        cmp: Cmp,
        value: i64,
        label: String,
    },
    Jump
    {
        label: String,
    },
    Call
    {
        function: String,
        args: Vec<Operand>,
    },
    Spawn
    {
        function: String,
        args: Vec<Operand>,
    },
    Ret,
    Yield,
    TaskExit,
    Trap,
    Exit(i32),
    Fault(i32),
    Abort(i32),
}

impl Draft
{
    fn size(&self) -> u64
    {
        match self {
            Draft::StackCheck => 9,
            Draft::Enter | Draft::Set { .. } | Draft::StoreFunc { .. } => 8,
            Draft::Add { .. } | Draft::Call { .. } | Draft::Spawn { .. } | Draft::Exit(_) => 5,
            Draft::JumpIf { .. } => 6,
            Draft::Jump { .. } | Draft::Yield | Draft::TaskExit | Draft::Fault(_) | Draft::Abort(_) => 2,
            Draft::Nop | Draft::Ret | Draft::Trap => 1,
        }
    }

    fn opcode(&self) -> u8
    {
        match self {
            Draft::StackCheck => 0x01,
            Draft::Enter => 0x02,
            Draft::Nop => 0x90,
            Draft::Set { .. } => 0x10,
            Draft::StoreFunc { .. } => 0x11,
            Draft::Add { .. } => 0x12,
            Draft::JumpIf { .. } => 0x20,
            Draft::Jump { .. } => 0xeb,
            Draft::Call { .. } => 0xe8,
            Draft::Spawn { .. } => 0xe9,
            Draft::Ret => 0xc3,
            Draft::Yield => 0x30,
            Draft::TaskExit => 0x31,
            Draft::Trap => 0xcc,
            Draft::Exit(_) => 0x40,
            Draft::Fault(_) => 0x41,
            Draft::Abort(_) => 0x42,
        }
    }

    fn max_args(&self) -> usize
    {
        match self {
            Draft::Call { args, .. } | Draft::Spawn { args, .. } => args.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone)]
struct DraftRow
{
    draft: Draft,
    line: Option<u32>,
    starts_row: bool,
    labels: Vec<String>,
}

/// Body of one function, filled in by the closure given to
/// [`ProgramBuilder::function`].
///
/// Every instruction method returns `&mut Self` so a line and its
/// instructions read as one statement: `f.line(12).add("i", 1).jump("loop");`
#[derive(Debug, Clone)]
pub struct FunctionBuilder
{
    name: String,
    decl_line: u32,
    debug_info: bool,
    prologue: bool,
    args: Vec<(String, TypeInfo)>,
    locals: Vec<(String, TypeInfo)>,
    rows: Vec<DraftRow>,
    pending_line: Option<u32>,
    pending_labels: Vec<String>,
    current_line: Option<u32>,
}

impl FunctionBuilder
{
    fn new(name: &str, decl_line: u32, debug_info: bool, prologue: bool) -> Self
    {
        Self {
            name: name.to_string(),
            decl_line,
            debug_info,
            prologue,
            args: Vec::new(),
            locals: Vec::new(),
            rows: Vec::new(),
            pending_line: None,
            pending_labels: Vec::new(),
            current_line: None,
        }
    }

    /// Declare an `int` argument.
    pub fn arg(&mut self, name: &str) -> &mut Self
    {
        self.arg_typed(name, TypeInfo::int())
    }

    pub fn arg_typed(&mut self, name: &str, ty: TypeInfo) -> &mut Self
    {
        self.args.push((name.to_string(), ty));
        self
    }

    /// Declare an `int` local.
    pub fn local(&mut self, name: &str) -> &mut Self
    {
        self.local_typed(name, TypeInfo::int())
    }

    pub fn local_typed(&mut self, name: &str, ty: TypeInfo) -> &mut Self
    {
        self.locals.push((name.to_string(), ty));
        self
    }

    /// Start a line-table row for `line` at the next instruction.
    pub fn line(&mut self, line: u32) -> &mut Self
    {
        self.pending_line = Some(line);
        self
    }

    /// Name the next instruction as a jump target.
    pub fn label(&mut self, label: &str) -> &mut Self
    {
        self.pending_labels.push(label.to_string());
        self
    }

    fn push(&mut self, draft: Draft) -> &mut Self
    {
        let starts_row = self.pending_line.is_some();
        if let Some(line) = self.pending_line.take() {
            self.current_line = Some(line);
        }
        self.rows.push(DraftRow {
            draft,
            line: self.current_line,
            starts_row,
            labels: std::mem::take(&mut self.pending_labels),
        });
        self
    }

    pub fn nop(&mut self) -> &mut Self
    {
        self.push(Draft::Nop)
    }

    /// `var = value`.
    pub fn set(&mut self, var: &str, value: i64) -> &mut Self
    {
        self.push(Draft::Set {
            var: var.to_string(),
            value,
        })
    }

    /// `var = function`, for function-typed variables.
    pub fn store_func(&mut self, var: &str, function: &str) -> &mut Self
    {
        self.push(Draft::StoreFunc {
            var: var.to_string(),
            function: function.to_string(),
        })
    }

    /// `var += delta`.
    pub fn add(&mut self, var: &str, delta: i64) -> &mut Self
    {
        self.push(Draft::Add {
            var: var.to_string(),
            delta,
        })
    }

    /// Jump to `label` when `var <cmp> value`.
    pub fn jump_if(&mut self, var: &str, cmp: Cmp, value: i64, label: &str) -> &mut Self
    {
        self.push(Draft::JumpIf {
            var: var.to_string(),
            cmp,
            value,
            label: label.to_string(),
        })
    }

    pub fn jump(&mut self, label: &str) -> &mut Self
    {
        self.push(Draft::Jump {
            label: label.to_string(),
        })
    }

    pub fn call(&mut self, function: &str) -> &mut Self
    {
        self.call_with(function, Vec::new())
    }

    /// Call with arguments copied into the callee's argument slots.
    pub fn call_with(&mut self, function: &str, args: Vec<Operand>) -> &mut Self
    {
        self.push(Draft::Call {
            function: function.to_string(),
            args,
        })
    }

    /// Start `function` as a new task.
    pub fn spawn(&mut self, function: &str) -> &mut Self
    {
        self.spawn_with(function, Vec::new())
    }

    pub fn spawn_with(&mut self, function: &str, args: Vec<Operand>) -> &mut Self
    {
        self.push(Draft::Spawn {
            function: function.to_string(),
            args,
        })
    }

    pub fn ret(&mut self) -> &mut Self
    {
        self.push(Draft::Ret)
    }

    /// Let the scheduler run the next runnable task.
    pub fn yield_now(&mut self) -> &mut Self
    {
        self.push(Draft::Yield)
    }

    /// Trap instruction compiled into the program.
    pub fn trap(&mut self) -> &mut Self
    {
        self.push(Draft::Trap)
    }

    /// Terminate the process with `code`.
    pub fn exit(&mut self, code: i32) -> &mut Self
    {
        self.push(Draft::Exit(code))
    }

    /// Raise a non-fatal signal.
    pub fn fault(&mut self, signal: i32) -> &mut Self
    {
        self.push(Draft::Fault(signal))
    }

    /// Die from `signal`.
    pub fn abort(&mut self, signal: i32) -> &mut Self
    {
        self.push(Draft::Abort(signal))
    }

    fn frame_size(&self) -> u64
    {
        let outgoing = self.rows.iter().map(|row| row.draft.max_args()).max().unwrap_or(0);
        8 * (self.locals.len() + outgoing) as u64
    }

    fn all_rows(&self) -> Vec<DraftRow>
    {
        let mut rows = Vec::with_capacity(self.rows.len() + 2);
        if self.prologue {
            for draft in [Draft::StackCheck, Draft::Enter] {
                rows.push(DraftRow {
                    draft,
                    line: Some(self.decl_line),
                    starts_row: false,
                    labels: Vec::new(),
                });
            }
        }
        rows.extend(self.rows.iter().cloned());
        rows
    }
}

/// Assembles a [`ProgramImage`].
///
/// ## Example
///
/// ```rust
/// use strider_core::sim::{Cmp, ProgramBuilder};
///
/// let image = ProgramBuilder::new()
///     .file("/work/loop/main.go")
///     .function("main.main", 3, |f| {
///         f.local("i");
///         f.line(4).set("i", 0);
///         f.line(5).label("loop").add("i", 1);
///         f.line(6).jump_if("i", Cmp::Lt, 3, "loop");
///         f.line(7).ret();
///     })
///     .build();
/// assert_eq!(image.entry_function().name, "runtime.rt0");
/// ```
#[derive(Debug, Clone)]
pub struct ProgramBuilder
{
    file: String,
    functions: Vec<(Option<String>, FunctionBuilder)>,
    globals: Vec<(String, TypeInfo, i64)>,
    types: Vec<String>,
    threads: usize,
}

impl Default for ProgramBuilder
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl ProgramBuilder
{
    pub fn new() -> Self
    {
        Self {
            file: DEFAULT_FILE.to_string(),
            functions: Vec::new(),
            globals: Vec::new(),
            types: Vec::new(),
            threads: 1,
        }
    }

    /// Source file for the functions declared after this call.
    #[must_use]
    pub fn file(mut self, path: &str) -> Self
    {
        self.file = path.to_string();
        self
    }

    /// Function with debug information, declared at `decl_line`.
    #[must_use]
    pub fn function<F>(mut self, name: &str, decl_line: u32, body: F) -> Self
    where
        F: FnOnce(&mut FunctionBuilder),
    {
        let mut function = FunctionBuilder::new(name, decl_line, true, true);
        body(&mut function);
        self.functions.push((Some(self.file.clone()), function));
        self
    }

    /// Function without debug information (no line table, no variables).
    #[must_use]
    pub fn extern_function<F>(mut self, name: &str, body: F) -> Self
    where
        F: FnOnce(&mut FunctionBuilder),
    {
        let mut function = FunctionBuilder::new(name, 0, false, true);
        body(&mut function);
        self.functions.push((None, function));
        self
    }

    /// Package-level variable with an initial value.
    #[must_use]
    pub fn global(mut self, name: &str, ty: TypeInfo, initial: i64) -> Self
    {
        self.globals.push((name.to_string(), ty, initial));
        self
    }

    /// Extra type name for the type listing.
    #[must_use]
    pub fn type_name(mut self, name: &str) -> Self
    {
        self.types.push(name.to_string());
        self
    }

    /// OS threads in the process; all but the first stay parked.
    #[must_use]
    pub fn threads(mut self, count: usize) -> Self
    {
        self.threads = count.max(1);
        self
    }

    /// Assemble the image.
    ///
    /// ## Panics
    ///
    /// If an instruction names an unknown variable, label or function; see
    /// [`try_build`](Self::try_build) for the fallible form.
    pub fn build(self) -> ProgramImage
    {
        self.try_build().unwrap_or_else(|err| panic!("invalid simulated program: {err}"))
    }

    /// Assemble the image.
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if an instruction names an unknown variable, label
    /// or function, or a function is declared twice.
    pub fn try_build(self) -> Result<ProgramImage>
    {
        let has_main = self.functions.iter().any(|(_, f)| f.name == "main.main");
        let mut rt0 = FunctionBuilder::new(RUNTIME_ENTRY, 0, false, false);
        if has_main {
            rt0.call("main.main");
        }
        rt0.exit(0);
        let mut goexit = FunctionBuilder::new(RUNTIME_GOEXIT, 0, false, false);
        goexit.nop().push(Draft::TaskExit);

        let mut all: Vec<(Option<String>, FunctionBuilder)> = vec![(None, rt0), (None, goexit)];
        all.extend(self.functions);

        // Layout: addresses depend only on instruction sizes.
        let mut entries: HashMap<String, Address> = HashMap::new();
        let mut layouts = Vec::with_capacity(all.len());
        let mut cursor = CODE_BASE;
        for (_, function) in &all {
            if entries.contains_key(&function.name) {
                return Err(StriderError::InvalidArgument(format!("function {} declared twice", function.name)));
            }
            let entry = cursor;
            let rows = function.all_rows();
            let mut addresses = Vec::with_capacity(rows.len());
            for row in &rows {
                addresses.push(Address::from(cursor));
                cursor += row.draft.size();
            }
            entries.insert(function.name.clone(), Address::from(entry));
            layouts.push((rows, addresses, Address::from(cursor)));
            cursor = (cursor + 15) & !15;
        }

        let mut globals = Vec::new();
        let mut global_slots = HashMap::new();
        let mut global_data = Vec::new();
        for (index, (name, ty, initial)) in self.globals.iter().enumerate() {
            let address = Address::from(GLOBALS_BASE + 8 * index as u64);
            global_slots.insert(
                name.clone(),
                Slot {
                    location: VarLocation::Absolute(address),
                    size: ty.size,
                },
            );
            global_data.extend_from_slice(&initial.to_le_bytes());
            globals.push(VariableInfo {
                name: name.clone(),
                kind: VariableKind::Global,
                ty: ty.clone(),
                location: VarLocation::Absolute(address),
            });
        }

        let mut functions = Vec::with_capacity(all.len());
        let mut variables = HashMap::new();
        let mut instructions = BTreeMap::new();
        let mut code = Vec::new();
        let mut files: Vec<String> = Vec::new();
        let mut types: Vec<String> = self.types.clone();
        types.extend(self.globals.iter().map(|(_, ty, _)| ty.name.clone()));

        for ((file, builder), (rows, addresses, end)) in all.iter().zip(layouts) {
            let entry = entries[&builder.name];
            let assembler = Assembler::new(builder, &rows, &addresses, &global_slots, &entries);
            let mut lines = Vec::new();
            let mut seen_body_row = false;

            for (index, (row, address)) in rows.iter().zip(&addresses).enumerate() {
                let resolved = assembler.resolve(&row.draft)?;
                let offset = (address.value() - CODE_BASE) as usize;
                if code.len() < offset {
                    code.resize(offset, 0);
                }
                code.extend_from_slice(&resolved.bytes);

                if builder.debug_info {
                    if let Some(line) = row.line {
                        let in_prologue = builder.prologue && index < 2;
                        let new_row = index == 0 || row.starts_row || lines.last().is_some_and(|l: &LineEntry| l.line != line);
                        if new_row && !(in_prologue && index == 1) {
                            let prologue_end = !in_prologue && !seen_body_row;
                            seen_body_row |= !in_prologue;
                            lines.push(LineEntry {
                                address: *address,
                                file: file.clone().unwrap_or_default(),
                                line,
                                is_stmt: true,
                                prologue_end,
                            });
                        }
                    }
                }
                instructions.insert(*address, resolved);
            }

            let frame_setup = if builder.prologue {
                entry + PROLOGUE_SIZE
            } else {
                entry
            };
            let mut function = Function::new(builder.name.clone(), entry, end);
            function.frame_setup = Some(frame_setup);
            if builder.debug_info {
                function.file.clone_from(file);
                function.decl_line = builder.decl_line;
                function.lines = lines;
                if let Some(file) = file {
                    if !files.contains(file) {
                        files.push(file.clone());
                    }
                }
                variables.insert(entry, assembler.variable_infos());
                types.extend(builder.args.iter().chain(&builder.locals).map(|(_, ty)| ty.name.clone()));
            }
            functions.push(Arc::new(function));
        }

        files.sort();
        types.sort();
        types.dedup();

        let entry = entries[RUNTIME_ENTRY];
        let task_return = entries[RUNTIME_GOEXIT] + 1;
        Ok(ProgramImage {
            functions,
            files,
            globals,
            global_data,
            types,
            variables,
            instructions,
            code,
            entry,
            task_return,
            threads: self.threads,
        })
    }
}

struct Assembler<'a>
{
    builder: &'a FunctionBuilder,
    slots: HashMap<&'a str, Slot>,
    labels: HashMap<&'a str, Address>,
    globals: &'a HashMap<String, Slot>,
    entries: &'a HashMap<String, Address>,
}

struct Resolved
{
    op: Op,
    text: String,
    payload: u64,
    call_target: Option<Address>,
}

impl<'a> Assembler<'a>
{
    fn new(
        builder: &'a FunctionBuilder,
        rows: &'a [DraftRow],
        addresses: &[Address],
        globals: &'a HashMap<String, Slot>,
        entries: &'a HashMap<String, Address>,
    ) -> Self
    {
        let mut slots = HashMap::new();
        for (index, (name, ty)) in builder.args.iter().enumerate() {
            slots.insert(
                name.as_str(),
                Slot {
                    location: VarLocation::Cfa(8 * index as i64),
                    size: ty.size,
                },
            );
        }
        for (index, (name, ty)) in builder.locals.iter().enumerate() {
            slots.insert(
                name.as_str(),
                Slot {
                    location: VarLocation::Cfa(-24 - 8 * index as i64),
                    size: ty.size,
                },
            );
        }
        let mut labels = HashMap::new();
        for (row, address) in rows.iter().zip(addresses) {
            for label in &row.labels {
                labels.insert(label.as_str(), *address);
            }
        }
        Self {
            builder,
            slots,
            labels,
            globals,
            entries,
        }
    }

    fn variable_infos(&self) -> Vec<VariableInfo>
    {
        let args = self.builder.args.iter().map(|(name, ty)| (name, ty, VariableKind::Argument));
        let locals = self.builder.locals.iter().map(|(name, ty)| (name, ty, VariableKind::Local));
        args.chain(locals)
            .filter_map(|(name, ty, kind)| {
                self.slots.get(name.as_str()).map(|slot| VariableInfo {
                    name: name.clone(),
                    kind,
                    ty: ty.clone(),
                    location: slot.location,
                })
            })
            .collect()
    }

    fn unknown(&self, what: &str, name: &str) -> StriderError
    {
        StriderError::InvalidArgument(format!("{}: unknown {what} {name}", self.builder.name))
    }

    fn slot(&self, var: &str) -> Result<Slot>
    {
        self.slots
            .get(var)
            .or_else(|| self.globals.get(var))
            .copied()
            .ok_or_else(|| self.unknown("variable", var))
    }

    fn label(&self, label: &str) -> Result<Address>
    {
        self.labels.get(label).copied().ok_or_else(|| self.unknown("label", label))
    }

    fn function(&self, name: &str) -> Result<Address>
    {
        self.entries.get(name).copied().ok_or_else(|| self.unknown("function", name))
    }

    fn args(&self, operands: &[Operand]) -> Result<Vec<Arg>>
    {
        operands
            .iter()
            .map(|operand| match operand {
                Operand::Imm(value) => Ok(Arg::Imm(*value)),
                Operand::Var(name) => self.slot(name).map(Arg::Slot),
            })
            .collect()
    }

    fn resolve(&self, draft: &Draft) -> Result<Instruction>
    {
        let resolved = match draft {
            Draft::StackCheck => Resolved::plain(Op::StackCheck, "STACKCHECK"),
            Draft::Enter => {
                let frame_size = self.builder.frame_size();
                Resolved {
                    op: Op::Enter { frame_size },
                    text: format!("ENTER ${frame_size:#x}"),
                    payload: frame_size,
                    call_target: None,
                }
            }
            Draft::Nop => Resolved::plain(Op::Nop, "NOP"),
            Draft::Set { var, value } => Resolved {
                op: Op::Set {
                    slot: self.slot(var)?,
                    value: *value,
                },
                text: format!("MOV ${value}, {var}"),
                payload: *value as u64,
                call_target: None,
            },
            Draft::StoreFunc { var, function } => {
                let entry = self.function(function)?;
                Resolved {
                    op: Op::StoreFunc {
                        slot: self.slot(var)?,
                        entry,
                    },
                    text: format!("LEA {function}, {var}"),
                    payload: entry.value(),
                    call_target: None,
                }
            }
            Draft::Add { var, delta } => Resolved {
                op: Op::Add {
                    slot: self.slot(var)?,
                    delta: *delta,
                },
                text: format!("ADD ${delta}, {var}"),
                payload: *delta as u64,
                call_target: None,
            },
            Draft::JumpIf { var, cmp, value, label } => {
                let target = self.label(label)?;
                Resolved {
                    op: Op::JumpIf {
                        slot: self.slot(var)?,
                        cmp: *cmp,
                        value: *value,
                        target,
                    },
                    text: format!("{} {var}, ${value}, {target}", cmp.mnemonic()),
                    payload: target.value(),
                    call_target: None,
                }
            }
            Draft::Jump { label } => {
                let target = self.label(label)?;
                Resolved {
                    op: Op::Jump { target },
                    text: format!("JMP {target}"),
                    payload: target.value(),
                    call_target: None,
                }
            }
            Draft::Call { function, args } => {
                let target = self.function(function)?;
                Resolved {
                    op: Op::Call {
                        target,
                        args: self.args(args)?,
                    },
                    text: format!("CALL {function}"),
                    payload: target.value(),
                    call_target: Some(target),
                }
            }
            Draft::Spawn { function, args } => {
                let target = self.function(function)?;
                Resolved {
                    op: Op::Spawn {
                        target,
                        args: self.args(args)?,
                    },
                    text: format!("GO {function}"),
                    payload: target.value(),
                    call_target: None,
                }
            }
            Draft::Ret => Resolved::plain(Op::Ret, "RET"),
            Draft::Yield => Resolved::plain(Op::Yield, "YIELD"),
            Draft::TaskExit => Resolved::plain(Op::TaskExit, "GOEXIT"),
            Draft::Trap => Resolved::plain(Op::Trap, "INT3"),
            Draft::Exit(code) => Resolved {
                op: Op::Exit { code: *code },
                text: format!("EXIT ${code}"),
                payload: u64::from(code.unsigned_abs()),
                call_target: None,
            },
            Draft::Fault(signal) => Resolved {
                op: Op::Fault { signal: *signal },
                text: format!("FAULT ${signal}"),
                payload: u64::from(signal.unsigned_abs()),
                call_target: None,
            },
            Draft::Abort(signal) => Resolved {
                op: Op::Abort { signal: *signal },
                text: format!("ABORT ${signal}"),
                payload: u64::from(signal.unsigned_abs()),
                call_target: None,
            },
        };

        let size = draft.size() as usize;
        let mut bytes = InstructionBytes::new();
        bytes.push(draft.opcode());
        bytes.extend(resolved.payload.to_le_bytes().into_iter().chain(std::iter::repeat(0)).take(size - 1));
        Ok(Instruction {
            op: resolved.op,
            bytes,
            text: resolved.text,
            call_target: resolved.call_target,
        })
    }
}

impl Resolved
{
    fn plain(op: Op, text: &str) -> Self
    {
        Self {
            op,
            text: text.to_string(),
            payload: 0,
            call_target: None,
        }
    }
}

/// An assembled program.
#[derive(Debug)]
pub struct ProgramImage
{
    functions: Vec<Arc<Function>>,
    files: Vec<String>,
    globals: Vec<VariableInfo>,
    global_data: Vec<u8>,
    types: Vec<String>,
    variables: HashMap<Address, Vec<VariableInfo>>,
    instructions: BTreeMap<Address, Instruction>,
    code: Vec<u8>,
    entry: Address,
    task_return: Address,
    threads: usize,
}

impl ProgramImage
{
    /// `runtime.rt0`, where execution starts.
    ///
    /// ## Panics
    ///
    /// Never for an image produced by [`ProgramBuilder`].
    pub fn entry_function(&self) -> &Arc<Function>
    {
        &self.functions[0]
    }

    pub(crate) fn entry(&self) -> Address
    {
        self.entry
    }

    pub(crate) fn task_return(&self) -> Address
    {
        self.task_return
    }

    pub(crate) fn threads(&self) -> usize
    {
        self.threads
    }

    pub(crate) fn code(&self) -> &[u8]
    {
        &self.code
    }

    pub(crate) fn global_data(&self) -> &[u8]
    {
        &self.global_data
    }

    pub(crate) fn instruction(&self, pc: Address) -> Option<&Instruction>
    {
        self.instructions.get(&pc)
    }
}

impl SymbolService for ProgramImage
{
    fn functions(&self) -> &[Arc<Function>]
    {
        &self.functions
    }

    fn files(&self) -> &[String]
    {
        &self.files
    }

    fn variables(&self, function: &Function, _pc: Address) -> Vec<VariableInfo>
    {
        self.variables.get(&function.entry).cloned().unwrap_or_default()
    }

    fn globals(&self) -> &[VariableInfo]
    {
        &self.globals
    }

    fn types(&self) -> &[String]
    {
        &self.types
    }
}

impl Disassembler for ProgramImage
{
    fn decode(&self, pc: Address) -> Result<DecodedInstruction>
    {
        if let Some(instruction) = self.instruction(pc) {
            return Ok(DecodedInstruction {
                address: pc,
                bytes: instruction.bytes.clone(),
                text: instruction.text.clone(),
                call_target: instruction.call_target,
            });
        }
        if self.functions.iter().any(|f| f.contains(pc)) {
            Err(StriderError::InvalidArgument(format!("{pc} is not on an instruction boundary")))
        } else {
            Err(StriderError::NotFound(format!("no code at {pc}")))
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn image() -> ProgramImage
    {
        ProgramBuilder::new()
            .global("main.counter", TypeInfo::int(), 7)
            .function("main.main", 10, |f| {
                f.local("x");
                f.line(11).set("x", 1);
                f.line(12).call_with("main.helper", vec![Operand::from("x")]);
                f.line(13).ret();
            })
            .function("main.helper", 20, |f| {
                f.arg("n");
                f.line(21).add("main.counter", 1);
                f.line(22).ret();
            })
            .extern_function("C.write", |f| {
                f.nop().ret();
            })
            .build()
    }

    #[test]
    fn test_prologue_and_line_rows()
    {
        let image = image();
        let main = image.function_by_name("main.main").unwrap();
        assert_eq!(main.frame_setup, Some(main.entry + PROLOGUE_SIZE));
        assert_eq!(main.lines[0].line, 10);
        assert_eq!(main.lines[0].address, main.entry);
        assert!(main.lines[1].prologue_end);
        assert_eq!(main.lines[1].line, 11);
        assert_eq!(main.prologue_end(), main.entry + PROLOGUE_SIZE);
    }

    #[test]
    fn test_variable_slots()
    {
        let image = image();
        let helper = image.function_by_name("main.helper").unwrap();
        let vars = image.variables(&helper, helper.entry);
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].location, VarLocation::Cfa(0));

        let main = image.function_by_name("main.main").unwrap();
        assert_eq!(image.variables(&main, main.entry)[0].location, VarLocation::Cfa(-24));
    }

    #[test]
    fn test_extern_function_has_no_lines()
    {
        let image = image();
        let write = image.function_by_name("C.write").unwrap();
        assert!(!write.has_debug_info());
        assert!(write.frame_setup.is_some());
        assert_eq!(image.files(), ["main.go".to_string()]);
    }

    #[test]
    fn test_decode_call_target()
    {
        let image = image();
        let main = image.function_by_name("main.main").unwrap();
        let helper = image.function_by_name("main.helper").unwrap();
        let call = main.lines.iter().find(|row| row.line == 12).unwrap().address;
        let decoded = image.decode(call).unwrap();
        assert_eq!(decoded.call_target, Some(helper.entry));
        assert_eq!(decoded.len(), 5);
        assert!(image.decode(call + 1).is_err());
    }

    #[test]
    fn test_unknown_variable_is_rejected()
    {
        let result = ProgramBuilder::new()
            .function("main.main", 1, |f| {
                f.line(2).set("missing", 1);
            })
            .try_build();
        assert!(result.is_err());
    }
}
