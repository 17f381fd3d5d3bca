//! CPU register types and access.

use std::fmt;

use super::{Address, Architecture};

/// Identifier for a specific CPU register
///
/// The common registers (PC, SP, FP, Status) exist on every architecture.
/// Everything else is addressed by its index into [`Registers::general`].
///
/// ## Example
///
/// ```rust
/// use strider_core::types::{Address, RegisterId, Registers};
///
/// let mut regs = Registers::new();
/// regs.set(RegisterId::Pc, 0x401000);
/// assert_eq!(regs.pc, Address::from(0x401000));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterId
{
    /// Program Counter (RIP on x86-64, PC on ARM64)
    Pc,
    /// Stack Pointer (RSP on x86-64, SP on ARM64)
    Sp,
    /// Frame Pointer (RBP on x86-64, X29 on ARM64)
    Fp,
    /// Status/Flags register (RFLAGS on x86-64, CPSR on ARM64)
    Status,
    /// General-purpose register by index
    General(u8),
}

/// Platform-agnostic register set of one thread
///
/// ## Register Fields
///
/// - `pc`: address of the next instruction
/// - `sp`: top of stack
/// - `fp`: base of the current frame
/// - `general`: general-purpose registers in architecture order
/// - `status`: flags register
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers
{
    /// Program Counter (PC) - address of the next instruction to execute
    pub pc: Address,
    /// Stack Pointer (SP) - address of the top of the stack
    pub sp: Address,
    /// Frame Pointer (FP) - address of the current stack frame
    pub fp: Address,
    /// General-purpose registers (architecture-specific order)
    pub general: Vec<u64>,
    /// Status/Flags register
    pub status: u64,
    architecture: Architecture,
}

impl Registers
{
    /// Create an all-zero register set for an unknown architecture.
    pub fn new() -> Self
    {
        Self {
            pc: Address::ZERO,
            sp: Address::ZERO,
            fp: Address::ZERO,
            general: Vec::new(),
            status: 0,
            architecture: Architecture::Unknown("unknown"),
        }
    }

    /// Set the CPU architecture for this register set
    ///
    /// ```rust
    /// use strider_core::types::{Architecture, Registers};
    ///
    /// let regs = Registers::new().with_arch(Architecture::X86_64);
    /// assert_eq!(regs.architecture(), Architecture::X86_64);
    /// ```
    #[must_use]
    pub fn with_arch(mut self, architecture: Architecture) -> Self
    {
        self.architecture = architecture;
        self
    }

    /// CPU architecture this register set belongs to.
    pub fn architecture(&self) -> Architecture
    {
        self.architecture
    }

    /// Get the value of a register, or `None` for an out-of-range general index.
    pub fn get(&self, id: RegisterId) -> Option<u64>
    {
        match id {
            RegisterId::Pc => Some(self.pc.value()),
            RegisterId::Sp => Some(self.sp.value()),
            RegisterId::Fp => Some(self.fp.value()),
            RegisterId::Status => Some(self.status),
            RegisterId::General(idx) => self.general.get(usize::from(idx)).copied(),
        }
    }

    /// Set the value of a register
    ///
    /// Returns `None` (and leaves the set untouched) for an out-of-range general
    /// register index.
    pub fn set(&mut self, id: RegisterId, value: u64) -> Option<()>
    {
        match id {
            RegisterId::Pc => self.pc = Address::from(value),
            RegisterId::Sp => self.sp = Address::from(value),
            RegisterId::Fp => self.fp = Address::from(value),
            RegisterId::Status => self.status = value,
            RegisterId::General(idx) => {
                let slot = self.general.get_mut(usize::from(idx))?;
                *slot = value;
            }
        }
        Some(())
    }

    /// Link register value, on architectures that have one.
    pub fn link_register(&self) -> Option<Address>
    {
        let idx = self.architecture.link_register()?;
        self.general.get(idx).copied().map(Address::from)
    }
}

impl Default for Registers
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl fmt::Display for Registers
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        writeln!(f, "pc     = {:#018x}", self.pc.value())?;
        writeln!(f, "sp     = {:#018x}", self.sp.value())?;
        writeln!(f, "fp     = {:#018x}", self.fp.value())?;
        write!(f, "status = {:#018x}", self.status)?;
        for (idx, value) in self.general.iter().enumerate() {
            write!(f, "\nr{idx:<5} = {value:#018x}")?;
        }
        Ok(())
    }
}
