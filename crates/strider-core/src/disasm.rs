//! Disassembly listing.
//!
//! Instruction decoding is delegated to a [`Disassembler`]; this module walks
//! an address range with it and decorates each instruction with its source
//! location, call destination, breakpoint and current-PC markers.

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{Result, StriderError};
use crate::symbols::SymbolCache;
use crate::types::{Address, Location};

/// Raw instruction bytes; x86-64 instructions never exceed 15.
pub type InstructionBytes = SmallVec<[u8; 16]>;

/// One decoded instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction
{
    /// Address of the first byte.
    pub address: Address,
    /// Encoded bytes.
    pub bytes: InstructionBytes,
    /// Mnemonic and operands.
    pub text: String,
    /// Destination of a direct call, if this is one.
    pub call_target: Option<Address>,
}

impl DecodedInstruction
{
    /// Encoded length in bytes.
    pub fn len(&self) -> usize
    {
        self.bytes.len()
    }

    /// Whether the instruction has no bytes (never true for a valid decode).
    pub fn is_empty(&self) -> bool
    {
        self.bytes.is_empty()
    }
}

/// Decodes a single instruction
///
/// Implementations decode from the program image, not from live memory, so
/// installed traps never show up in the listing.
pub trait Disassembler: Send + Sync
{
    /// Decode the instruction starting at `pc`.
    ///
    /// ## Errors
    ///
    /// - `NotFound`: `pc` is not inside a code region
    /// - `InvalidArgument`: `pc` is not on an instruction boundary
    fn decode(&self, pc: Address) -> Result<DecodedInstruction>;
}

/// A listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmInstruction
{
    /// Where the instruction is.
    pub location: Location,
    /// Encoded bytes.
    pub bytes: InstructionBytes,
    /// Mnemonic and operands.
    pub text: String,
    /// Resolved destination of a direct call.
    pub destination: Option<Location>,
    /// A breakpoint is installed on this instruction.
    pub breakpoint: bool,
    /// The current thread is stopped on this instruction.
    pub at_pc: bool,
}

/// Decode every instruction in `[start, end)`.
pub(crate) fn disassemble<F>(
    symbols: &SymbolCache,
    disassembler: &dyn Disassembler,
    start: Address,
    end: Address,
    current_pc: Option<Address>,
    has_breakpoint: F,
) -> Result<Vec<AsmInstruction>>
where
    F: Fn(Address) -> bool,
{
    if end < start {
        return Err(StriderError::InvalidArgument(format!(
            "disassembly range end {end} is below start {start}"
        )));
    }

    let mut listing = Vec::new();
    let mut pc = start;
    while pc < end {
        let decoded = disassembler.decode(pc)?;
        if decoded.is_empty() {
            return Err(StriderError::Target(format!("decoder returned an empty instruction at {pc}")));
        }
        let next = pc + decoded.len() as u64;
        listing.push(AsmInstruction {
            location: symbols.location_at(pc),
            destination: decoded.call_target.map(|target| symbols.location_at(target)),
            breakpoint: has_breakpoint(pc),
            at_pc: current_pc == Some(pc),
            bytes: decoded.bytes,
            text: decoded.text,
        });
        pc = next;
    }
    debug!(%start, %end, count = listing.len(), "disassembled range");
    Ok(listing)
}
