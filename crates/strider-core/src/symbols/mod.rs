//! # Symbols
//!
//! The query interface the core uses for everything it knows about the
//! program image: functions, line tables, source files, variables and types.
//!
//! Object-file parsing is not done here. A [`SymbolService`] is produced by
//! whatever loaded the image (DWARF reader, PDB reader, the in-memory
//! simulator) and is wrapped in a [`SymbolCache`] that adds the indexes the
//! location resolver and stepping engine need.

pub mod cache;

use std::sync::Arc;

pub use cache::SymbolCache;

use crate::types::{Address, Function, Location, VariableInfo};

/// Read-only symbol queries for one program image
///
/// Only [`functions`](SymbolService::functions),
/// [`files`](SymbolService::files) and
/// [`variables`](SymbolService::variables) are required; the lookups have
/// linear default implementations that [`SymbolCache`] replaces with
/// indexed ones.
pub trait SymbolService: Send + Sync
{
    /// Every function in the image.
    fn functions(&self) -> &[Arc<Function>];

    /// Every source file named by a line table.
    fn files(&self) -> &[String];

    /// Arguments and locals visible in `function` at `pc`.
    fn variables(&self, function: &Function, pc: Address) -> Vec<VariableInfo>;

    /// Package-level variables.
    fn globals(&self) -> &[VariableInfo]
    {
        &[]
    }

    /// Names of all types known to the image.
    fn types(&self) -> &[String]
    {
        &[]
    }

    /// Function containing `pc`.
    fn function_at(&self, pc: Address) -> Option<Arc<Function>>
    {
        self.functions().iter().find(|f| f.contains(pc)).cloned()
    }

    /// Function with exactly this fully qualified name.
    fn function_by_name(&self, name: &str) -> Option<Arc<Function>>
    {
        self.functions().iter().find(|f| f.name == name).cloned()
    }

    /// Source position of `pc`; only the address is filled in when no
    /// function covers it.
    fn location_at(&self, pc: Address) -> Location
    {
        match self.function_at(pc) {
            Some(function) => location_in(function, pc),
            None => Location::from_pc(pc),
        }
    }
}

/// Location of `pc` inside a known function.
pub(crate) fn location_in(function: Arc<Function>, pc: Address) -> Location
{
    let (file, line) = function
        .line_for(pc)
        .map_or((function.file.clone(), 0), |row| (Some(row.file.clone()), row.line));
    Location {
        pc,
        file,
        line,
        function: Some(function),
        case_folded: false,
    }
}
