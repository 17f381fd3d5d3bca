//! # Symbol Cache
//!
//! Indexes over a [`SymbolService`] built on first use.
//!
//! The cache is shared (`Arc<SymbolCache>`) between the session and any query
//! threads. Indexes are immutable once built (`OnceCell`); the only mutable
//! state is a memo of prologue ends behind an `RwLock` that is held for a
//! single map access and never across a target wait.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use strider_core::sim::ProgramBuilder;
//! use strider_core::symbols::SymbolCache;
//!
//! let image = Arc::new(
//!     ProgramBuilder::new()
//!         .function("main.main", 10, |f| {
//!             f.line(11).nop();
//!             f.line(12).ret();
//!         })
//!         .build(),
//! );
//! let cache = SymbolCache::new(image);
//! let main = cache.function_by_name("main.main").unwrap();
//! assert_eq!(cache.location_at(cache.prologue_end(&main)).line, 11);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::OnceCell;
use tracing::trace;

use super::{location_in, SymbolService};
use crate::types::{Address, Function, Location, VariableInfo};

/// Cached lookups over a [`SymbolService`].
pub struct SymbolCache
{
    service: Arc<dyn SymbolService>,
    by_address: OnceCell<Vec<Arc<Function>>>,
    by_name: OnceCell<HashMap<String, Arc<Function>>>,
    by_base_name: OnceCell<HashMap<String, Vec<Arc<Function>>>>,
    statements: OnceCell<HashMap<(String, u32), Vec<Address>>>,
    prologues: RwLock<HashMap<Address, Address>>,
}

impl std::fmt::Debug for SymbolCache
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("SymbolCache")
            .field("functions", &self.service.functions().len())
            .field("files", &self.service.files().len())
            .finish_non_exhaustive()
    }
}

impl SymbolCache
{
    /// Wrap a symbol service. Nothing is indexed until first use.
    pub fn new(service: Arc<dyn SymbolService>) -> Self
    {
        Self {
            service,
            by_address: OnceCell::new(),
            by_name: OnceCell::new(),
            by_base_name: OnceCell::new(),
            statements: OnceCell::new(),
            prologues: RwLock::new(HashMap::new()),
        }
    }

    /// The wrapped service.
    pub fn service(&self) -> &Arc<dyn SymbolService>
    {
        &self.service
    }

    fn sorted_functions(&self) -> &[Arc<Function>]
    {
        self.by_address.get_or_init(|| {
            let mut functions = self.service.functions().to_vec();
            functions.sort_by_key(|f| f.entry);
            trace!(count = functions.len(), "indexed functions by address");
            functions
        })
    }

    /// All functions, ordered by entry address.
    pub fn functions(&self) -> &[Arc<Function>]
    {
        self.sorted_functions()
    }

    /// All source files known to the image.
    pub fn files(&self) -> &[String]
    {
        self.service.files()
    }

    /// Package-level variables.
    pub fn globals(&self) -> &[VariableInfo]
    {
        self.service.globals()
    }

    /// Type names.
    pub fn types(&self) -> &[String]
    {
        self.service.types()
    }

    /// Function containing `pc`, by binary search over entry addresses.
    pub fn function_at(&self, pc: Address) -> Option<Arc<Function>>
    {
        let functions = self.sorted_functions();
        let idx = functions.partition_point(|f| f.entry <= pc);
        let candidate = functions.get(idx.checked_sub(1)?)?;
        candidate.contains(pc).then(|| candidate.clone())
    }

    /// Function with exactly this fully qualified name.
    pub fn function_by_name(&self, name: &str) -> Option<Arc<Function>>
    {
        self.by_name
            .get_or_init(|| {
                self.service
                    .functions()
                    .iter()
                    .map(|f| (f.name.clone(), f.clone()))
                    .collect()
            })
            .get(name)
            .cloned()
    }

    /// Functions whose unqualified name is `base`.
    pub fn functions_by_base_name(&self, base: &str) -> &[Arc<Function>]
    {
        let index = self.by_base_name.get_or_init(|| {
            let mut index: HashMap<String, Vec<Arc<Function>>> = HashMap::new();
            for function in self.sorted_functions() {
                index
                    .entry(function.base_name().to_string())
                    .or_default()
                    .push(function.clone());
            }
            index
        });
        index.get(base).map_or(&[], Vec::as_slice)
    }

    /// Statement addresses for `file:line`, ascending.
    pub fn line_to_pcs(&self, file: &str, line: u32) -> &[Address]
    {
        let index = self.statements.get_or_init(|| {
            let mut index: HashMap<(String, u32), Vec<Address>> = HashMap::new();
            for function in self.sorted_functions() {
                for row in function.lines.iter().filter(|row| row.is_stmt) {
                    index.entry((row.file.clone(), row.line)).or_default().push(row.address);
                }
            }
            for pcs in index.values_mut() {
                pcs.sort_unstable();
                pcs.dedup();
            }
            index
        });
        index.get(&(file.to_string(), line)).map_or(&[], Vec::as_slice)
    }

    /// First address after the prologue of `function`, memoized by entry.
    pub fn prologue_end(&self, function: &Function) -> Address
    {
        if let Some(end) = self
            .prologues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&function.entry)
        {
            return *end;
        }
        let end = function.prologue_end();
        self.prologues
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(function.entry, end);
        end
    }

    /// Source position of `pc`.
    pub fn location_at(&self, pc: Address) -> Location
    {
        match self.function_at(pc) {
            Some(function) => location_in(function, pc),
            None => Location::from_pc(pc),
        }
    }

    /// Arguments and locals of `function` at `pc`.
    pub fn variables(&self, function: &Function, pc: Address) -> Vec<VariableInfo>
    {
        self.service.variables(function, pc)
    }
}
