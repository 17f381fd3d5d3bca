//! # Location Resolution
//!
//! Turns location expressions (`main.go:12`, `pkg.(*T).Method`, `+2`,
//! `*0x4010`, `/^main\./`) into code addresses using the [`SymbolCache`].
//!
//! See [`LocationSpec`] for the accepted syntax. Non-regex forms resolve to
//! exactly one [`Location`]; zero candidates is `NotFound` and several is
//! `Ambiguous`. Every resolution is a pure query: nothing is installed or
//! cached here.

pub mod spec;

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

pub use spec::{parse_int_literal, partial_path_match, strip_receiver_decoration, FuncSpec, LocationSpec};

use crate::error::{Result, StriderError};
use crate::symbols::SymbolCache;
use crate::types::{Address, Function, Location, Value, Variable};

/// At most this many candidates are listed in an `Ambiguous` error.
pub const MAX_CANDIDATES: usize = 5;

/// Evaluates an address expression in the current scope.
pub type AddressEvaluator<'a> = &'a dyn Fn(&str) -> Result<Variable>;

/// Scope-dependent inputs to resolution.
#[derive(Clone, Copy, Default)]
pub struct ResolveContext<'a>
{
    /// Where the selected frame is stopped; needed for `N`, `+N`, `-N`.
    pub current: Option<&'a Location>,
    /// Evaluator for `*expr` forms that are not literals.
    pub evaluate: Option<AddressEvaluator<'a>>,
}

impl std::fmt::Debug for ResolveContext<'_>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("ResolveContext")
            .field("current", &self.current)
            .field("evaluate", &self.evaluate.is_some())
            .finish()
    }
}

enum Candidate
{
    File
    {
        path: String,
        folded: bool,
    },
    Function(Arc<Function>),
}

impl Candidate
{
    fn describe(&self) -> String
    {
        match self {
            Candidate::File { path, .. } => path.clone(),
            Candidate::Function(function) => function.name.clone(),
        }
    }
}

/// Resolves location expressions against one program image.
#[derive(Debug, Clone, Copy)]
pub struct LocationResolver<'a>
{
    symbols: &'a SymbolCache,
    case_insensitive: bool,
}

impl<'a> LocationResolver<'a>
{
    pub fn new(symbols: &'a SymbolCache, case_insensitive: bool) -> Self
    {
        Self {
            symbols,
            case_insensitive,
        }
    }

    /// Resolve `expr` to its locations.
    ///
    /// Only the regex form can yield more than one location.
    ///
    /// ## Errors
    ///
    /// - `InvalidArgument`: malformed syntax, bad regex, file without a line
    /// - `NotFound`: nothing matches, or a relative form has no current location
    /// - `Ambiguous`: several files or functions match a non-regex form
    pub fn resolve(&self, expr: &str, ctx: &ResolveContext<'_>) -> Result<Vec<Location>>
    {
        let spec = LocationSpec::parse(expr)?;
        debug!(expr, ?spec, "resolving location");
        match &spec {
            LocationSpec::Regex(pattern) => self.resolve_regex(pattern),
            LocationSpec::AddressExpr(addr) => self.resolve_address_expr(addr, ctx).map(|l| vec![l]),
            LocationSpec::Line(line) => {
                let file = Self::current_file(expr, ctx)?;
                self.find_file_location(file, *line).map(|l| vec![l])
            }
            LocationSpec::Offset(offset) => {
                let current = ctx.current.filter(|l| l.has_source()).ok_or_else(|| no_current(expr))?;
                if *offset == 0 {
                    return Ok(vec![current.clone()]);
                }
                let line = i64::from(current.line) + offset;
                let line = u32::try_from(line)
                    .ok()
                    .filter(|l| *l > 0)
                    .ok_or_else(|| StriderError::NotFound(format!("line offset {offset} out of range")))?;
                let file = Self::current_file(expr, ctx)?;
                self.find_file_location(file, line).map(|l| vec![l])
            }
            LocationSpec::Normal { base, func, line } => {
                self.resolve_normal(expr, base, func.as_ref(), *line, ctx).map(|l| vec![l])
            }
        }
    }

    /// Resolve `expr`, requiring exactly one location.
    ///
    /// ## Errors
    ///
    /// As [`resolve`](Self::resolve), plus `Ambiguous` when a regex matches
    /// several functions.
    pub fn resolve_one(&self, expr: &str, ctx: &ResolveContext<'_>) -> Result<Location>
    {
        let mut locations = self.resolve(expr, ctx)?;
        match locations.len() {
            0 => Err(StriderError::NotFound(format!("location \"{expr}\" not found"))),
            1 => Ok(locations.remove(0)),
            _ => Err(StriderError::Ambiguous {
                location: expr.to_string(),
                candidates: locations
                    .iter()
                    .take(MAX_CANDIDATES)
                    .map(|l| l.function_name().map_or_else(|| l.pc.to_string(), str::to_string))
                    .collect(),
            }),
        }
    }

    fn current_file<'c>(expr: &str, ctx: &ResolveContext<'c>) -> Result<&'c str>
    {
        ctx.current
            .and_then(|l| l.file.as_deref())
            .ok_or_else(|| no_current(expr))
    }

    fn resolve_normal(
        &self,
        expr: &str,
        base: &str,
        func: Option<&FuncSpec>,
        line: Option<u32>,
        ctx: &ResolveContext<'_>,
    ) -> Result<Location>
    {
        let mut candidates = self.candidates(base, func);

        if candidates.is_empty() {
            if ctx.evaluate.is_some() {
                return self
                    .resolve_address_expr(base, ctx)
                    .map_err(|_| StriderError::NotFound(format!("location \"{expr}\" not found")));
            }
            return Err(StriderError::NotFound(format!("location \"{expr}\" not found")));
        }
        if candidates.len() > 1 {
            return Err(StriderError::Ambiguous {
                location: expr.to_string(),
                candidates: candidates.iter().take(MAX_CANDIDATES).map(Candidate::describe).collect(),
            });
        }

        match candidates.remove(0) {
            Candidate::File { path, folded } => {
                let line = line.ok_or_else(|| {
                    StriderError::InvalidArgument(format!(
                        "malformed breakpoint location \"{expr}\": no line offset specified"
                    ))
                })?;
                let mut location = self.find_file_location(&path, line)?;
                location.case_folded = folded;
                Ok(location)
            }
            Candidate::Function(function) => {
                let line = line.map_or(-1, i64::from);
                self.find_function_location(&function, line)
            }
        }
    }

    fn candidates(&self, base: &str, func: Option<&FuncSpec>) -> Vec<Candidate>
    {
        if let Some(function) = self.symbols.function_by_name(base) {
            return vec![Candidate::Function(function)];
        }

        let mut candidates: Vec<Candidate> = self
            .symbols
            .files()
            .iter()
            .filter_map(|path| {
                self.file_matches(base, path).map(|folded| Candidate::File {
                    path: path.clone(),
                    folded,
                })
            })
            .take(MAX_CANDIDATES)
            .collect();

        if let Some(func) = func {
            let limit = MAX_CANDIDATES.saturating_sub(candidates.len());
            candidates.extend(
                self.symbols
                    .functions_by_base_name(&func.base)
                    .iter()
                    .filter(|f| func.matches(f))
                    .take(limit)
                    .map(|f| Candidate::Function(f.clone())),
            );
        }
        candidates
    }

    /// `Some(folded)` when `expr` names `path`; `folded` is set when only a
    /// case-insensitive comparison matched.
    fn file_matches(&self, expr: &str, path: &str) -> Option<bool>
    {
        if partial_path_match(expr, path) {
            return Some(false);
        }
        if self.case_insensitive && partial_path_match(&expr.to_lowercase(), &path.to_lowercase()) {
            return Some(true);
        }
        None
    }

    /// Source position of `pc`.
    pub fn location_at(&self, pc: Address) -> Location
    {
        self.symbols.location_at(pc)
    }

    /// Function named `name`: an exact full name, else the single function
    /// the name matches as a function spec.
    ///
    /// ## Errors
    ///
    /// `NotFound` for no match, `Ambiguous` for several.
    pub fn function_named(&self, name: &str) -> Result<Arc<Function>>
    {
        if let Some(function) = self.symbols.function_by_name(name) {
            return Ok(function);
        }
        let spec = FuncSpec::parse(name).ok_or_else(|| StriderError::NotFound(format!("function {name}")))?;
        let mut matches: Vec<_> = self
            .symbols
            .functions_by_base_name(&spec.base)
            .iter()
            .filter(|f| spec.matches(f))
            .cloned()
            .collect();
        match matches.len() {
            0 => Err(StriderError::NotFound(format!("function {name}"))),
            1 => Ok(matches.remove(0)),
            _ => Err(StriderError::Ambiguous {
                location: name.to_string(),
                candidates: matches.iter().take(MAX_CANDIDATES).map(|f| f.name.clone()).collect(),
            }),
        }
    }

    /// Files that `expr` names, exact matches first.
    pub fn matching_files(&self, expr: &str) -> Vec<(String, bool)>
    {
        if self.symbols.files().iter().any(|f| f == expr) {
            return vec![(expr.to_string(), false)];
        }
        self.symbols
            .files()
            .iter()
            .filter_map(|path| self.file_matches(expr, path).map(|folded| (path.clone(), folded)))
            .collect()
    }

    /// Lowest statement address of `file:line`; an address that is a
    /// function entry is moved past the prologue.
    ///
    /// ## Errors
    ///
    /// `NotFound` if no statement starts on that line.
    pub fn find_file_location(&self, file: &str, line: u32) -> Result<Location>
    {
        let pcs = self.symbols.line_to_pcs(file, line);
        let Some(&pc) = pcs.first() else {
            return Err(StriderError::NotFound(format!("could not find statement at {file}:{line}")));
        };
        if let Some(function) = self.symbols.function_at(pc).filter(|f| f.entry == pc) {
            return Ok(self.symbols.location_at(self.symbols.prologue_end(&function)));
        }
        Ok(self.symbols.location_at(pc))
    }

    /// Location inside `function`
    ///
    /// `line < 0` is the post-prologue address, `line == 0` the raw entry,
    /// `line > 0` the statement `line` lines after the declaration.
    ///
    /// ## Errors
    ///
    /// `NotFound` when a positive offset names no statement or the function
    /// has no line table.
    pub fn find_function_location(&self, function: &Function, line: i64) -> Result<Location>
    {
        match line {
            l if l < 0 => Ok(self.symbols.location_at(self.symbols.prologue_end(function))),
            0 => Ok(self.symbols.location_at(function.entry)),
            l => {
                let file = function.file.as_deref().ok_or_else(|| {
                    StriderError::NotFound(format!("{} has no line information", function.name))
                })?;
                let target = u32::try_from(l)
                    .ok()
                    .and_then(|l| function.decl_line.checked_add(l))
                    .ok_or_else(|| StriderError::NotFound(format!("line offset {l} out of range")))?;
                self.find_file_location(file, target)
            }
        }
    }

    fn resolve_regex(&self, pattern: &str) -> Result<Vec<Location>>
    {
        let re = Regex::new(pattern)
            .map_err(|err| StriderError::InvalidArgument(format!("invalid regex \"{pattern}\": {err}")))?;
        let mut locations: Vec<Location> = self
            .symbols
            .functions()
            .iter()
            .filter(|f| re.is_match(&f.name))
            .map(|f| self.symbols.location_at(self.symbols.prologue_end(f)))
            .collect();
        locations.sort_by_key(|l| l.pc);
        locations.dedup_by_key(|l| l.pc);
        Ok(locations)
    }

    fn resolve_address_expr(&self, expr: &str, ctx: &ResolveContext<'_>) -> Result<Location>
    {
        if let Some(addr) = parse_int_literal(expr) {
            return Ok(self.symbols.location_at(Address::from(addr)));
        }
        let evaluate = ctx.evaluate.ok_or_else(|| {
            StriderError::NotFound(format!("cannot evaluate \"{expr}\" without a current scope"))
        })?;
        let value = evaluate(expr)?.value;
        match value {
            Value::Func { entry, .. } => {
                if entry.is_zero() {
                    return Err(StriderError::InvalidArgument(format!("\"{expr}\" is a nil function")));
                }
                let function = self
                    .symbols
                    .function_at(entry)
                    .ok_or_else(|| StriderError::NotFound(format!("no function at {entry}")))?;
                Ok(self.symbols.location_at(self.symbols.prologue_end(&function)))
            }
            Value::Int(v) => {
                let address = u64::try_from(v).map_err(|_| {
                    StriderError::InvalidArgument(format!("\"{expr}\" evaluates to {v}, not an address"))
                })?;
                Ok(self.symbols.location_at(Address::from(address)))
            }
            Value::Uint(v) => Ok(self.symbols.location_at(Address::from(v))),
            Value::Pointer(addr) => Ok(self.symbols.location_at(addr)),
            other => Err(StriderError::InvalidArgument(format!(
                "\"{expr}\" evaluates to {other}, not an address"
            ))),
        }
    }
}

fn no_current(expr: &str) -> StriderError
{
    StriderError::NotFound(format!("location \"{expr}\" needs a current source location"))
}
