//! # strider-core
//!
//! Control core of the strider debugger.
//!
//! This crate turns a minimal process-control surface into a source-level
//! debugger:
//! - Location expressions resolved to addresses (`main.go:12`, `+3`, `*0x401000`)
//! - Breakpoints and tracepoints with conditions, hit counts and captures
//! - Step over, step into and single-instruction stepping
//! - Per-task stack unwinding and evaluation scopes
//! - Continue cycles that report tracepoints without stopping
//!
//! ## Collaborators
//!
//! The core never talks to the OS or parses object files itself. The
//! embedder supplies:
//! - [`TargetControl`](target::TargetControl) and [`Launcher`](target::Launcher)
//!   for process control
//! - [`SymbolService`](symbols::SymbolService) for functions, lines and variables
//! - [`Disassembler`](disasm::Disassembler) for instruction decoding
//! - [`Evaluator`](eval::Evaluator) for expressions
//!
//! The [`sim`] module implements all of them over an in-memory program.
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use strider_core::prelude::*;
//! use strider_core::sim::{ProgramBuilder, SimEvaluator, SimLauncher};
//!
//! let image = ProgramBuilder::new()
//!     .function("main.main", 3, |f| {
//!         f.local("i");
//!         f.line(4).set("i", 7);
//!         f.line(5).ret();
//!     })
//!     .build();
//! let mut session = Session::launch(
//!     Box::new(SimLauncher::new(Arc::new(image))),
//!     Arc::new(SimEvaluator),
//!     DebuggerConfig::default(),
//! )?;
//! BreakpointBuilder::file_line("main.go", 5).create(&mut session)?;
//!
//! let state = session.continue_execution().terminal();
//! assert_eq!(state.line(), 5);
//! let i = session.eval_variable(EvalScope::current(), "i", &LoadConfig::default())?;
//! assert_eq!(i.value.as_i64(), Some(7));
//! # Ok::<(), StriderError>(())
//! ```

pub mod breakpoints;
pub mod config;
pub mod disasm;
pub mod error;
pub mod eval;
pub mod events;
pub mod location;
pub mod prelude;
pub mod session;
pub mod sim;
mod step;
pub mod symbols;
pub mod target;
pub mod types;
pub mod unwind;

pub use breakpoints::{Breakpoint, BreakpointBuilder, BreakpointId, BreakpointSpec};
pub use config::{DebuggerConfig, LoadConfig};
pub use error::{Result, StriderError, TargetFault};
pub use session::{ExecutionState, Session};
pub use types::{Address, ProcessId, ThreadId};
