//! # Simulated Targets
//!
//! An in-memory process model that implements every trait the core depends
//! on, so sessions can be driven end to end without an OS debugging API.
//!
//! - [`ProgramBuilder`] assembles a program with line tables and variables
//! - [`Machine`] runs it as a [`TargetControl`](crate::target::TargetControl)
//! - [`SimLauncher`] starts a fresh [`Machine`] for every launch or restart
//! - [`SimEvaluator`] evaluates conditions and expressions against it
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use strider_core::sim::{ProgramBuilder, SimEvaluator, SimLauncher};
//! use strider_core::session::Session;
//!
//! let image = ProgramBuilder::new()
//!     .function("main.main", 3, |f| {
//!         f.line(4).nop();
//!         f.line(5).ret();
//!     })
//!     .build();
//! let mut session = Session::launch(
//!     Box::new(SimLauncher::new(Arc::new(image))),
//!     Arc::new(SimEvaluator),
//!     Default::default(),
//! )
//! .unwrap();
//! let state = session.continue_execution().terminal();
//! assert!(state.exited);
//! ```

pub mod eval;
pub mod machine;
pub mod program;

use std::sync::Arc;

use tracing::info;

pub use eval::SimEvaluator;
pub use machine::{Machine, SimInterrupt, RUNNING_THREAD};
pub use program::{Cmp, FunctionBuilder, Operand, ProgramBuilder, ProgramImage};

use crate::error::Result;
use crate::target::{Launcher, TargetParts};
use crate::types::ProcessId;

/// First pid handed out by a [`SimLauncher`].
pub const FIRST_PID: u32 = 4000;

/// [`Launcher`] that starts a new [`Machine`] per launch.
#[derive(Debug, Clone)]
pub struct SimLauncher
{
    image: Arc<ProgramImage>,
    next_pid: u32,
}

impl SimLauncher
{
    pub fn new(image: Arc<ProgramImage>) -> Self
    {
        Self {
            image,
            next_pid: FIRST_PID,
        }
    }

    /// Pid the next launch will get.
    pub fn next_pid(&self) -> ProcessId
    {
        ProcessId(self.next_pid)
    }
}

impl Launcher for SimLauncher
{
    fn launch(&mut self) -> Result<TargetParts>
    {
        let pid = ProcessId(self.next_pid);
        self.next_pid += 1;
        info!(%pid, "launching simulated process");
        Ok(parts(pid, Arc::clone(&self.image)))
    }
}

/// Parts for an already running simulated process, as if attached to.
pub fn attach(pid: ProcessId, image: Arc<ProgramImage>) -> TargetParts
{
    info!(%pid, "attaching to simulated process");
    parts(pid, image)
}

fn parts(pid: ProcessId, image: Arc<ProgramImage>) -> TargetParts
{
    TargetParts {
        target: Box::new(Machine::new(pid, Arc::clone(&image))),
        symbols: image.clone(),
        disassembler: image,
    }
}
