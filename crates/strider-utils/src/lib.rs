//! # Strider Utilities
//!
//! Shared helpers for the strider workspace, mostly the `tracing` subscriber
//! setup used by binaries and tests.

pub mod logging;

pub use logging::{init_logging, init_logging_with_level, init_test_logging, LogFormat, LogLevel, LoggingError};
pub use tracing::{debug, error, info, trace, warn};
