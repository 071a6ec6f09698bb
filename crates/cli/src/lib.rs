//! urio CLI library
//!
//! Command definitions, output formatting and the default backend wiring,
//! exported for the binary and its tests.

pub mod commands;
pub mod context;
pub mod exit_code;
pub mod output;

pub use context::{Context, default_registry};
