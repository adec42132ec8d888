//! Structured logging for the analytics engine.

pub mod tracing_setup;

pub use tracing_setup::*;
