/// Structured logging setup: env filter, console and rolling file output.
pub mod tracing_setup;

pub use tracing_setup::{init_tracing, LoggerError, LoggerOptions};
