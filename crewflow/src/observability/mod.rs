//! Logging setup and tracing spans.

mod logging;
mod spans;

pub use logging::{init_tracing, LoggingConfig};
pub use spans::{run_span, stage_span};
