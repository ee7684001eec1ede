//! Logging setup and timing helpers.

mod logging;
mod timer;

pub use logging::{init_tracing, LoggingConfig, LogFormat};
pub use timer::SpanTimer;
