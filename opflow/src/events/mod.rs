//! Event handlers and telemetry.
//!
//! Two separate concerns live here:
//! - [`EventHandler`]s are event-interceptors dispatched at stage boundaries
//! - [`TelemetrySink`]s receive fire-and-forget records about the run

mod dispatcher;
mod sink;

pub use dispatcher::{EventArgs, EventDispatcher, EventHandler, FnEventHandler};
#[cfg(test)]
pub use sink::MockTelemetrySink;
pub use sink::{
    CollectingTelemetrySink, LoggingTelemetrySink, NoOpTelemetrySink, TelemetryRecord,
    TelemetrySink,
};

use parking_lot::RwLock;
use std::sync::Arc;

static GLOBAL_TELEMETRY_SINK: RwLock<Option<Arc<dyn TelemetrySink>>> = RwLock::new(None);

/// Sets the process-wide default telemetry sink.
///
/// Pipelines pick up the default when they are created; a sink set
/// explicitly with `Pipeline::with_telemetry` takes precedence.
pub fn set_telemetry_sink(sink: Arc<dyn TelemetrySink>) {
    *GLOBAL_TELEMETRY_SINK.write() = Some(sink);
}

/// Clears the process-wide default telemetry sink.
pub fn clear_telemetry_sink() {
    *GLOBAL_TELEMETRY_SINK.write() = None;
}

/// Gets the process-wide default telemetry sink.
///
/// Returns a `NoOpTelemetrySink` if no sink is set.
pub fn get_telemetry_sink() -> Arc<dyn TelemetrySink> {
    GLOBAL_TELEMETRY_SINK
        .read()
        .clone()
        .unwrap_or_else(|| Arc::new(NoOpTelemetrySink))
}
