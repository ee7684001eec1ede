//! Telemetry sink trait and implementations.

use tracing::{debug, error, info, trace, warn, Level};

/// Receives fire-and-forget telemetry records from the run loop.
///
/// Records surround the run, each operation and each rollback. Sinks must
/// not panic and cannot influence control flow: `record` has no return value.
#[cfg_attr(test, mockall::automock)]
pub trait TelemetrySink: Send + Sync {
    /// Records an event.
    ///
    /// # Arguments
    ///
    /// * `level` - Severity of the record
    /// * `event` - Event name (e.g., "operation.started")
    /// * `payload` - Event data
    fn record(&self, level: Level, event: &str, payload: serde_json::Value);
}

/// A no-op sink that discards all records.
///
/// Used as the default when no sink is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTelemetrySink;

impl TelemetrySink for NoOpTelemetrySink {
    fn record(&self, _level: Level, _event: &str, _payload: serde_json::Value) {}
}

/// A sink that forwards records to `tracing` at the record's own level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingTelemetrySink;

impl TelemetrySink for LoggingTelemetrySink {
    fn record(&self, level: Level, event: &str, payload: serde_json::Value) {
        match level {
            Level::ERROR => error!(event = %event, payload = %payload, "Telemetry: {}", event),
            Level::WARN => warn!(event = %event, payload = %payload, "Telemetry: {}", event),
            Level::INFO => info!(event = %event, payload = %payload, "Telemetry: {}", event),
            Level::DEBUG => debug!(event = %event, payload = %payload, "Telemetry: {}", event),
            _ => trace!(event = %event, payload = %payload, "Telemetry: {}", event),
        }
    }
}

/// A single record captured by [`CollectingTelemetrySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    /// Record level.
    pub level: Level,
    /// Event name.
    pub event: String,
    /// Event data.
    pub payload: serde_json::Value,
}

/// A collecting sink for testing purposes.
#[derive(Debug, Default)]
pub struct CollectingTelemetrySink {
    records: parking_lot::RwLock<Vec<TelemetryRecord>>,
}

impl CollectingTelemetrySink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records.read().clone()
    }

    /// Returns the names of all collected events, in order.
    #[must_use]
    pub fn event_names(&self) -> Vec<String> {
        self.records.read().iter().map(|r| r.event.clone()).collect()
    }

    /// Returns records whose event name starts with `prefix`.
    #[must_use]
    pub fn records_of_type(&self, prefix: &str) -> Vec<TelemetryRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| r.event.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Clears all collected records.
    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl TelemetrySink for CollectingTelemetrySink {
    fn record(&self, level: Level, event: &str, payload: serde_json::Value) {
        self.records.write().push(TelemetryRecord {
            level,
            event: event.to_string(),
            payload,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_and_logging_sinks_accept_records() {
        NoOpTelemetrySink.record(Level::INFO, "test", serde_json::json!({}));
        LoggingTelemetrySink.record(Level::WARN, "test.warn", serde_json::json!({"x": 1}));
        LoggingTelemetrySink.record(Level::TRACE, "test.trace", serde_json::Value::Null);
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingTelemetrySink::new();
        assert!(sink.is_empty());

        sink.record(Level::INFO, "operation.started", serde_json::json!({"operation": "a"}));
        sink.record(Level::ERROR, "operation.failed", serde_json::json!({"operation": "a"}));
        sink.record(Level::INFO, "rollback.started", serde_json::json!({}));

        assert_eq!(sink.len(), 3);
        assert_eq!(sink.records_of_type("operation.").len(), 2);
        assert_eq!(sink.records()[1].level, Level::ERROR);
        assert_eq!(
            sink.event_names(),
            vec!["operation.started", "operation.failed", "rollback.started"]
        );

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_mock_sink_expectations() {
        let mut sink = MockTelemetrySink::new();
        sink.expect_record()
            .withf(|level, event, _| *level == Level::INFO && event == "pipeline.started")
            .times(1)
            .return_const(());

        sink.record(Level::INFO, "pipeline.started", serde_json::json!({}));
    }
}
