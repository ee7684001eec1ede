//! Wall-clock timing for operations and rollbacks.

use std::time::Instant;

/// Times one operation (or rollback) and renders telemetry payloads for it.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the timed operation's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload for the matching `*.started` record.
    #[must_use]
    pub fn start_payload(&self) -> serde_json::Value {
        serde_json::json!({ "operation": self.name })
    }

    /// Finishes the span and renders the `*.completed` / `*.failed` payload.
    ///
    /// `error` is included when present.
    #[must_use]
    pub fn finish(self, error: Option<&str>) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "operation": self.name,
            "duration_ms": self.elapsed_ms(),
        });
        if let (Some(error), Some(map)) = (error, payload.as_object_mut()) {
            map.insert("error".to_string(), serde_json::json!(error));
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer_payloads() {
        let timer = SpanTimer::start("charge");
        assert_eq!(timer.name(), "charge");
        assert_eq!(timer.start_payload(), serde_json::json!({"operation": "charge"}));

        std::thread::sleep(std::time::Duration::from_millis(10));
        let payload = timer.finish(None);
        assert!(payload["duration_ms"].as_f64().unwrap() >= 10.0);
        assert!(payload.get("error").is_none());
    }

    #[test]
    fn test_span_timer_failure_payload() {
        let payload = SpanTimer::start("ship").finish(Some("no carrier"));
        assert_eq!(payload["operation"], "ship");
        assert_eq!(payload["error"], "no carrier");
    }
}
