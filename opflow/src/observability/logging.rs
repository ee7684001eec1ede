//! Global `tracing` subscriber setup.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// An `EnvFilter` directive, e.g. `"opflow=debug,info"`.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingConfig {
    /// Environment variable holding the filter directive.
    pub const FILTER_ENV: &'static str = "OPFLOW_LOG";
    /// Environment variable selecting the format (`pretty` or `json`).
    pub const FORMAT_ENV: &'static str = "OPFLOW_LOG_FORMAT";

    /// Creates a new logging configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    /// Loads the configuration from `OPFLOW_LOG` and `OPFLOW_LOG_FORMAT`,
    /// falling back to defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unknown format.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var(Self::FILTER_ENV) {
            config.filter = filter;
        }
        if let Ok(format) = std::env::var(Self::FORMAT_ENV) {
            config.format = parse_format(&format)?;
        }
        Ok(config)
    }
}

fn parse_format(raw: &str) -> Result<LogFormat, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "pretty" | "text" => Ok(LogFormat::Pretty),
        "json" => Ok(LogFormat::Json),
        _ => Err(ConfigError::new(
            LoggingConfig::FORMAT_ENV,
            raw,
            "expected 'pretty' or 'json'",
        )),
    }
}

/// Installs a global `tracing` subscriber for the given configuration.
///
/// Only the first call installs anything; later calls (and calls made after
/// another subscriber was installed elsewhere) are no-ops.
///
/// # Errors
///
/// Returns `ConfigError` if the filter directive does not parse.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), ConfigError> {
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| ConfigError::new(LoggingConfig::FILTER_ENV, &config.filter, e.to_string()))?;

    let result = match config.format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    };

    if let Err(error) = result {
        tracing::debug!(error = %error, "Tracing subscriber already initialized");
    }

    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.filter, "info");
        assert_eq!(config.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format("JSON").unwrap(), LogFormat::Json);
        assert_eq!(parse_format(" pretty ").unwrap(), LogFormat::Pretty);
        assert!(parse_format("xml").is_err());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: LoggingConfig = serde_json::from_str(r#"{"format": "json"}"#).unwrap();
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, "info");
    }

    #[test]
    fn test_invalid_filter_is_rejected_before_install() {
        let config = LoggingConfig::new().with_filter("opflow=[");
        // Either the filter is rejected, or tracing was already set up by
        // another test and the call is a no-op.
        if TRACING_INITIALIZED.get().is_none() {
            assert!(init_tracing(&config).is_err());
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::new().with_filter("warn");
        assert!(init_tracing(&config).is_ok());
        assert!(init_tracing(&config).is_ok());
    }
}
