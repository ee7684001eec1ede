//! Run policies.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Policies that decide how a run reacts to faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Skip every remaining operation once the context is faulty.
    #[serde(default = "default_break_on_fault")]
    pub break_on_fault: bool,
    /// Roll back executed operations when the run ends faulty.
    #[serde(default)]
    pub force_rollback_on_fault: bool,
    /// Return the last captured failure as an error instead of only
    /// recording it on the context.
    #[serde(default)]
    pub allow_propagate_exception: bool,
}

fn default_break_on_fault() -> bool {
    true
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            break_on_fault: default_break_on_fault(),
            force_rollback_on_fault: false,
            allow_propagate_exception: false,
        }
    }
}

impl PipelineOptions {
    /// Environment variable for `break_on_fault`.
    pub const BREAK_ON_FAULT_ENV: &'static str = "OPFLOW_BREAK_ON_FAULT";
    /// Environment variable for `force_rollback_on_fault`.
    pub const FORCE_ROLLBACK_ENV: &'static str = "OPFLOW_FORCE_ROLLBACK_ON_FAULT";
    /// Environment variable for `allow_propagate_exception`.
    pub const PROPAGATE_ENV: &'static str = "OPFLOW_ALLOW_PROPAGATE_EXCEPTION";

    /// Creates options with the default policies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `break_on_fault`.
    #[must_use]
    pub fn with_break_on_fault(mut self, enabled: bool) -> Self {
        self.break_on_fault = enabled;
        self
    }

    /// Sets `force_rollback_on_fault`.
    #[must_use]
    pub fn with_force_rollback_on_fault(mut self, enabled: bool) -> Self {
        self.force_rollback_on_fault = enabled;
        self
    }

    /// Sets `allow_propagate_exception`.
    #[must_use]
    pub fn with_allow_propagate_exception(mut self, enabled: bool) -> Self {
        self.allow_propagate_exception = enabled;
        self
    }

    /// Loads options from the process environment.
    ///
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set to something that is not a boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads options through an arbitrary lookup function.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a value is not a boolean.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(raw) = lookup(Self::BREAK_ON_FAULT_ENV) {
            options.break_on_fault = parse_bool(Self::BREAK_ON_FAULT_ENV, &raw)?;
        }
        if let Some(raw) = lookup(Self::FORCE_ROLLBACK_ENV) {
            options.force_rollback_on_fault = parse_bool(Self::FORCE_ROLLBACK_ENV, &raw)?;
        }
        if let Some(raw) = lookup(Self::PROPAGATE_ENV) {
            options.allow_propagate_exception = parse_bool(Self::PROPAGATE_ENV, &raw)?;
        }
        Ok(options)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::new(key, raw, "expected a boolean")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let options = PipelineOptions::default();
        assert!(options.break_on_fault);
        assert!(!options.force_rollback_on_fault);
        assert!(!options.allow_propagate_exception);
    }

    #[test]
    fn test_builders() {
        let options = PipelineOptions::new()
            .with_break_on_fault(false)
            .with_force_rollback_on_fault(true)
            .with_allow_propagate_exception(true);
        assert_eq!(
            options,
            PipelineOptions {
                break_on_fault: false,
                force_rollback_on_fault: true,
                allow_propagate_exception: true,
            }
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let options: PipelineOptions =
            serde_json::from_str(r#"{"force_rollback_on_fault": true}"#).unwrap();
        assert!(options.break_on_fault);
        assert!(options.force_rollback_on_fault);
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            (PipelineOptions::BREAK_ON_FAULT_ENV, "off"),
            (PipelineOptions::FORCE_ROLLBACK_ENV, "TRUE"),
        ]
        .into_iter()
        .collect();

        let options =
            PipelineOptions::from_lookup(|key| env.get(key).map(|v| (*v).to_string())).unwrap();
        assert!(!options.break_on_fault);
        assert!(options.force_rollback_on_fault);
        assert!(!options.allow_propagate_exception);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = PipelineOptions::from_lookup(|key| {
            (key == PipelineOptions::PROPAGATE_ENV).then(|| "maybe".to_string())
        })
        .unwrap_err();
        assert_eq!(err.key, PipelineOptions::PROPAGATE_ENV);
        assert_eq!(err.value, "maybe");
    }
}
