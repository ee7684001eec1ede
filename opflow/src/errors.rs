//! Error types for the opflow engine.
//!
//! Operation and handler bodies report failures through `anyhow::Error`,
//! since their error types belong to the business code. Everything the
//! engine itself can reject is modelled here.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for opflow.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A registration call was given an invalid argument.
    #[error("{0}")]
    Registration(#[from] RegistrationError),

    /// An operation or builder could not be resolved.
    #[error("{0}")]
    Resolution(#[from] ResolutionError),

    /// A captured operation failure surfaced to the caller.
    #[error("{0}")]
    Operation(#[from] OperationFailure),

    /// The execution context rejected a mutation.
    #[error("{0}")]
    Context(#[from] ContextError),

    /// Configuration could not be loaded.
    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl PipelineError {
    /// Returns the captured operation failure, if this is one.
    #[must_use]
    pub fn as_operation_failure(&self) -> Option<&OperationFailure> {
        match self {
            Self::Operation(failure) => Some(failure),
            _ => None,
        }
    }
}

/// A failure captured while running an operation, interceptor or event handler.
///
/// This is what gets stored under [`crate::context::keys::LAST_ERROR`] and
/// what is re-raised when exception propagation is enabled.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Operation '{operation}' failed: {message}")]
pub struct OperationFailure {
    /// The failing operation (or handler) name.
    pub operation: String,
    /// The rendered error chain.
    pub message: String,
    /// Whether the failure was a panic rather than a returned error.
    #[serde(default)]
    pub panicked: bool,
}

impl OperationFailure {
    /// Creates a failure from a returned error.
    #[must_use]
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
            panicked: false,
        }
    }

    /// Creates a failure from an `anyhow` error, keeping the full cause chain.
    #[must_use]
    pub fn from_error(operation: impl Into<String>, error: &anyhow::Error) -> Self {
        Self::new(operation, format!("{error:#}"))
    }

    /// Creates a failure from a caught panic payload.
    #[must_use]
    pub fn from_panic(operation: impl Into<String>, payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());

        Self {
            operation: operation.into(),
            message,
            panicked: true,
        }
    }

    /// Converts to a dictionary representation for telemetry payloads.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("operation".to_string(), serde_json::json!(self.operation));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("panicked".to_string(), serde_json::json!(self.panicked));
        map
    }
}

/// Errors raised eagerly by the registration API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    /// An operation or handler reported an empty name.
    #[error("Invalid argument: {kind} name must not be empty")]
    EmptyName {
        /// What was being registered ("operation", "interceptor", "event handler").
        kind: &'static str,
    },

    /// A resolver key was empty.
    #[error("Invalid argument: resolution key must not be empty")]
    EmptyKey,
}

impl RegistrationError {
    /// Returns a stable error code for diagnostics.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyName { .. } => "REGISTRATION-EMPTY_NAME",
            Self::EmptyKey => "REGISTRATION-EMPTY_KEY",
        }
    }
}

/// Errors raised when an operation or builder cannot be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// Nothing is registered under the key.
    #[error("'{key}' is not registered")]
    NotRegistered {
        /// The requested key.
        key: String,
    },

    /// The pipeline was asked to resolve but has no resolver.
    #[error("No resolver configured to resolve '{key}'")]
    NoResolver {
        /// The requested key.
        key: String,
    },
}

impl ResolutionError {
    /// Creates a not-registered error.
    #[must_use]
    pub fn not_registered(key: impl Into<String>) -> Self {
        Self::NotRegistered { key: key.into() }
    }

    /// Returns a stable error code for diagnostics.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotRegistered { .. } => "RESOLUTION-NOT_REGISTERED",
            Self::NoResolver { .. } => "RESOLUTION-NO_RESOLVER",
        }
    }
}

/// Errors raised by [`crate::context::ExecutionContext`] mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The correlation token is write-once.
    #[error("Correlation token already set to '{existing}'")]
    TokenAlreadySet {
        /// The token that stays in place.
        existing: String,
    },
}

/// Errors raised while loading configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    /// The configuration key (usually an environment variable name).
    pub key: String,
    /// The offending raw value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}
