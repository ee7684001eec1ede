//! Execution context carried through every step of a pipeline run.
//!
//! This module provides:
//! - The mutable [`ExecutionContext`] with lock/fault state and diagnostics
//! - Typed content keys replacing a stringly-typed scratch map
//! - Diagnostic messages with severities

mod content;
mod execution;
mod message;

pub use content::{ContentBag, ContentExt, ContentKey};
pub use execution::{CorrelationToken, ExecutionContext};
pub use message::{Message, Severity};

/// Conventional content keys written by the engine itself.
pub mod keys {
    use super::ContentKey;
    use crate::errors::OperationFailure;

    /// The most recent failure captured during the run.
    pub const LAST_ERROR: ContentKey<OperationFailure> = ContentKey::new("opflow.last_error");
}
