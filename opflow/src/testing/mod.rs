//! Testing utilities for opflow pipelines.
//!
//! This module provides:
//! - A shared [`Journal`] that records execution order
//! - Mock operations (recording, failing, locking)
//! - A recording event handler

mod mocks;

pub use mocks::{
    FailingOperation, Journal, LockingOperation, RecordingHandler, RecordingOperation,
};
