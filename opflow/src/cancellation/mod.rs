//! Cooperative cancellation for pipeline runs.
//!
//! A [`CancellationToken`] is passed to `Pipeline::execute_with_cancel` and
//! from there to every operation, interceptor and rollback.

mod token;

pub use token::{CancelCallback, CancellationToken};
