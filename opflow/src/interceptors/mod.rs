//! Interceptors attached to stage boundaries of a run.
//!
//! An interceptor is either an [`crate::operations::Operation`] or an
//! [`crate::events::EventHandler`], registered under an
//! [`InterceptorStage`] or gated by a predicate on the current context.

mod registry;
mod snapshot;
mod stage;

pub use registry::{Gated, InterceptorRegistry, Predicate};
pub use snapshot::{OneShot, OneShotInterceptors, RunInterceptors};
pub use stage::InterceptorStage;
