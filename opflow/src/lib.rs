//! # Opflow
//!
//! A sequential operation-pipeline executor with interceptor hooks,
//! lock/fault short-circuiting and reverse-order compensating rollback.
//!
//! Opflow provides:
//!
//! - **Ordered execution**: operations fold over one mutable [`context::ExecutionContext`]
//! - **Interceptors**: operations and event handlers attached at stage
//!   boundaries (first/pre/post/last/locked/faulty) or gated by a predicate
//! - **Short-circuiting**: a locked context runs only required operations, a
//!   faulty one stops (configurable)
//! - **Compensation**: executed operations roll back in reverse order when a
//!   run ends faulty
//! - **Cancellation**: a token threaded through every operation, interceptor
//!   and rollback
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use opflow::prelude::*;
//!
//! let pipeline = Pipeline::new()
//!     .with_options(PipelineOptions::new().with_force_rollback_on_fault(true))
//!     .add_operation(Arc::new(Reserve::default()))?
//!     .add_operation(Arc::new(Charge::default()))?
//!     .add_interceptor(Arc::new(Audit::default()), InterceptorStage::PostOperation)?;
//!
//! let ctx = pipeline.execute(None).await?;
//! if ctx.is_faulty() {
//!     for message in ctx.errors() {
//!         eprintln!("{message}");
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod context;
pub mod errors;
pub mod events;
pub mod interceptors;
pub mod observability;
pub mod operations;
pub mod pipeline;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{
        keys, ContentBag, ContentExt, ContentKey, CorrelationToken, ExecutionContext, Message,
        Severity,
    };
    pub use crate::errors::{
        ConfigError, ContextError, OperationFailure, PipelineError, RegistrationError,
        ResolutionError,
    };
    pub use crate::events::{
        get_telemetry_sink, set_telemetry_sink, EventArgs, EventHandler, FnEventHandler,
        LoggingTelemetrySink, NoOpTelemetrySink, TelemetrySink,
    };
    pub use crate::interceptors::InterceptorStage;
    pub use crate::observability::{init_tracing, LoggingConfig};
    pub use crate::operations::{
        FactoryResolver, FnOperation, NoOpOperation, Operation, OperationResolver, Required,
    };
    pub use crate::pipeline::{
        BuilderRegistry, BuilderResolver, Pipeline, PipelineBuilder, PipelineOptions,
        RollbackReport,
    };
    pub use std::sync::Arc;
}
