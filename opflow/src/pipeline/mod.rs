//! Pipeline assembly and execution.
//!
//! This module provides:
//! - The [`Pipeline`] registration API and run entry points
//! - Run policies ([`PipelineOptions`])
//! - Reusable builders and builder resolution
//! - Reverse-order rollback of executed operations

mod builder;
mod config;
mod executor;
mod rollback;
mod run_loop;


pub use builder::{BuilderRegistry, BuilderResolver, PipelineBuilder};
pub use config::PipelineOptions;
pub use executor::Pipeline;
pub use rollback::{RollbackCoordinator, RollbackReport};
