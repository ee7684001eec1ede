//! Reusable pipeline assembly.

use super::Pipeline;
use crate::errors::PipelineError;
use dashmap::DashMap;
use std::sync::Arc;

/// A reusable assembly of operations and interceptors.
///
/// Builders only compose registrations; they have no effect on how a run
/// behaves beyond what they register.
pub trait PipelineBuilder: Send + Sync {
    /// Adds this builder's registrations to `pipeline`.
    fn build(&self, pipeline: Pipeline) -> Result<Pipeline, PipelineError>;
}

impl<F> PipelineBuilder for F
where
    F: Fn(Pipeline) -> Result<Pipeline, PipelineError> + Send + Sync,
{
    fn build(&self, pipeline: Pipeline) -> Result<Pipeline, PipelineError> {
        self(pipeline)
    }
}

/// Produces builders by key.
pub trait BuilderResolver: Send + Sync {
    /// Resolves a builder, or `None` if nothing is registered under `key`.
    fn resolve(&self, key: &str) -> Option<Arc<dyn PipelineBuilder>>;
}

/// A resolver backed by a concurrent map of named builders.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: DashMap<String, Arc<dyn PipelineBuilder>>,
}

impl BuilderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a builder under a key, replacing any previous one.
    pub fn register(&self, key: impl Into<String>, builder: Arc<dyn PipelineBuilder>) {
        self.builders.insert(key.into(), builder);
    }

    /// Returns true if a builder is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.builders.contains_key(key)
    }

    /// Returns the number of registered builders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.builders.len()
    }

    /// Returns true if no builders are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.builders.is_empty()
    }
}

impl BuilderResolver for BuilderRegistry {
    fn resolve(&self, key: &str) -> Option<Arc<dyn PipelineBuilder>> {
        self.builders.get(key).map(|b| Arc::clone(b.value()))
    }
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self.builders.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        f.debug_struct("BuilderRegistry").field("keys", &keys).finish()
    }
}
