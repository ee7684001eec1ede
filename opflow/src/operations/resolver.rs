//! Pluggable operation resolution.

use super::Operation;
use dashmap::DashMap;
use std::sync::Arc;

/// Factory function type for creating operations.
pub type OperationFactory = Arc<dyn Fn() -> Arc<dyn Operation> + Send + Sync>;

/// Produces operations by key.
///
/// Injected into a pipeline so operations can be registered by name instead
/// of by instance.
pub trait OperationResolver: Send + Sync {
    /// Resolves an operation, or `None` if nothing is registered under `key`.
    fn resolve(&self, key: &str) -> Option<Arc<dyn Operation>>;
}

/// A resolver backed by a concurrent map of named factories.
///
/// Every resolution calls the factory, so each registration gets its own
/// operation instance.
#[derive(Default)]
pub struct FactoryResolver {
    factories: DashMap<String, OperationFactory>,
}

impl FactoryResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a key, replacing any previous one.
    pub fn register<F>(&self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> Arc<dyn Operation> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
    }

    /// Registers a factory for a `Default` operation type under its type name.
    pub fn register_default<T>(&self)
    where
        T: Operation + Default + 'static,
    {
        self.register(std::any::type_name::<T>(), || Arc::new(T::default()));
    }

    /// Removes a factory. Returns true if one was registered.
    pub fn unregister(&self, key: &str) -> bool {
        self.factories.remove(key).is_some()
    }

    /// Returns true if a factory is registered under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Returns the number of registered factories.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no factories are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl OperationResolver for FactoryResolver {
    fn resolve(&self, key: &str) -> Option<Arc<dyn Operation>> {
        // Clone the factory out so the shard lock is not held while it runs.
        let factory = self.factories.get(key).map(|f| Arc::clone(f.value()))?;
        Some(factory())
    }
}

impl std::fmt::Debug for FactoryResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        f.debug_struct("FactoryResolver").field("keys", &keys).finish()
    }
}
