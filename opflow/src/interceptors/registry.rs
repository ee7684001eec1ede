//! Categorized storage for interceptors.

use super::InterceptorStage;
use crate::context::ExecutionContext;
use crate::errors::RegistrationError;
use crate::events::EventHandler;
use crate::operations::Operation;
use std::sync::Arc;

/// A predicate evaluated against the current context at each main-loop step.
pub type Predicate = Arc<dyn Fn(&ExecutionContext) -> bool + Send + Sync>;

/// An interceptor that only runs when its predicate matches.
#[derive(Clone)]
pub struct Gated<T> {
    /// Decides whether the interceptor runs for the current step.
    pub predicate: Predicate,
    /// The interceptor itself.
    pub target: T,
}

impl<T> Gated<T> {
    /// Returns true if the interceptor should run against `ctx`.
    #[must_use]
    pub fn matches(&self, ctx: &ExecutionContext) -> bool {
        (self.predicate)(ctx)
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Gated<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gated").field("target", &self.target).finish()
    }
}

/// Interceptors grouped by stage and by predicate, for operations and event handlers.
///
/// The registry is assembled before a run and only read during it; one-shot
/// consumption of [`InterceptorStage::Locked`] and [`InterceptorStage::Faulty`]
/// is tracked per run by [`super::RunInterceptors`].
#[derive(Default, Clone)]
pub struct InterceptorRegistry {
    operations: [Vec<Arc<dyn Operation>>; 6],
    pre_custom: Vec<Gated<Arc<dyn Operation>>>,
    post_custom: Vec<Gated<Arc<dyn Operation>>>,
    events: [Vec<Arc<dyn EventHandler>>; 6],
    pre_custom_events: Vec<Gated<Arc<dyn EventHandler>>>,
    post_custom_events: Vec<Gated<Arc<dyn EventHandler>>>,
}

impl InterceptorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operation-interceptor to a stage.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the operation has no name.
    pub fn add(
        &mut self,
        stage: InterceptorStage,
        operation: Arc<dyn Operation>,
    ) -> Result<(), RegistrationError> {
        validate_name(operation.name(), "interceptor")?;
        self.operations[stage.index()].push(operation);
        Ok(())
    }

    /// Adds a predicate-gated operation-interceptor, run before
    /// (`is_post = false`) or after (`is_post = true`) each operation.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the operation has no name.
    pub fn add_predicate_gated<P>(
        &mut self,
        operation: Arc<dyn Operation>,
        predicate: P,
        is_post: bool,
    ) -> Result<(), RegistrationError>
    where
        P: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        validate_name(operation.name(), "interceptor")?;
        let gated = Gated {
            predicate: Arc::new(predicate),
            target: operation,
        };
        if is_post {
            self.post_custom.push(gated);
        } else {
            self.pre_custom.push(gated);
        }
        Ok(())
    }

    /// Adds an event-interceptor to a stage.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the handler has no name.
    pub fn add_event(
        &mut self,
        stage: InterceptorStage,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RegistrationError> {
        validate_name(handler.name(), "event handler")?;
        self.events[stage.index()].push(handler);
        Ok(())
    }

    /// Adds a predicate-gated event-interceptor.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the handler has no name.
    pub fn add_predicate_gated_event<P>(
        &mut self,
        handler: Arc<dyn EventHandler>,
        predicate: P,
        is_post: bool,
    ) -> Result<(), RegistrationError>
    where
        P: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        validate_name(handler.name(), "event handler")?;
        let gated = Gated {
            predicate: Arc::new(predicate),
            target: handler,
        };
        if is_post {
            self.post_custom_events.push(gated);
        } else {
            self.pre_custom_events.push(gated);
        }
        Ok(())
    }

    /// Returns the operation-interceptors of a stage, in registration order.
    #[must_use]
    pub fn operations(&self, stage: InterceptorStage) -> &[Arc<dyn Operation>] {
        &self.operations[stage.index()]
    }

    /// Returns the predicate-gated operation-interceptors.
    #[must_use]
    pub fn custom_operations(&self, is_post: bool) -> &[Gated<Arc<dyn Operation>>] {
        if is_post {
            &self.post_custom
        } else {
            &self.pre_custom
        }
    }

    /// Returns the event-interceptors of a stage, in registration order.
    #[must_use]
    pub fn events(&self, stage: InterceptorStage) -> &[Arc<dyn EventHandler>] {
        &self.events[stage.index()]
    }

    /// Returns the predicate-gated event-interceptors.
    #[must_use]
    pub fn custom_events(&self, is_post: bool) -> &[Gated<Arc<dyn EventHandler>>] {
        if is_post {
            &self.post_custom_events
        } else {
            &self.pre_custom_events
        }
    }

    /// Returns the total number of registered interceptors of all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.iter().map(Vec::len).sum::<usize>()
            + self.events.iter().map(Vec::len).sum::<usize>()
            + self.pre_custom.len()
            + self.post_custom.len()
            + self.pre_custom_events.len()
            + self.post_custom_events.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for InterceptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("InterceptorRegistry");
        for stage in InterceptorStage::ALL {
            s.field(
                &format!("{stage}"),
                &(self.operations(stage).len(), self.events(stage).len()),
            );
        }
        s.field("pre_custom", &self.pre_custom.len())
            .field("post_custom", &self.post_custom.len())
            .finish()
    }
}

fn validate_name(name: &str, kind: &'static str) -> Result<(), RegistrationError> {
    if name.trim().is_empty() {
        return Err(RegistrationError::EmptyName { kind });
    }
    Ok(())
}
