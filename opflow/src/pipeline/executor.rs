//! The pipeline: registration API and run entry points.

use super::builder::{BuilderResolver, PipelineBuilder};
use super::run_loop::RunLoop;
use super::PipelineOptions;
use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::errors::{PipelineError, RegistrationError, ResolutionError};
use crate::events::{get_telemetry_sink, EventHandler, TelemetrySink};
use crate::interceptors::{InterceptorRegistry, InterceptorStage, RunInterceptors};
use crate::operations::{Operation, OperationResolver};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// An ordered list of operations plus the interceptors wrapped around them.
///
/// Registration consumes and returns the pipeline so calls chain with `?`:
///
/// ```rust,ignore
/// let pipeline = Pipeline::new()
///     .add_operation(Arc::new(reserve))?
///     .add_operation(Arc::new(charge))?
///     .add_interceptor(Arc::new(audit), InterceptorStage::PostOperation)?;
///
/// let ctx = pipeline.execute(None).await?;
/// ```
///
/// Runs only read the pipeline, so one instance can serve concurrent runs;
/// each run gets its own context and its own one-shot interceptor state.
pub struct Pipeline {
    operations: Vec<Arc<dyn Operation>>,
    interceptors: InterceptorRegistry,
    options: PipelineOptions,
    telemetry: Arc<dyn TelemetrySink>,
    resolver: Option<Arc<dyn OperationResolver>>,
    builders: Option<Arc<dyn BuilderResolver>>,
    last_executed: Mutex<Vec<String>>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
            interceptors: InterceptorRegistry::new(),
            options: PipelineOptions::default(),
            telemetry: get_telemetry_sink(),
            resolver: None,
            builders: None,
            last_executed: Mutex::new(Vec::new()),
        }
    }
}

impl Pipeline {
    /// Creates an empty pipeline with default options and the process-wide
    /// telemetry sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the run policies.
    #[must_use]
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the telemetry sink.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Sets the resolver used by [`Self::add_operation_by_key`] and
    /// [`Self::add_operation_default`].
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn OperationResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the resolver used by [`Self::apply_by_key`].
    #[must_use]
    pub fn with_builder_resolver(mut self, builders: Arc<dyn BuilderResolver>) -> Self {
        self.builders = Some(builders);
        self
    }

    /// Returns the run policies.
    #[must_use]
    pub fn options(&self) -> PipelineOptions {
        self.options
    }

    /// Returns the interceptor registry.
    #[must_use]
    pub fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }

    /// Returns the operation names in execution order.
    #[must_use]
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the pipeline has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the names of the operations the most recent completed run
    /// executed, in execution order.
    #[must_use]
    pub fn executed_operations(&self) -> Vec<String> {
        self.last_executed.lock().clone()
    }

    /// Appends an operation.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the operation has no name.
    pub fn add_operation(mut self, operation: Arc<dyn Operation>) -> Result<Self, PipelineError> {
        if operation.name().trim().is_empty() {
            return Err(RegistrationError::EmptyName { kind: "operation" }.into());
        }
        debug!(operation = %operation.name(), "Adding operation");
        self.operations.push(operation);
        Ok(self)
    }

    /// Appends the operation the configured resolver produces for `key`.
    ///
    /// # Errors
    ///
    /// Fails with `RegistrationError::EmptyKey` for a blank key,
    /// `ResolutionError::NoResolver` if no resolver is configured, and
    /// `ResolutionError::NotRegistered` if the resolver has nothing for `key`.
    pub fn add_operation_by_key(self, key: &str) -> Result<Self, PipelineError> {
        if key.trim().is_empty() {
            return Err(RegistrationError::EmptyKey.into());
        }
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| ResolutionError::NoResolver {
                key: key.to_string(),
            })?;
        let operation = resolver
            .resolve(key)
            .ok_or_else(|| ResolutionError::not_registered(key))?;
        self.add_operation(operation)
    }

    /// Appends an operation of type `T`.
    ///
    /// The resolver is asked first, keyed by the type name; without a
    /// resolver or a match, `T::default()` is used.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the operation has no name.
    pub fn add_operation_default<T>(self) -> Result<Self, PipelineError>
    where
        T: Operation + Default + 'static,
    {
        let resolved = self
            .resolver
            .as_ref()
            .and_then(|resolver| resolver.resolve(std::any::type_name::<T>()));
        let operation = resolved.unwrap_or_else(|| Arc::new(T::default()) as Arc<dyn Operation>);
        self.add_operation(operation)
    }

    /// Attaches an operation-interceptor to a stage.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the operation has no name.
    pub fn add_interceptor(
        mut self,
        operation: Arc<dyn Operation>,
        stage: InterceptorStage,
    ) -> Result<Self, PipelineError> {
        self.interceptors.add(stage, operation)?;
        Ok(self)
    }

    /// Attaches an operation-interceptor that runs before (`is_post = false`)
    /// or after (`is_post = true`) every operation for which `predicate`
    /// matches the current context.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the operation has no name.
    pub fn add_custom_interceptor<P>(
        mut self,
        operation: Arc<dyn Operation>,
        predicate: P,
        is_post: bool,
    ) -> Result<Self, PipelineError>
    where
        P: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.interceptors
            .add_predicate_gated(operation, predicate, is_post)?;
        Ok(self)
    }

    /// Attaches an event handler to a stage.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the handler has no name.
    pub fn add_event_interceptor(
        mut self,
        handler: Arc<dyn EventHandler>,
        stage: InterceptorStage,
    ) -> Result<Self, PipelineError> {
        self.interceptors.add_event(stage, handler)?;
        Ok(self)
    }

    /// Attaches a predicate-gated event handler.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::EmptyName` if the handler has no name.
    pub fn add_custom_event_interceptor<P>(
        mut self,
        handler: Arc<dyn EventHandler>,
        predicate: P,
        is_post: bool,
    ) -> Result<Self, PipelineError>
    where
        P: Fn(&ExecutionContext) -> bool + Send + Sync + 'static,
    {
        self.interceptors
            .add_predicate_gated_event(handler, predicate, is_post)?;
        Ok(self)
    }

    /// Applies a builder.
    ///
    /// # Errors
    ///
    /// Returns whatever the builder returns.
    pub fn apply<B>(self, builder: &B) -> Result<Self, PipelineError>
    where
        B: PipelineBuilder + ?Sized,
    {
        builder.build(self)
    }

    /// Applies the builder the configured builder resolver produces for `key`.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::add_operation_by_key`], or with the builder's own error.
    pub fn apply_by_key(self, key: &str) -> Result<Self, PipelineError> {
        if key.trim().is_empty() {
            return Err(RegistrationError::EmptyKey.into());
        }
        let builders = self
            .builders
            .as_ref()
            .ok_or_else(|| ResolutionError::NoResolver {
                key: key.to_string(),
            })?;
        let builder = builders
            .resolve(key)
            .ok_or_else(|| ResolutionError::not_registered(key))?;
        builder.build(self)
    }

    /// Runs the pipeline against `ctx`, or a fresh context if `None`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Operation` only when the run ended faulty and
    /// `allow_propagate_exception` is set; otherwise failures are reported
    /// through the returned context's messages.
    pub async fn execute(
        &self,
        ctx: Option<ExecutionContext>,
    ) -> Result<ExecutionContext, PipelineError> {
        self.execute_with_cancel(ctx.unwrap_or_default(), &CancellationToken::new())
            .await
    }

    /// Runs the pipeline with a cancellation token.
    ///
    /// The token is checked before every operation and handed to every
    /// operation, interceptor and rollback. Once it is cancelled the run
    /// records one error message and skips the remaining operations.
    ///
    /// # Errors
    ///
    /// See [`Self::execute`].
    pub async fn execute_with_cancel(
        &self,
        ctx: ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<ExecutionContext, PipelineError> {
        let run = RunLoop::new(
            self.options,
            self.telemetry.as_ref(),
            RunInterceptors::new(&self.interceptors),
            cancel,
        );
        let outcome = run.run(&self.operations, ctx).await;

        *self.last_executed.lock() = outcome.executed;
        if let Some(report) = &outcome.rollback {
            debug!(
                attempted = report.attempted,
                failed = report.failed.len(),
                "Rollback report"
            );
        }

        match outcome.failure {
            Some(failure)
                if outcome.context.is_faulty() && self.options.allow_propagate_exception =>
            {
                Err(PipelineError::Operation(failure))
            }
            _ => Ok(outcome.context),
        }
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("operations", &self.operation_names())
            .field("interceptors", &self.interceptors)
            .field("options", &self.options)
            .field("has_resolver", &self.resolver.is_some())
            .field("has_builder_resolver", &self.builders.is_some())
            .finish()
    }
}
