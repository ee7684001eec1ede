//! Event handlers and their dispatch at stage boundaries.

use crate::context::ExecutionContext;
use crate::errors::OperationFailure;
use crate::interceptors::InterceptorStage;
use async_trait::async_trait;
use futures::FutureExt;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Arguments passed to an event handler alongside the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventArgs {
    /// The stage boundary that fired.
    pub stage: InterceptorStage,
    /// Whether the handler was selected by a predicate rather than by stage.
    pub predicate_gated: bool,
    /// The operation being wrapped, for per-operation stages.
    pub operation: Option<String>,
}

impl EventArgs {
    /// Creates arguments for a loop-level stage.
    #[must_use]
    pub fn stage(stage: InterceptorStage) -> Self {
        Self {
            stage,
            predicate_gated: false,
            operation: None,
        }
    }

    /// Sets the wrapped operation.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Marks the arguments as coming from a predicate-gated registration.
    #[must_use]
    pub fn gated(mut self) -> Self {
        self.predicate_gated = true;
        self
    }
}

/// A notification handler attached to a stage boundary.
///
/// Handlers observe the context; they cannot mutate it. A returned error is
/// recorded on the context exactly like an operation failure.
#[async_trait]
pub trait EventHandler: Send + Sync + Debug {
    /// Returns the handler name, used in diagnostics.
    fn name(&self) -> &str;

    /// Handles the event.
    async fn handle(&self, ctx: &ExecutionContext, args: &EventArgs) -> anyhow::Result<()>;
}

type HandlerFn = dyn Fn(&ExecutionContext, &EventArgs) -> anyhow::Result<()> + Send + Sync;

/// A closure-based event handler.
pub struct FnEventHandler {
    name: String,
    func: Box<HandlerFn>,
}

impl FnEventHandler {
    /// Creates a new closure-based handler.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ExecutionContext, &EventArgs) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

impl Debug for FnEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEventHandler")
            .field("name", &self.name)
            .finish()
    }
}

#[async_trait]
impl EventHandler for FnEventHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &ExecutionContext, args: &EventArgs) -> anyhow::Result<()> {
        (self.func)(ctx, args)
    }
}

/// Invokes event handlers in registration order.
///
/// Each handler is awaited before the next one starts, and the caller
/// awaits the whole dispatch before its stage proceeds. Every handler runs
/// even if an earlier one failed; failures (including panics) are returned
/// so the caller can record them on the context.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventDispatcher;

impl EventDispatcher {
    /// Creates a new dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Dispatches `args` to every handler.
    pub async fn dispatch(
        &self,
        handlers: &[Arc<dyn EventHandler>],
        ctx: &ExecutionContext,
        args: &EventArgs,
    ) -> Vec<OperationFailure> {
        let mut failures = Vec::new();
        for handler in handlers {
            if let Err(failure) = self.invoke(handler.as_ref(), ctx, args).await {
                failures.push(failure);
            }
        }
        failures
    }

    /// Dispatches to a single handler, isolating errors and panics.
    pub async fn invoke(
        &self,
        handler: &dyn EventHandler,
        ctx: &ExecutionContext,
        args: &EventArgs,
    ) -> Result<(), OperationFailure> {
        debug!(handler = %handler.name(), stage = %args.stage, "Dispatching event");

        let outcome = AssertUnwindSafe(handler.handle(ctx, args))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => OperationFailure::from_error(handler.name(), &err),
            Err(panic) => OperationFailure::from_panic(handler.name(), panic.as_ref()),
        };

        warn!(
            handler = %handler.name(),
            stage = %args.stage,
            error = %failure.message,
            "Event handler failed"
        );
        Err(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recording(name: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn EventHandler> {
        let label = name.to_string();
        Arc::new(FnEventHandler::new(name, move |_, args| {
            log.lock().push(format!("{label}@{}", args.stage));
            Ok(())
        }))
    }

    #[tokio::test]
    async fn test_dispatch_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handlers = vec![recording("a", log.clone()), recording("b", log.clone())];
        let ctx = ExecutionContext::new();

        let failures = EventDispatcher::new()
            .dispatch(&handlers, &ctx, &EventArgs::stage(InterceptorStage::FirstOperation))
            .await;

        assert!(failures.is_empty());
        assert_eq!(
            *log.lock(),
            vec!["a@first_operation".to_string(), "b@first_operation".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_later_handlers() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let failing: Arc<dyn EventHandler> =
            Arc::new(FnEventHandler::new("broken", |_, _| anyhow::bail!("handler down")));
        let handlers = vec![failing, recording("after", log.clone())];
        let ctx = ExecutionContext::new();

        let failures = EventDispatcher::new()
            .dispatch(&handlers, &ctx, &EventArgs::stage(InterceptorStage::LastOperation))
            .await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].operation, "broken");
        assert_eq!(failures[0].message, "handler down");
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let panicking = FnEventHandler::new("panics", |_, _| panic!("handler exploded"));
        let ctx = ExecutionContext::new();

        let failure = EventDispatcher::new()
            .invoke(&panicking, &ctx, &EventArgs::stage(InterceptorStage::Faulty))
            .await
            .unwrap_err();

        assert!(failure.panicked);
        assert_eq!(failure.message, "handler exploded");
    }

    #[test]
    fn test_event_args_builders() {
        let args = EventArgs::stage(InterceptorStage::PreOperation)
            .with_operation("charge")
            .gated();
        assert!(args.predicate_gated);
        assert_eq!(args.operation.as_deref(), Some("charge"));
    }
}
