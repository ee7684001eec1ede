//! The sequential fold that drives operations through interceptor stages.

use super::rollback::{RollbackCoordinator, RollbackReport};
use super::PipelineOptions;
use crate::cancellation::CancellationToken;
use crate::context::{keys, ContentExt, ExecutionContext, Message};
use crate::errors::OperationFailure;
use crate::events::{EventArgs, EventDispatcher, EventHandler, TelemetrySink};
use crate::interceptors::{Gated, InterceptorStage, RunInterceptors};
use crate::observability::SpanTimer;
use crate::operations::Operation;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Level};

/// Sends a record to the sink, swallowing a panicking sink.
pub(crate) fn emit(sink: &dyn TelemetrySink, level: Level, event: &str, payload: serde_json::Value) {
    let recorded = std::panic::catch_unwind(AssertUnwindSafe(|| sink.record(level, event, payload)));
    if recorded.is_err() {
        warn!(event = %event, "Telemetry sink panicked");
    }
}

/// What a finished run hands back to the pipeline.
#[derive(Debug)]
pub(crate) struct RunOutcome {
    pub context: ExecutionContext,
    pub executed: Vec<String>,
    pub failure: Option<OperationFailure>,
    pub rollback: Option<RollbackReport>,
}

/// Why an operation did not run.
#[derive(Debug, Clone, Copy)]
enum SkipReason {
    Faulty,
    Locked,
    Cancelled,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Faulty => "faulty",
            Self::Locked => "locked",
            Self::Cancelled => "cancelled",
        }
    }
}

/// State for a single top-level run.
pub(crate) struct RunLoop<'a> {
    options: PipelineOptions,
    telemetry: &'a dyn TelemetrySink,
    interceptors: RunInterceptors<'a>,
    dispatcher: EventDispatcher,
    cancel: &'a CancellationToken,
    executed: Vec<Arc<dyn Operation>>,
    pending: Option<OperationFailure>,
    cancel_recorded: bool,
}

impl<'a> RunLoop<'a> {
    pub(crate) fn new(
        options: PipelineOptions,
        telemetry: &'a dyn TelemetrySink,
        interceptors: RunInterceptors<'a>,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            options,
            telemetry,
            interceptors,
            dispatcher: EventDispatcher::new(),
            cancel,
            executed: Vec::new(),
            pending: None,
            cancel_recorded: false,
        }
    }

    /// Folds `operations` over `ctx`.
    pub(crate) async fn run(
        mut self,
        operations: &[Arc<dyn Operation>],
        mut ctx: ExecutionContext,
    ) -> RunOutcome {
        if operations.is_empty() {
            debug!("Empty operation list, returning context untouched");
            return RunOutcome {
                context: ctx,
                executed: Vec::new(),
                failure: None,
                rollback: None,
            };
        }

        let started = Instant::now();
        let token = ctx.token().map(|t| t.as_str().to_string());
        info!(operations = operations.len(), token = ?token, "Pipeline started");
        emit(
            self.telemetry,
            Level::INFO,
            "pipeline.started",
            serde_json::json!({ "operations": operations.len(), "token": token }),
        );

        self.fire_stage(InterceptorStage::FirstOperation, None, &mut ctx)
            .await;

        for operation in operations {
            self.step(operation, &mut ctx).await;
        }

        if !ctx.is_faulty() {
            self.fire_stage(InterceptorStage::LastOperation, None, &mut ctx)
                .await;
        }

        let rollback = if ctx.is_faulty() && self.options.force_rollback_on_fault {
            Some(
                RollbackCoordinator::new(self.telemetry)
                    .run(&self.executed, &mut ctx, self.cancel)
                    .await,
            )
        } else {
            None
        };

        let executed: Vec<String> = self
            .executed
            .iter()
            .map(|op| op.name().to_string())
            .collect();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

        info!(
            faulty = ctx.is_faulty(),
            locked = ctx.is_locked(),
            executed = executed.len(),
            duration_ms,
            "Pipeline completed"
        );
        emit(
            self.telemetry,
            if ctx.is_faulty() { Level::WARN } else { Level::INFO },
            "pipeline.completed",
            serde_json::json!({
                "duration_ms": duration_ms,
                "faulty": ctx.is_faulty(),
                "locked": ctx.is_locked(),
                "executed": executed,
                "rolled_back": rollback.as_ref().map_or(0, |r| r.attempted),
                "token": token,
            }),
        );

        RunOutcome {
            context: ctx,
            executed,
            failure: self.pending,
            rollback,
        }
    }

    /// One fold step: gates, surrounding interceptors, the operation itself,
    /// one-shot stages and history.
    async fn step(&mut self, operation: &Arc<dyn Operation>, ctx: &mut ExecutionContext) {
        if self.cancel.is_cancelled() {
            self.record_cancellation(ctx).await;
            self.skip(operation.as_ref(), SkipReason::Cancelled);
            return;
        }

        let was_faulty = ctx.is_faulty();
        if let Some(reason) = self.gate(operation.as_ref(), ctx) {
            self.skip(operation.as_ref(), reason);
            return;
        }

        let name = operation.name();
        self.fire_custom(false, name, ctx).await;
        self.fire_stage(InterceptorStage::PreOperation, Some(name), ctx)
            .await;

        // A pre-interceptor may have locked or faulted the context.
        let ran = match self.gate(operation.as_ref(), ctx) {
            Some(reason) => {
                self.skip(operation.as_ref(), reason);
                false
            }
            None => {
                self.invoke(operation.as_ref(), None, ctx).await;
                true
            }
        };

        self.fire_stage(InterceptorStage::PostOperation, Some(name), ctx)
            .await;
        self.fire_custom(true, name, ctx).await;

        if ctx.is_locked() {
            self.fire_one_shot(InterceptorStage::Locked, ctx).await;
        }
        if ctx.is_faulty() {
            self.fire_one_shot(InterceptorStage::Faulty, ctx).await;
        }

        if ran && !was_faulty {
            self.executed.push(Arc::clone(operation));
        }
    }

    fn gate(&self, operation: &dyn Operation, ctx: &ExecutionContext) -> Option<SkipReason> {
        if ctx.is_faulty() && self.options.break_on_fault {
            return Some(SkipReason::Faulty);
        }
        if ctx.is_locked() && !operation.is_required() {
            return Some(SkipReason::Locked);
        }
        None
    }

    fn skip(&self, operation: &dyn Operation, reason: SkipReason) {
        debug!(operation = %operation.name(), reason = reason.as_str(), "Skipping operation");
        emit(
            self.telemetry,
            Level::DEBUG,
            "operation.skipped",
            serde_json::json!({ "operation": operation.name(), "reason": reason.as_str() }),
        );
    }

    async fn record_cancellation(&mut self, ctx: &mut ExecutionContext) {
        if self.cancel_recorded {
            return;
        }
        self.cancel_recorded = true;

        let reason = self
            .cancel
            .reason()
            .unwrap_or_else(|| "cancelled".to_string());
        warn!(reason = %reason, "Pipeline cancelled");
        ctx.add_message(Message::error(format!("Pipeline cancelled: {reason}")));
        self.fire_one_shot(InterceptorStage::Faulty, ctx).await;
    }

    /// Fires a repeating stage: event handlers first, then operations.
    async fn fire_stage(
        &mut self,
        stage: InterceptorStage,
        operation: Option<&str>,
        ctx: &mut ExecutionContext,
    ) {
        let registry = self.interceptors.registry();
        let mut args = EventArgs::stage(stage);
        if let Some(operation) = operation {
            args = args.with_operation(operation);
        }

        self.notify(registry.events(stage), &args, ctx).await;
        self.run_direct(registry.operations(stage), stage, ctx)
            .await;
    }

    /// Fires the predicate-gated interceptors around an operation.
    ///
    /// Each predicate sees the context as left by the interceptors before it.
    async fn fire_custom(&mut self, is_post: bool, operation: &str, ctx: &mut ExecutionContext) {
        let registry = self.interceptors.registry();
        let stage = if is_post {
            InterceptorStage::PostOperation
        } else {
            InterceptorStage::PreOperation
        };
        let args = EventArgs::stage(stage).with_operation(operation).gated();

        for gated in registry.custom_events(is_post) {
            if self.predicate_holds(gated, gated.target.name(), ctx) {
                self.notify(std::slice::from_ref(&gated.target), &args, ctx)
                    .await;
            }
        }
        for gated in registry.custom_operations(is_post) {
            if self.predicate_holds(gated, gated.target.name(), ctx) {
                self.run_direct(std::slice::from_ref(&gated.target), stage, ctx)
                    .await;
            }
        }
    }

    /// Evaluates an interceptor predicate. A panicking predicate is recorded
    /// as a failure of its interceptor and counts as not matched.
    fn predicate_holds<T>(
        &mut self,
        gated: &Gated<T>,
        interceptor: &str,
        ctx: &mut ExecutionContext,
    ) -> bool {
        match std::panic::catch_unwind(AssertUnwindSafe(|| gated.matches(ctx))) {
            Ok(matched) => matched,
            Err(panic) => {
                let failure = OperationFailure::from_panic(interceptor, panic.as_ref());
                warn!(
                    interceptor = %interceptor,
                    error = %failure.message,
                    "Interceptor predicate panicked"
                );
                self.record_failure(ctx, failure);
                false
            }
        }
    }

    /// Fires `Locked` or `Faulty` if it has not fired yet in this run.
    async fn fire_one_shot(&mut self, stage: InterceptorStage, ctx: &mut ExecutionContext) {
        let Some(one_shot) = self.interceptors.take_one_shot(stage) else {
            return;
        };
        if one_shot.events.is_empty() && one_shot.operations.is_empty() {
            return;
        }

        info!(stage = %stage, "Firing one-shot interceptors");
        self.notify(one_shot.events, &EventArgs::stage(stage), ctx)
            .await;
        self.run_direct(one_shot.operations, stage, ctx)
            .await;
    }

    async fn notify(
        &mut self,
        handlers: &[Arc<dyn EventHandler>],
        args: &EventArgs,
        ctx: &mut ExecutionContext,
    ) {
        if handlers.is_empty() {
            return;
        }
        let failures = self.dispatcher.dispatch(handlers, ctx, args).await;
        for failure in failures {
            self.record_failure(ctx, failure);
        }
    }

    /// Runs interceptor operations without firing further interceptors or
    /// touching the executed history.
    ///
    /// `Locked` and `Faulty` interceptors skip the gates.
    async fn run_direct(
        &mut self,
        operations: &[Arc<dyn Operation>],
        stage: InterceptorStage,
        ctx: &mut ExecutionContext,
    ) {
        for operation in operations {
            if !stage.bypasses_gates() {
                if let Some(reason) = self.gate(operation.as_ref(), ctx) {
                    self.skip(operation.as_ref(), reason);
                    continue;
                }
            }
            self.invoke(operation.as_ref(), Some(stage), ctx).await;
        }
    }

    /// Executes one operation or interceptor, capturing errors and panics.
    async fn invoke(
        &mut self,
        operation: &dyn Operation,
        stage: Option<InterceptorStage>,
        ctx: &mut ExecutionContext,
    ) {
        let timer = SpanTimer::start(operation.name());
        let mut payload = timer.start_payload();
        if let Some(stage) = stage {
            payload["stage"] = serde_json::json!(stage.to_string());
        }
        debug!(operation = %operation.name(), stage = ?stage, "Executing operation");
        emit(self.telemetry, Level::DEBUG, "operation.started", payload);

        let outcome = AssertUnwindSafe(operation.execute(ctx, self.cancel))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => {
                emit(
                    self.telemetry,
                    Level::DEBUG,
                    "operation.completed",
                    timer.finish(None),
                );
                return;
            }
            Ok(Err(err)) => OperationFailure::from_error(operation.name(), &err),
            Err(panic) => OperationFailure::from_panic(operation.name(), panic.as_ref()),
        };

        warn!(
            operation = %operation.name(),
            error = %failure.message,
            panicked = failure.panicked,
            "Operation failed"
        );
        emit(
            self.telemetry,
            Level::ERROR,
            "operation.failed",
            timer.finish(Some(&failure.message)),
        );
        self.record_failure(ctx, failure);
    }

    /// Records a failure as an error message, the last error and the
    /// failure to propagate.
    fn record_failure(&mut self, ctx: &mut ExecutionContext, failure: OperationFailure) {
        ctx.add_message(
            Message::error(failure.message.clone()).with_operation(failure.operation.clone()),
        );
        ctx.stash(keys::LAST_ERROR, failure.clone());
        self.pending = Some(failure);
    }
}
