//! Reverse-order compensation of executed operations.

use super::run_loop::emit;
use crate::cancellation::CancellationToken;
use crate::context::{ExecutionContext, Message};
use crate::errors::OperationFailure;
use crate::events::TelemetrySink;
use crate::observability::SpanTimer;
use crate::operations::Operation;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{info, warn, Level};

/// Outcome of a rollback pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackReport {
    /// Number of rollbacks invoked.
    pub attempted: usize,
    /// Rollbacks that returned an error or panicked, in invocation order.
    pub failed: Vec<OperationFailure>,
}

impl RollbackReport {
    /// Returns true if every rollback succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Invokes `rollback` on executed operations, last executed first.
///
/// Each call is isolated: a failing rollback becomes a warning message on the
/// context and a `rollback.failed` record, and the remaining rollbacks still
/// run. Nothing here is ever fatal to the run.
pub struct RollbackCoordinator<'a> {
    telemetry: &'a dyn TelemetrySink,
}

impl<'a> RollbackCoordinator<'a> {
    /// Creates a coordinator reporting to `telemetry`.
    #[must_use]
    pub fn new(telemetry: &'a dyn TelemetrySink) -> Self {
        Self { telemetry }
    }

    /// Rolls back `executed` in reverse order.
    pub async fn run(
        &self,
        executed: &[Arc<dyn Operation>],
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> RollbackReport {
        let mut report = RollbackReport::default();
        if executed.is_empty() {
            return report;
        }

        info!(operations = executed.len(), "Rolling back executed operations");

        for operation in executed.iter().rev() {
            report.attempted += 1;
            if let Err(failure) = self.compensate(operation.as_ref(), ctx, cancel).await {
                report.failed.push(failure);
            }
        }

        if !report.is_clean() {
            warn!(
                attempted = report.attempted,
                failed = report.failed.len(),
                "Rollback finished with failures"
            );
        }
        report
    }

    async fn compensate(
        &self,
        operation: &dyn Operation,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), OperationFailure> {
        let timer = SpanTimer::start(operation.name());
        emit(self.telemetry, Level::INFO, "rollback.started", timer.start_payload());

        let outcome = AssertUnwindSafe(operation.rollback(ctx, cancel))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => {
                emit(self.telemetry, Level::INFO, "rollback.completed", timer.finish(None));
                return Ok(());
            }
            Ok(Err(err)) => OperationFailure::from_error(operation.name(), &err),
            Err(panic) => OperationFailure::from_panic(operation.name(), panic.as_ref()),
        };

        warn!(operation = %operation.name(), error = %failure.message, "Rollback failed");
        ctx.add_message(
            Message::warning(format!(
                "Rollback of '{}' failed: {}",
                failure.operation, failure.message
            ))
            .with_operation(operation.name()),
        );
        emit(
            self.telemetry,
            Level::WARN,
            "rollback.failed",
            timer.finish(Some(&failure.message)),
        );
        Err(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Severity;
    use crate::events::CollectingTelemetrySink;
    use crate::operations::FnOperation;
    use crate::testing::Journal;
    use pretty_assertions::assert_eq;

    fn compensating(name: &'static str, journal: &Journal) -> Arc<dyn Operation> {
        let journal = journal.clone();
        Arc::new(FnOperation::new(name, |_| Ok(())).with_rollback(move |_| {
            journal.push(format!("{name}.rollback"));
            Ok(())
        }))
    }

    #[tokio::test]
    async fn test_rollback_runs_in_reverse_order() {
        let journal = Journal::new();
        let executed = vec![
            compensating("reserve", &journal),
            compensating("charge", &journal),
        ];
        let sink = CollectingTelemetrySink::new();
        let mut ctx = ExecutionContext::new();

        let report = RollbackCoordinator::new(&sink)
            .run(&executed, &mut ctx, &CancellationToken::new())
            .await;

        assert_eq!(journal.entries(), vec!["charge.rollback", "reserve.rollback"]);
        assert_eq!(report.attempted, 2);
        assert!(report.is_clean());
        assert_eq!(sink.records_of_type("rollback.completed").len(), 2);
    }

    #[tokio::test]
    async fn test_failing_rollback_does_not_stop_the_rest() {
        let journal = Journal::new();
        let broken: Arc<dyn Operation> = Arc::new(
            FnOperation::new("charge", |_| Ok(()))
                .with_rollback(|_| anyhow::bail!("refund service down")),
        );
        let panicking: Arc<dyn Operation> = Arc::new(
            FnOperation::new("ship", |_| Ok(())).with_rollback(|_| panic!("label printer jammed")),
        );
        let executed = vec![compensating("reserve", &journal), broken, panicking];
        let sink = CollectingTelemetrySink::new();
        let mut ctx = ExecutionContext::new();

        let report = RollbackCoordinator::new(&sink)
            .run(&executed, &mut ctx, &CancellationToken::new())
            .await;

        assert_eq!(journal.entries(), vec!["reserve.rollback"]);
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].operation, "ship");
        assert!(report.failed[0].panicked);
        assert_eq!(report.failed[1].operation, "charge");

        let warnings: Vec<&str> = ctx
            .messages()
            .iter()
            .filter(|m| m.severity == Severity::Warning)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(
            warnings,
            vec![
                "Rollback of 'ship' failed: label printer jammed",
                "Rollback of 'charge' failed: refund service down",
            ]
        );
        // warnings never make the context faulty
        assert!(!ctx.is_faulty());
        assert_eq!(sink.records_of_type("rollback.failed").len(), 2);
    }

    #[tokio::test]
    async fn test_empty_history_is_a_noop() {
        let sink = CollectingTelemetrySink::new();
        let mut ctx = ExecutionContext::new();

        let report = RollbackCoordinator::new(&sink)
            .run(&[], &mut ctx, &CancellationToken::new())
            .await;

        assert_eq!(report, RollbackReport::default());
        assert!(sink.is_empty());
    }
}
