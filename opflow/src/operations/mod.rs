//! Operation trait and implementations.
//!
//! Operations are the units of work a pipeline folds over its context. The
//! same trait is used for interceptors: an interceptor is just an operation
//! attached to a stage boundary instead of the main list.

mod resolver;

pub use resolver::{FactoryResolver, OperationFactory, OperationResolver};

use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Trait for pipeline operations.
#[async_trait]
pub trait Operation: Send + Sync + Debug {
    /// Returns the name of the operation, used in diagnostics and telemetry.
    fn name(&self) -> &str;

    /// Required operations still execute after the context was locked.
    fn is_required(&self) -> bool {
        false
    }

    /// Executes the operation.
    ///
    /// Returning an error (or panicking) marks the context faulty; the run
    /// loop records the failure and continues its fold.
    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()>;

    /// Compensates the effects of a previous `execute` on the same run.
    ///
    /// Errors are logged by the rollback coordinator and never re-raised.
    async fn rollback(
        &self,
        _ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

type SyncStep = dyn Fn(&mut ExecutionContext) -> anyhow::Result<()> + Send + Sync;

/// A closure-based operation with an optional compensating closure.
pub struct FnOperation {
    name: String,
    required: bool,
    execute: Box<SyncStep>,
    rollback: Option<Box<SyncStep>>,
}

impl FnOperation {
    /// Creates a new closure-based operation.
    pub fn new<F>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(&mut ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            required: false,
            execute: Box::new(execute),
            rollback: None,
        }
    }

    /// Sets the compensating closure.
    #[must_use]
    pub fn with_rollback<F>(mut self, rollback: F) -> Self
    where
        F: Fn(&mut ExecutionContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.rollback = Some(Box::new(rollback));
        self
    }

    /// Marks the operation as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl Debug for FnOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnOperation")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("has_rollback", &self.rollback.is_some())
            .finish()
    }
}

#[async_trait]
impl Operation for FnOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        (self.execute)(ctx)
    }

    async fn rollback(
        &self,
        ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        match self.rollback {
            Some(ref rollback) => rollback(ctx),
            None => Ok(()),
        }
    }
}

/// Wraps any operation and marks it as required.
#[derive(Debug)]
pub struct Required<O> {
    inner: O,
}

impl<O: Operation> Required<O> {
    /// Wraps an operation.
    pub fn new(inner: O) -> Self {
        Self { inner }
    }

    /// Returns the wrapped operation.
    pub fn into_inner(self) -> O {
        self.inner
    }
}

#[async_trait]
impl<O: Operation> Operation for Required<O> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn is_required(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.inner.execute(ctx, cancel).await
    }

    async fn rollback(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.inner.rollback(ctx, cancel).await
    }
}

#[async_trait]
impl<O: Operation + ?Sized> Operation for Arc<O> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_required(&self) -> bool {
        (**self).is_required()
    }

    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        (**self).execute(ctx, cancel).await
    }

    async fn rollback(
        &self,
        ctx: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        (**self).rollback(ctx, cancel).await
    }
}

/// A no-op operation.
#[derive(Debug, Clone, Default)]
pub struct NoOpOperation {
    name: String,
}

impl NoOpOperation {
    /// Creates a new no-op operation.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Operation for NoOpOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ContentExt, ContentKey};

    const HITS: ContentKey<u32> = ContentKey::new("hits");

    #[tokio::test]
    async fn test_fn_operation_executes_and_rolls_back() {
        let op = FnOperation::new("count", |ctx| {
            let hits = ctx.fetch(HITS).copied().unwrap_or(0);
            ctx.stash(HITS, hits + 1);
            Ok(())
        })
        .with_rollback(|ctx| {
            ctx.content_mut().remove(HITS);
            Ok(())
        });

        assert_eq!(op.name(), "count");
        assert!(!op.is_required());

        let mut ctx = ExecutionContext::new();
        let cancel = CancellationToken::new();
        op.execute(&mut ctx, &cancel).await.unwrap();
        op.execute(&mut ctx, &cancel).await.unwrap();
        assert_eq!(ctx.fetch(HITS), Some(&2));

        op.rollback(&mut ctx, &cancel).await.unwrap();
        assert!(ctx.fetch(HITS).is_none());
    }

    #[tokio::test]
    async fn test_fn_operation_error_passes_through() {
        let op = FnOperation::new("fail", |_ctx| anyhow::bail!("nope"));
        let mut ctx = ExecutionContext::new();

        let err = op
            .execute(&mut ctx, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");
    }

    #[tokio::test]
    async fn test_required_wrapper() {
        let op = Required::new(NoOpOperation::new("audit"));
        assert!(op.is_required());
        assert_eq!(op.name(), "audit");

        let mut ctx = ExecutionContext::new();
        op.execute(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert_eq!(op.into_inner().name(), "audit");
    }

    #[tokio::test]
    async fn test_arc_operation_delegates() {
        let op: Arc<dyn Operation> = Arc::new(FnOperation::new("req", |_| Ok(())).required());
        assert!(op.is_required());
        assert_eq!(Operation::name(&op), "req");
    }

    #[test]
    fn test_fn_operation_outside_runtime() {
        let op = FnOperation::new("lock", |ctx| {
            ctx.lock();
            Ok(())
        });
        let mut ctx = ExecutionContext::new();

        tokio_test::block_on(op.execute(&mut ctx, &CancellationToken::new())).unwrap();
        assert!(ctx.is_locked());
    }

    #[tokio::test]
    async fn test_default_rollback_is_noop() {
        let op = NoOpOperation::new("noop");
        let mut ctx = ExecutionContext::new();
        op.rollback(&mut ctx, &CancellationToken::new()).await.unwrap();
        assert!(ctx.messages().is_empty());
    }
}
