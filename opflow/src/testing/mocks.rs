//! Mock operations and handlers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::context::ExecutionContext;
use crate::events::{EventArgs, EventHandler};
use crate::operations::Operation;

/// A shared, append-only log of what ran, in order.
///
/// Operations append their name on execute and `<name>.rollback` on
/// rollback; handlers append `<name>@<stage>`.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Creates an empty journal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().push(entry.into());
    }

    /// Returns a copy of all entries.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Returns how many entries equal `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        self.entries.lock().iter().filter(|e| *e == entry).count()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Clears all entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

/// An operation that records its execution and rollback in a journal.
#[derive(Debug)]
pub struct RecordingOperation {
    name: String,
    journal: Journal,
    required: bool,
    calls: AtomicUsize,
}

impl RecordingOperation {
    /// Creates a new recording operation.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            required: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Marks the operation as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Returns how many times `execute` was called.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Operation for RecordingOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_required(&self) -> bool {
        self.required
    }

    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.journal.push(self.name.clone());
        Ok(())
    }

    async fn rollback(
        &self,
        _ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.journal.push(format!("{}.rollback", self.name));
        Ok(())
    }
}

/// An operation that always fails, or panics.
///
/// Its rollback succeeds unless configured otherwise.
#[derive(Debug)]
pub struct FailingOperation {
    name: String,
    error: String,
    journal: Journal,
    panics: bool,
    rollback_error: Option<String>,
}

impl FailingOperation {
    /// Creates an operation whose `execute` returns `error`.
    #[must_use]
    pub fn new(name: impl Into<String>, error: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            journal: journal.clone(),
            panics: false,
            rollback_error: None,
        }
    }

    /// Makes `execute` panic with the error text instead of returning it.
    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    /// Makes `rollback` fail with `error`.
    #[must_use]
    pub fn with_failing_rollback(mut self, error: impl Into<String>) -> Self {
        self.rollback_error = Some(error.into());
        self
    }
}

#[async_trait]
impl Operation for FailingOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        _ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.journal.push(self.name.clone());
        if self.panics {
            panic!("{}", self.error);
        }
        anyhow::bail!("{}", self.error)
    }

    async fn rollback(
        &self,
        _ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.journal.push(format!("{}.rollback", self.name));
        match &self.rollback_error {
            Some(error) => anyhow::bail!("{error}"),
            None => Ok(()),
        }
    }
}

/// An operation that locks the context.
#[derive(Debug)]
pub struct LockingOperation {
    name: String,
    journal: Journal,
}

impl LockingOperation {
    /// Creates a new locking operation.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
        }
    }
}

#[async_trait]
impl Operation for LockingOperation {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.journal.push(self.name.clone());
        ctx.lock();
        Ok(())
    }

    async fn rollback(
        &self,
        _ctx: &mut ExecutionContext,
        _cancel: &CancellationToken,
    ) -> anyhow::Result<()> {
        self.journal.push(format!("{}.rollback", self.name));
        Ok(())
    }
}

/// An event handler that records every notification, optionally failing.
#[derive(Debug)]
pub struct RecordingHandler {
    name: String,
    journal: Journal,
    error: Option<String>,
}

impl RecordingHandler {
    /// Creates a new recording handler.
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            journal: journal.clone(),
            error: None,
        }
    }

    /// Makes the handler return `error` after recording.
    #[must_use]
    pub fn failing(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, _ctx: &ExecutionContext, args: &EventArgs) -> anyhow::Result<()> {
        self.journal.push(format!("{}@{}", self.name, args.stage));
        match &self.error {
            Some(error) => anyhow::bail!("{error}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::InterceptorStage;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_recording_operation() {
        let journal = Journal::new();
        let op = RecordingOperation::new("reserve", &journal).required();
        let mut ctx = ExecutionContext::new();
        let cancel = CancellationToken::new();

        op.execute(&mut ctx, &cancel).await.unwrap();
        op.rollback(&mut ctx, &cancel).await.unwrap();

        assert!(op.is_required());
        assert_eq!(op.call_count(), 1);
        assert_eq!(journal.entries(), vec!["reserve", "reserve.rollback"]);
    }

    #[tokio::test]
    async fn test_failing_operation() {
        let journal = Journal::new();
        let op = FailingOperation::new("charge", "card declined", &journal)
            .with_failing_rollback("refund failed");
        let mut ctx = ExecutionContext::new();
        let cancel = CancellationToken::new();

        let err = op.execute(&mut ctx, &cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "card declined");
        let err = op.rollback(&mut ctx, &cancel).await.unwrap_err();
        assert_eq!(err.to_string(), "refund failed");
        assert_eq!(journal.count("charge"), 1);
    }

    #[tokio::test]
    async fn test_locking_operation() {
        let journal = Journal::new();
        let mut ctx = ExecutionContext::new();

        LockingOperation::new("gate", &journal)
            .execute(&mut ctx, &CancellationToken::new())
            .await
            .unwrap();

        assert!(ctx.is_locked());
        assert_eq!(journal.entries(), vec!["gate"]);
    }

    #[tokio::test]
    async fn test_recording_handler() {
        let journal = Journal::new();
        let handler = RecordingHandler::new("audit", &journal).failing("audit offline");
        let ctx = ExecutionContext::new();

        let err = handler
            .handle(&ctx, &EventArgs::stage(InterceptorStage::LastOperation))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "audit offline");
        assert_eq!(journal.entries(), vec!["audit@last_operation"]);
    }

    #[test]
    fn test_journal_clear() {
        let journal = Journal::new();
        journal.push("a");
        assert_eq!(journal.len(), 1);
        journal.clear();
        assert!(journal.is_empty());
    }
}
