//! The mutable context passed through every step of a run.

use super::{keys, ContentBag, ContentExt, Message, Severity};
use crate::errors::{ContextError, OperationFailure};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque correlation identifier for a run.
///
/// Read by downstream caching and telemetry collaborators; the engine never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(String);

impl CorrelationToken {
    /// Creates a token from any string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Generates a random (UUID v4) token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Uuid> for CorrelationToken {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for CorrelationToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CorrelationToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// State shared by all operations and interceptors of a single run.
///
/// A context is owned by exactly one run at a time; the run loop hands out
/// `&mut` access to each step in turn.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    locked: bool,
    messages: Vec<Message>,
    error_count: usize,
    token: Option<CorrelationToken>,
    content: ContentBag,
}

impl ExecutionContext {
    /// Creates a new, empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the correlation token on a fresh context.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<CorrelationToken>) -> Self {
        if self.token.is_none() {
            self.token = Some(token.into());
        }
        self
    }

    /// Locks the context: from now on only required operations execute.
    pub fn lock(&mut self) {
        self.locked = true;
    }

    /// Returns true once an operation has locked the context.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Returns true once any error-severity message was recorded.
    #[must_use]
    pub fn is_faulty(&self) -> bool {
        self.error_count > 0
    }

    /// Appends a diagnostic message.
    pub fn add_message(&mut self, message: Message) {
        if message.severity == Severity::Error {
            self.error_count += 1;
        }
        self.messages.push(message);
    }

    /// Appends an info message.
    pub fn info(&mut self, text: impl Into<String>) {
        self.add_message(Message::info(text));
    }

    /// Appends a warning message.
    pub fn warn(&mut self, text: impl Into<String>) {
        self.add_message(Message::warning(text));
    }

    /// Appends an error message, making the context faulty.
    pub fn error(&mut self, text: impl Into<String>) {
        self.add_message(Message::error(text));
    }

    /// Returns all messages in recording order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the error-severity messages.
    pub fn errors(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(|m| m.is_error())
    }

    /// Returns the correlation token, if set.
    #[must_use]
    pub fn token(&self) -> Option<&CorrelationToken> {
        self.token.as_ref()
    }

    /// Sets the correlation token.
    ///
    /// # Errors
    ///
    /// Returns `ContextError::TokenAlreadySet` if a token was already
    /// assigned; the existing token is kept.
    pub fn set_token(&mut self, token: impl Into<CorrelationToken>) -> Result<(), ContextError> {
        if let Some(ref existing) = self.token {
            return Err(ContextError::TokenAlreadySet {
                existing: existing.to_string(),
            });
        }
        self.token = Some(token.into());
        Ok(())
    }

    /// Returns the correlation token, generating one if none was set.
    pub fn ensure_token(&mut self) -> &CorrelationToken {
        self.token.get_or_insert_with(CorrelationToken::generate)
    }

    /// Returns the most recent captured failure, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&OperationFailure> {
        self.content.get(keys::LAST_ERROR)
    }
}

impl ContentExt for ExecutionContext {
    fn content(&self) -> &ContentBag {
        &self.content
    }

    fn content_mut(&mut self) -> &mut ContentBag {
        &mut self.content
    }
}
