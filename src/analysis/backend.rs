//! Completion backend abstraction.

use async_trait::async_trait;

use crate::error::Error;

/// One chat-completion call: a system and a user message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
}

/// Result of a single completion attempt.
#[derive(Debug)]
pub enum CallOutcome {
    /// The message content returned by the model
    Success(String),
    /// A transient failure worth another attempt
    Retryable(Error),
    /// A failure that will not go away on retry
    Terminal(Error),
}

/// A chat-completion endpoint.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> CallOutcome;
}

#[async_trait]
impl<T: CompletionBackend + ?Sized> CompletionBackend for std::sync::Arc<T> {
    async fn complete(&self, request: &CompletionRequest) -> CallOutcome {
        (**self).complete(request).await
    }
}

#[async_trait]
impl<T: CompletionBackend + ?Sized> CompletionBackend for Box<T> {
    async fn complete(&self, request: &CompletionRequest) -> CallOutcome {
        (**self).complete(request).await
    }
}
