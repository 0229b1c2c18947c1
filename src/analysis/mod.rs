//! Chunk analysis with a language model.
//!
//! [`AnalysisClient`] turns the text of one chunk into [`AnnotationRequest`]s:
//! it builds the prompt, calls a [`CompletionBackend`] with retry and
//! exponential back-off, and parses the JSON answer.

mod backend;
mod openai;
mod prompt;
mod response;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::AnnotationRequest;

pub use backend::{CallOutcome, CompletionBackend, CompletionRequest};
pub use openai::{OpenAiBackend, OpenAiSettings};
pub use prompt::{build_system_prompt, build_user_prompt, AnalysisSettings, TermAggressiveness};
pub use response::parse_response;

/// How often, and how patiently, transient failures are retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles afterwards
    pub backoff: Duration,
}

impl RetryPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(1000),
        }
    }
}

/// Shared flag that stops new model requests once set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Analyzes chunks through a completion backend.
pub struct AnalysisClient<B> {
    backend: B,
    settings: AnalysisSettings,
    retry: RetryPolicy,
}

impl<B: CompletionBackend> AnalysisClient<B> {
    pub fn new(backend: B, settings: AnalysisSettings, retry: RetryPolicy) -> Self {
        Self {
            backend,
            settings,
            retry,
        }
    }

    pub fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    /// Analyze one chunk's text.
    ///
    /// Fails with [`crate::Error::Upstream`] once retries are exhausted,
    /// [`crate::Error::Rejected`] for non-retryable HTTP errors, and
    /// [`crate::Error::MalformedResponse`] when the answer cannot be parsed.
    /// Once `cancel` is set no further request is sent and the call fails
    /// with [`crate::Error::Cancelled`].
    pub async fn analyze(
        &self,
        chunk_text: &str,
        cancel: &CancelFlag,
    ) -> Result<Vec<AnnotationRequest>> {
        let request = CompletionRequest {
            system: build_system_prompt(&self.settings),
            user: build_user_prompt(&self.settings, chunk_text),
        };
        let content = self.complete_with_retry(&request, cancel).await?;
        parse_response(&content)
    }

    async fn complete_with_retry(
        &self,
        request: &CompletionRequest,
        cancel: &CancelFlag,
    ) -> Result<String> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match self.backend.complete(request).await {
                CallOutcome::Success(content) => return Ok(content),
                CallOutcome::Terminal(e) => return Err(e),
                CallOutcome::Retryable(e) => {
                    if attempt >= max_attempts {
                        return Err(e);
                    }
                    if cancel.is_cancelled() {
                        log::debug!("not retrying after interrupt: {}", e);
                        return Err(Error::Cancelled);
                    }
                    let delay = self.retry.delay_for(attempt);
                    log::warn!(
                        "Completion attempt {}/{} failed: {}; retrying in {:?}",
                        attempt,
                        max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
