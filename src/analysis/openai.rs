//! OpenAI-compatible chat-completions backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;

use super::backend::{CallOutcome, CompletionBackend, CompletionRequest};

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 300;

/// Connection settings for [`OpenAiBackend`].
#[derive(Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl std::fmt::Debug for OpenAiSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Client for `{base_url}/chat/completions` in JSON mode.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    settings: OpenAiSettings,
}

impl OpenAiBackend {
    pub fn new(settings: OpenAiSettings) -> crate::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn endpoint_chat_completions(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatCompletionsRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Clone, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionsResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Whether an HTTP status is worth retrying.
fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Pull the message content out of a chat-completions envelope.
fn extract_content(body: &str) -> Result<String, Error> {
    let parsed: ChatCompletionsResponse = serde_json::from_str(body)
        .map_err(|e| Error::MalformedResponse(format!("not a chat completion: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::MalformedResponse("completion has no message content".to_string()))
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, request: &CompletionRequest) -> CallOutcome {
        let body = ChatCompletionsRequest {
            model: &self.settings.model,
            messages: [
                Message {
                    role: "system",
                    content: &request.system,
                },
                Message {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.settings.temperature,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let resp = match self
            .client
            .post(self.endpoint_chat_completions())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let message = if e.is_timeout() {
                    "request timed out".to_string()
                } else {
                    e.to_string()
                };
                return CallOutcome::Retryable(Error::Upstream {
                    status: None,
                    message,
                });
            }
        };

        let status = resp.status().as_u16();
        let text = match resp.text().await {
            Ok(text) => text,
            Err(e) => {
                return CallOutcome::Retryable(Error::Upstream {
                    status: Some(status),
                    message: e.to_string(),
                })
            }
        };

        if is_retryable_status(status) {
            return CallOutcome::Retryable(Error::Upstream {
                status: Some(status),
                message: truncate(&text),
            });
        }
        if !(200..300).contains(&status) {
            return CallOutcome::Terminal(Error::Rejected {
                status,
                message: truncate(&text),
            });
        }

        match extract_content(&text) {
            Ok(content) => CallOutcome::Success(content),
            Err(e) => CallOutcome::Terminal(e),
        }
    }
}
