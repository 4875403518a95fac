//! LLM provider contract.
//!
//! A `Provider` turns a prepared request into a stream of [`StreamPart`]s
//! (or a single non-streaming [`Completion`], used by the compactor).
//! Implementations normalise transport failures into [`ProviderError`] so
//! the agent can decide what is retryable and what rewinds the
//! conversation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::ai::streaming::StreamPart;
use crate::ai::types::{AiTool, Content, ModelMessage, StopReason, Usage};

/// Error taxonomy every provider normalises to.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Invalid or expired credentials (HTTP 401/403). Never retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network-level failure before or during the response.
    #[error("connection failed: {0}")]
    Connection(String),

    /// HTTP 429. `retry_after` carries the server hint when present.
    #[error("rate limited: {message}")]
    RateLimit {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The request or stream timed out.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// HTTP 4xx other than auth/rate-limit. Never retried.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// HTTP 5xx or a malformed provider response.
    #[error("provider error ({status}): {message}")]
    Internal { status: u16, message: String },
}

impl ProviderError {
    /// Whether the agent's retry policy may re-attempt the call.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Connection(_)
                | ProviderError::RateLimit { .. }
                | ProviderError::Timeout(_)
                | ProviderError::Internal { .. }
        )
    }

    /// Server-provided delay hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Stable label used in events and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth(_) => "auth",
            ProviderError::Connection(_) => "connection",
            ProviderError::RateLimit { .. } => "rate_limit",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::BadRequest(_) => "bad_request",
            ProviderError::Internal { .. } => "internal",
        }
    }
}

/// A fully prepared model request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ModelMessage>,
    pub system: String,
    pub tools: Vec<AiTool>,
    pub max_tokens: u32,
    /// Hint to reuse the provider's system-prompt cache.
    pub enable_caching: bool,
}

/// Result of a non-streaming completion.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: Vec<Content>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

impl Completion {
    /// Concatenated text blocks of the completion.
    pub fn text(&self) -> String {
        let mut combined = String::new();
        for block in &self.content {
            if let Content::Text { text } = block {
                combined.push_str(text);
            }
        }
        combined
    }
}

/// Callback invoked on each retry attempt: `(attempt, error)`.
pub type RetryCallback = Arc<dyn Fn(usize, &ProviderError) + Send + Sync>;

/// Streaming and non-streaming completion against one model family.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Start a streaming completion.
    ///
    /// The returned channel yields [`StreamPart`]s and closes after
    /// `Finish` (or `Error`). Transport-level retries happen before the
    /// first part is produced; each attempt is reported via `on_retry`.
    async fn stream(
        &self,
        request: CompletionRequest,
        on_retry: Option<RetryCallback>,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, ProviderError>;

    /// Non-streaming completion. Used by the compactor for summarisation.
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError>;

    /// Offline token estimate for a request.
    ///
    /// The default estimates from the serialised request size; providers
    /// with a real counting endpoint may override.
    fn count_tokens(&self, request: &CompletionRequest) -> usize {
        let mut chars = request.system.len();
        for message in &request.messages {
            chars += serde_json::to_string(&message.content)
                .map(|s| s.len())
                .unwrap_or(0);
        }
        for tool in &request.tools {
            chars += tool.description.len() + tool.input_schema.to_string().len();
        }
        // Rough heuristic: ~4 chars per token for mixed prose and JSON.
        chars / 4
    }
}
