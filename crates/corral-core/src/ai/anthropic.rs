//! Anthropic Messages API provider.
//!
//! Streams SSE responses from `/v1/messages` and normalises transport
//! failures into the [`ProviderError`] taxonomy. The initial request is
//! retried with exponential backoff; once the stream is established,
//! failures surface as `StreamPart::Error`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::ai::provider::{
    Completion, CompletionRequest, Provider, ProviderError, RetryCallback,
};
use crate::ai::retry::{with_retry, RetryConfig};
use crate::ai::streaming::StreamPart;
use crate::ai::types::{AiToolCall, Content, StopReason, Usage};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

/// Provider implementation for the Anthropic Messages API.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    retry: RetryConfig,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn build_body(&self, request: &CompletionRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": request.messages,
        });

        if !request.system.is_empty() {
            if request.enable_caching {
                body["system"] = json!([{
                    "type": "text",
                    "text": request.system,
                    "cache_control": {"type": "ephemeral"}
                }]);
            } else {
                body["system"] = Value::String(request.system.clone());
            }
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }

        if stream {
            body["stream"] = Value::Bool(true);
        }

        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        error!(status = status.as_u16(), "Anthropic API error: {}", message);

        Err(classify_status(status.as_u16(), message, retry_after))
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else {
        ProviderError::Connection(err.to_string())
    }
}

fn classify_status(status: u16, message: String, retry_after: Option<Duration>) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(message),
        429 => ProviderError::RateLimit {
            message,
            retry_after,
        },
        400..=499 => ProviderError::BadRequest(message),
        _ => ProviderError::Internal { status, message },
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn stream(
        &self,
        request: CompletionRequest,
        on_retry: Option<RetryCallback>,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, ProviderError> {
        let body = self.build_body(&request, true);
        info!(
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "starting Anthropic stream"
        );

        let response = with_retry(self.retry, on_retry, || self.send(&body)).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut parser = SseAccumulator::default();
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tx.send(StreamPart::Error {
                            error: classify_reqwest_error(e),
                        });
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim_end_matches('\r').to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    let Ok(event) = serde_json::from_str::<Value>(data) else {
                        debug!("skipping unparseable SSE data line");
                        continue;
                    };
                    for part in parser.handle_event(&event) {
                        if tx.send(part).is_err() {
                            return;
                        }
                    }
                }
            }

            // Stream closed without message_stop: report what we know.
            if !parser.finished {
                let _ = tx.send(StreamPart::Error {
                    error: ProviderError::Connection("stream closed before completion".into()),
                });
            }
        });

        Ok(rx)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<Completion, ProviderError> {
        let body = self.build_body(&request, false);
        let response = with_retry(self.retry, None, || self.send(&body)).await?;

        let value: Value = response.json().await.map_err(|e| ProviderError::Internal {
            status: 0,
            message: format!("invalid response body: {}", e),
        })?;

        let content: Vec<Content> = value
            .get("content")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ProviderError::Internal {
                status: 0,
                message: format!("invalid content blocks: {}", e),
            })?
            .unwrap_or_default();

        let stop_reason = value
            .get("stop_reason")
            .and_then(|s| s.as_str())
            .map(StopReason::from_wire)
            .unwrap_or(StopReason::EndTurn);

        Ok(Completion {
            content,
            stop_reason,
            usage: parse_usage(value.get("usage")),
        })
    }
}

fn parse_usage(value: Option<&Value>) -> Usage {
    let Some(value) = value else {
        return Usage::default();
    };
    Usage {
        input_tokens: value
            .get("input_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
        output_tokens: value
            .get("output_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0),
    }
}

/// Accumulates SSE events into [`StreamPart`]s.
///
/// Tool-call arguments arrive as `input_json_delta` fragments keyed by
/// content-block index; they are buffered until `content_block_stop`.
#[derive(Default)]
struct SseAccumulator {
    tool_blocks: HashMap<u64, (String, String, String)>,
    usage: Usage,
    stop_reason: Option<StopReason>,
    finished: bool,
}

impl SseAccumulator {
    fn handle_event(&mut self, event: &Value) -> Vec<StreamPart> {
        let event_type = event.get("type").and_then(|t| t.as_str()).unwrap_or("");

        match event_type {
            "message_start" => {
                self.usage = parse_usage(event.pointer("/message/usage"));
                Vec::new()
            }
            "content_block_start" => {
                let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let Some(block) = event.get("content_block") else {
                    return Vec::new();
                };
                if block.get("type").and_then(|t| t.as_str()) == Some("tool_use") {
                    let id = block
                        .get("id")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let name = block
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    self.tool_blocks
                        .insert(index, (id.clone(), name.clone(), String::new()));
                    return vec![StreamPart::ToolCallStart { id, name }];
                }
                Vec::new()
            }
            "content_block_delta" => {
                let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let Some(delta) = event.get("delta") else {
                    return Vec::new();
                };
                match delta.get("type").and_then(|t| t.as_str()) {
                    Some("text_delta") => {
                        let text = delta.get("text").and_then(|t| t.as_str()).unwrap_or("");
                        vec![StreamPart::TextDelta {
                            delta: text.to_string(),
                        }]
                    }
                    Some("input_json_delta") => {
                        if let Some((_, _, partial)) = self.tool_blocks.get_mut(&index) {
                            partial.push_str(
                                delta
                                    .get("partial_json")
                                    .and_then(|p| p.as_str())
                                    .unwrap_or(""),
                            );
                        }
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            "content_block_stop" => {
                let index = event.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let Some((id, name, partial)) = self.tool_blocks.remove(&index) else {
                    return Vec::new();
                };
                let arguments = if partial.is_empty() {
                    json!({})
                } else {
                    serde_json::from_str(&partial).unwrap_or_else(|e| {
                        warn!(tool = %name, "invalid tool arguments JSON: {}", e);
                        json!({})
                    })
                };
                vec![StreamPart::ToolCallComplete {
                    call: AiToolCall {
                        id,
                        name,
                        arguments,
                    },
                }]
            }
            "message_delta" => {
                if let Some(reason) = event
                    .pointer("/delta/stop_reason")
                    .and_then(|s| s.as_str())
                {
                    self.stop_reason = Some(StopReason::from_wire(reason));
                }
                if let Some(output) = event
                    .pointer("/usage/output_tokens")
                    .and_then(|v| v.as_u64())
                {
                    self.usage.output_tokens = output;
                }
                Vec::new()
            }
            "message_stop" => {
                self.finished = true;
                vec![StreamPart::Finish {
                    stop_reason: self.stop_reason.clone().unwrap_or(StopReason::EndTurn),
                    usage: self.usage,
                }]
            }
            "error" => {
                self.finished = true;
                let message = event
                    .pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown stream error")
                    .to_string();
                vec![StreamPart::Error {
                    error: ProviderError::Internal {
                        status: 0,
                        message,
                    },
                }]
            }
            _ => Vec::new(),
        }
    }
}
