//! Test support: a provider that plays back scripted turns.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use corral_core::ai::provider::{
    Completion, CompletionRequest, Provider, ProviderError, RetryCallback,
};
use corral_core::ai::streaming::StreamPart;
use corral_core::ai::types::{AiToolCall, Content, StopReason, Usage};

/// One scripted assistant turn.
#[allow(dead_code)]
pub enum ScriptedTurn {
    /// Stream `text` and finish with `end_turn`.
    Text(String),
    /// Stream `text` (may be empty), request `calls`, finish `tool_use`.
    ToolUse(String, Vec<AiToolCall>),
    /// Fail before any part is produced (connection-time error).
    FailEarly(ProviderError),
    /// Stream `text`, then fail mid-stream.
    FailMidStream(String, ProviderError),
}

/// Provider that pops one scripted turn per `stream` call.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    pub complete_calls: AtomicUsize,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

#[allow(dead_code)]
impl ScriptedProvider {
    pub fn new(turns: Vec<ScriptedTurn>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            complete_calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn captured_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value) -> AiToolCall {
    AiToolCall {
        id: id.into(),
        name: name.into(),
        arguments,
    }
}

const TURN_USAGE: Usage = Usage {
    input_tokens: 100,
    output_tokens: 20,
};

#[async_trait]
impl Provider for ScriptedProvider {
    async fn stream(
        &self,
        request: CompletionRequest,
        _on_retry: Option<RetryCallback>,
    ) -> Result<mpsc::UnboundedReceiver<StreamPart>, ProviderError> {
        self.requests.lock().unwrap().push(request);

        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider script exhausted");

        let (tx, rx) = mpsc::unbounded_channel();
        match turn {
            ScriptedTurn::FailEarly(error) => return Err(error),
            ScriptedTurn::Text(text) => {
                // Two deltas so callers see real streaming.
                let mid = text.len() / 2;
                for chunk in [&text[..mid], &text[mid..]] {
                    if !chunk.is_empty() {
                        let _ = tx.send(StreamPart::TextDelta {
                            delta: chunk.to_string(),
                        });
                    }
                }
                let _ = tx.send(StreamPart::Finish {
                    stop_reason: StopReason::EndTurn,
                    usage: TURN_USAGE,
                });
            }
            ScriptedTurn::ToolUse(text, calls) => {
                if !text.is_empty() {
                    let _ = tx.send(StreamPart::TextDelta { delta: text });
                }
                for call in calls {
                    let _ = tx.send(StreamPart::ToolCallStart {
                        id: call.id.clone(),
                        name: call.name.clone(),
                    });
                    let _ = tx.send(StreamPart::ToolCallComplete { call });
                }
                let _ = tx.send(StreamPart::Finish {
                    stop_reason: StopReason::ToolUse,
                    usage: TURN_USAGE,
                });
            }
            ScriptedTurn::FailMidStream(text, error) => {
                if !text.is_empty() {
                    let _ = tx.send(StreamPart::TextDelta { delta: text });
                }
                let _ = tx.send(StreamPart::Error { error });
            }
        }
        Ok(rx)
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<Completion, ProviderError> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Completion {
            content: vec![Content::Text {
                text: "condensed history".into(),
            }],
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        })
    }
}
