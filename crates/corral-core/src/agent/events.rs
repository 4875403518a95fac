//! Canonical event protocol for the agent loop.
//!
//! `AgentEvent` is the single stream the agent emits: assistant prose
//! arrives as `text_delta`, everything else is a structured state change.
//! Transport layers (SSE servers, TUIs) consume these directly; the
//! serde representation is the wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Events emitted by [`Agent::stream_message`](crate::agent::Agent::stream_message).
///
/// Every stream terminates with `done` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Assistant text fragment.
    TextDelta { delta: String },

    /// A tool call is about to execute.
    ToolCallStart {
        id: String,
        name: String,
        arguments: Value,
    },

    /// A tool call finished.
    ToolCallEnd {
        id: String,
        name: String,
        is_error: bool,
    },

    /// Compaction began.
    CompactStart,

    /// Compaction finished and rewrote the conversation.
    CompactEnd,

    /// The provider call is being retried after a transient failure.
    Retry { attempt: usize, error: String },

    /// Token usage for the completed assistant turn.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    /// A recoverable or fatal error. Fatal errors terminate the stream.
    Error { kind: String, message: String },

    /// The loop finished normally.
    Done,
}

impl AgentEvent {
    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentEvent::Done | AgentEvent::Error { .. })
    }
}
