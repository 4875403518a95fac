//! Stream parts emitted by a provider during a streaming completion.

use crate::ai::provider::ProviderError;
use crate::ai::types::{AiToolCall, StopReason, Usage};

/// Incremental output of `Provider::stream`.
///
/// A well-behaved provider sends any number of `TextDelta` /
/// `ToolCallStart` / `ToolCallComplete` parts followed by exactly one
/// `Finish`, then closes the channel. `Error` may arrive at any point and
/// terminates the stream.
#[derive(Debug, Clone)]
pub enum StreamPart {
    /// Text content delta.
    TextDelta { delta: String },

    /// The model started streaming a tool call (arguments not yet known).
    ToolCallStart { id: String, name: String },

    /// Tool call arguments fully received.
    ToolCallComplete { call: AiToolCall },

    /// Terminal part carrying the stop reason and usage totals.
    Finish { stop_reason: StopReason, usage: Usage },

    /// The stream failed mid-flight.
    Error { error: ProviderError },
}
