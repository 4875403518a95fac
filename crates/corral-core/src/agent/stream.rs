//! Provider stream processing for the agent loop.
//!
//! Consumes [`StreamPart`]s, forwards text deltas as events, and
//! accumulates the final assistant message parts.

use tokio::sync::{mpsc, watch};

use crate::agent::events::AgentEvent;
use crate::ai::provider::ProviderError;
use crate::ai::streaming::StreamPart;
use crate::ai::types::{AiToolCall, StopReason, Usage};

/// Event emission callback shared by the loop's helpers. Fans out to the
/// caller channel and, when configured, the event store.
pub(crate) type EmitFn = dyn Fn(AgentEvent) + Send + Sync;

/// Accumulated result of one provider stream.
pub(crate) struct StreamOutcome {
    pub text: String,
    pub tool_calls: Vec<AiToolCall>,
    pub stop_reason: StopReason,
    pub usage: Usage,
    pub error: Option<ProviderError>,
    pub cancelled: bool,
}

/// Drain a provider stream, emitting `text_delta` events as they arrive.
///
/// Returns once the stream finishes, fails, or `cancel` flips. A stream
/// that closes without a `Finish` part is reported as a connection error.
pub(crate) async fn process_stream(
    mut parts: mpsc::UnboundedReceiver<StreamPart>,
    emit: &EmitFn,
    cancel: &mut watch::Receiver<bool>,
) -> StreamOutcome {
    let mut outcome = StreamOutcome {
        text: String::new(),
        tool_calls: Vec::new(),
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
        error: None,
        cancelled: false,
    };
    let mut finished = false;

    loop {
        let part = tokio::select! {
            part = parts.recv() => part,
            _ = wait_for_cancel(cancel) => {
                outcome.cancelled = true;
                return outcome;
            }
        };

        let Some(part) = part else {
            break;
        };

        match part {
            StreamPart::TextDelta { delta } => {
                outcome.text.push_str(&delta);
                emit(AgentEvent::TextDelta { delta });
            }
            StreamPart::ToolCallStart { .. } => {
                // Arguments are still streaming; the loop announces the
                // call once it is complete and about to execute.
            }
            StreamPart::ToolCallComplete { call } => {
                outcome.tool_calls.push(call);
            }
            StreamPart::Finish { stop_reason, usage } => {
                outcome.stop_reason = stop_reason;
                outcome.usage = usage;
                finished = true;
            }
            StreamPart::Error { error } => {
                outcome.error = Some(error);
                return outcome;
            }
        }
    }

    if !finished && outcome.error.is_none() {
        outcome.error = Some(ProviderError::Connection(
            "stream closed before completion".into(),
        ));
    }
    outcome
}

/// Resolve only once cancellation is requested. Pends forever if the
/// cancel handle was dropped without cancelling.
pub(crate) async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
