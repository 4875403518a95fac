//! Concurrent tool execution for the agent loop.
//!
//! All tool calls of one assistant turn run concurrently; results are
//! assembled in the original order of the tool_use blocks regardless of
//! completion order. A failing handler becomes an error tool_result and
//! never aborts the batch.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tracing::debug;

use crate::agent::events::AgentEvent;
use crate::agent::stream::{wait_for_cancel, EmitFn};
use crate::ai::types::{AiToolCall, Content};
use crate::tools::registry::ToolRegistry;

/// Execute one assistant turn's tool calls.
///
/// Emits `tool_call_start` for every call up front, then
/// `tool_call_end` per call in block order once all have finished.
/// Returns `None` if cancelled before completion; in-flight handlers are
/// dropped at their next await point.
pub(crate) async fn execute_tools(
    calls: &[AiToolCall],
    registry: &Arc<ToolRegistry>,
    emit: &EmitFn,
    cancel: &mut watch::Receiver<bool>,
) -> Option<Vec<Content>> {
    for call in calls {
        emit(AgentEvent::ToolCallStart {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        });
    }

    debug!(count = calls.len(), "dispatching tool calls concurrently");

    let futures = calls.iter().map(|call| {
        let registry = registry.clone();
        let call = call.clone();
        async move { registry.execute(&call.name, call.arguments).await }
    });

    let join = join_all(futures);
    let results = tokio::select! {
        results = join => results,
        _ = wait_for_cancel(cancel) => return None,
    };

    let mut blocks = Vec::with_capacity(calls.len());
    for (call, result) in calls.iter().zip(results) {
        emit(AgentEvent::ToolCallEnd {
            id: call.id.clone(),
            name: call.name.clone(),
            is_error: result.is_error,
        });
        blocks.push(Content::ToolResult {
            tool_use_id: call.id.clone(),
            content: result.output,
            is_error: result.is_error,
        });
    }

    Some(blocks)
}
