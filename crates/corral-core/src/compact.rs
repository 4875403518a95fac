//! Conversation compaction.
//!
//! Two-phase context-window budget manager. Phase 1 truncates old tool
//! results in place without any model call; Phase 2 summarises a safe
//! prefix through the provider. Neither phase may sever a
//! tool_use/tool_result pair or touch the most recent turns.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::provider::{CompletionRequest, Provider, ProviderError};
use crate::ai::types::{Content, ModelMessage, Role};

/// Replacement body for truncated tool results.
pub const COMPACT_SENTINEL: &str = "[compacted tool result]";

/// Default usage fraction that triggers compaction.
pub const DEFAULT_COMPACT_THRESHOLD: f64 = 0.80;

/// Default number of most-recent turns protected from rewriting.
pub const DEFAULT_PROTECT_LAST_K: usize = 3;

const SUMMARY_MAX_TOKENS: u32 = 1024;

const SUMMARY_SYSTEM_PROMPT: &str = "\
You condense agent conversation history. Produce a compact summary that \
preserves: the user's goals, decisions made, tool activity and outcomes, \
file paths and identifiers mentioned, and any unresolved questions. Be \
factual and brief; do not add commentary.";

const SUMMARY_REQUEST_TEXT: &str =
    "Please summarize the conversation so far so we can continue with a smaller context.";

/// Decides when and how to shrink a conversation.
pub struct Compactor {
    provider: Arc<dyn Provider>,
    model: String,
    threshold: f64,
    protect_last_k: usize,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            threshold: DEFAULT_COMPACT_THRESHOLD,
            protect_last_k: DEFAULT_PROTECT_LAST_K,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_protect_last_k(mut self, k: usize) -> Self {
        self.protect_last_k = k;
        self
    }

    /// Rewrite `conversation` in place if the usage fraction demands it.
    /// Returns whether anything changed.
    ///
    /// Phase 2 provider failures are swallowed with a warning: running
    /// uncompacted is better than aborting the turn.
    pub async fn compact(&self, conversation: &mut Vec<ModelMessage>, usage_fraction: f64) -> bool {
        if usage_fraction < self.threshold {
            return false;
        }

        if self.truncate_old_tool_results(conversation) {
            info!(
                usage_fraction,
                messages = conversation.len(),
                "compacted via tool-result truncation"
            );
            return true;
        }

        match self.summarize_prefix(conversation).await {
            Ok(did_compact) => {
                if did_compact {
                    info!(
                        usage_fraction,
                        messages = conversation.len(),
                        "compacted via prefix summarisation"
                    );
                }
                did_compact
            }
            Err(e) => {
                warn!(error = %e, "compaction summarisation failed; continuing uncompacted");
                false
            }
        }
    }

    /// Phase 1: replace tool-result bodies outside the protected suffix
    /// with a sentinel. Block identity (`tool_use_id`, `is_error`) is
    /// preserved so pairing invariants hold. Counts only blocks that were
    /// not already the sentinel.
    fn truncate_old_tool_results(&self, conversation: &mut [ModelMessage]) -> bool {
        let protected_from = conversation.len().saturating_sub(self.protect_last_k);
        let mut replaced = 0usize;

        for message in &mut conversation[..protected_from] {
            if message.role != Role::User {
                continue;
            }
            for block in &mut message.content {
                if let Content::ToolResult { content, .. } = block {
                    if content != COMPACT_SENTINEL {
                        *content = COMPACT_SENTINEL.to_string();
                        replaced += 1;
                    }
                }
            }
        }

        debug!(replaced, "phase 1 truncation pass");
        replaced > 0
    }

    /// Phase 2: summarise `conversation[..s]` at a safe split point and
    /// replace it with a synthetic user/assistant pair.
    async fn summarize_prefix(
        &self,
        conversation: &mut Vec<ModelMessage>,
    ) -> Result<bool, ProviderError> {
        let Some(split) = self.safe_split_point(conversation) else {
            debug!("no safe split point; phase 2 skipped");
            return Ok(false);
        };

        let rendered = render_for_summary(&conversation[..split]);
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ModelMessage::user_text(format!(
                "{}\n\n<conversation>\n{}</conversation>",
                SUMMARY_REQUEST_TEXT, rendered
            ))],
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            tools: Vec::new(),
            max_tokens: SUMMARY_MAX_TOKENS,
            enable_caching: false,
        };

        let completion = self.provider.complete(request).await?;
        let summary = completion.text();
        if summary.is_empty() {
            warn!("summarisation returned no text; leaving conversation unchanged");
            return Ok(false);
        }

        let suffix = conversation.split_off(split);
        conversation.clear();
        conversation.push(ModelMessage::user_text(SUMMARY_REQUEST_TEXT));
        conversation.push(ModelMessage::assistant_text(summary));
        conversation.extend(suffix);

        Ok(true)
    }

    /// Largest index `s` such that splitting there severs nothing: `s` is
    /// a user-turn boundary (so the suffix keeps alternating after the
    /// synthetic pair), the protected suffix lies entirely after `s`, and
    /// no tool_use before `s` has its result at or after `s`.
    fn safe_split_point(&self, conversation: &[ModelMessage]) -> Option<usize> {
        let len = conversation.len();
        let max_split = len.checked_sub(self.protect_last_k.max(1))?;

        for s in (2..=max_split).rev() {
            if conversation[s].role != Role::User {
                continue;
            }
            if !severs_tool_pair(conversation, s) {
                return Some(s);
            }
        }
        None
    }
}

/// Whether any tool_use in `conversation[..s]` is answered at or after `s`.
fn severs_tool_pair(conversation: &[ModelMessage], s: usize) -> bool {
    let mut pending: std::collections::HashSet<&str> = std::collections::HashSet::new();

    for message in &conversation[..s] {
        for block in &message.content {
            match block {
                Content::ToolUse { id, .. } => {
                    pending.insert(id);
                }
                Content::ToolResult { tool_use_id, .. } => {
                    pending.remove(tool_use_id.as_str());
                }
                _ => {}
            }
        }
    }

    !pending.is_empty()
}

/// Plain-text rendering of the prefix for the summarisation request.
fn render_for_summary(messages: &[ModelMessage]) -> String {
    let mut buf = String::with_capacity(messages.len() * 128);
    for message in messages {
        let label = match message.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
        };
        buf.push_str(label);
        buf.push_str(": ");
        for block in &message.content {
            match block {
                Content::Text { text } => buf.push_str(text),
                Content::ToolUse { name, input, .. } => {
                    buf.push_str(&format!("\n  [tool call: {}({})]", name, input));
                }
                Content::ToolResult {
                    content, is_error, ..
                } => {
                    let tag = if *is_error { "tool error" } else { "tool result" };
                    buf.push_str(&format!("\n  [{}: {}]", tag, content));
                }
                Content::Image { .. } => buf.push_str("\n  [image]"),
                Content::Document { .. } => buf.push_str("\n  [document]"),
            }
        }
        buf.push('\n');
    }
    buf
}
