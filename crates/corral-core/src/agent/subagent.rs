//! The `create_subagent` tool.
//!
//! Spawns a child agent with an isolated conversation to work on a
//! bounded task, so exploratory tool traffic does not pollute the parent
//! context. The child shares the parent's provider (and therefore its
//! sandbox, through the tool handlers) but gets a cloned registry that
//! excludes `create_subagent`, which breaks recursion at depth one.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use crate::agent::{Agent, AgentConfig};
use crate::ai::provider::Provider;
use crate::tools::registry::{RegistryError, ToolRegistry};
use crate::tools::{Tool, ToolResult};

pub const SUBAGENT_TOOL_NAME: &str = "create_subagent";

const SUBAGENT_SYSTEM_PROMPT: &str = "\
You are a subagent completing a delegated task.

Rules:
- Focus on the assigned task only.
- Use the available tools to get it done.
- Finish with a concise summary of the outcome.";

/// Tool handler that runs a task in a child agent.
pub struct SubagentTool {
    provider: Arc<dyn Provider>,
    /// Weak: the parent registry owns this tool.
    registry: Weak<ToolRegistry>,
    config: AgentConfig,
}

impl SubagentTool {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: &Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            registry: Arc::downgrade(registry),
            config,
        }
    }

    /// Build and register the tool into `registry` in one step.
    pub fn register(
        registry: &Arc<ToolRegistry>,
        provider: Arc<dyn Provider>,
        config: AgentConfig,
    ) -> Result<(), RegistryError> {
        registry.register(Arc::new(Self::new(provider, registry, config)))
    }
}

#[async_trait]
impl Tool for SubagentTool {
    fn name(&self) -> &str {
        SUBAGENT_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a subagent with its own context. \
         Returns the subagent's final answer. Use for exploration or work \
         whose intermediate steps would clutter this conversation."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Complete, self-contained description of the task"
                }
            },
            "required": ["task"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let Some(task) = args.get("task").and_then(|v| v.as_str()) else {
            return ToolResult::error("create_subagent requires a 'task' string");
        };
        let Some(parent_registry) = self.registry.upgrade() else {
            return ToolResult::error("parent tool registry is gone");
        };

        let child_registry = Arc::new(parent_registry.clone_excluding(&[SUBAGENT_TOOL_NAME]));

        let mut config = self.config.clone();
        config.system_prompt = SUBAGENT_SYSTEM_PROMPT.to_string();

        // Isolated conversation; no event store, no token counter.
        let child = Agent::new(config, self.provider.clone()).with_tool_registry(child_registry);

        info!(task_len = task.len(), "subagent started");

        let stream = match child.stream_message(task, &[], None).await {
            Ok(stream) => stream,
            Err(e) => return ToolResult::error(format!("subagent failed to start: {}", e)),
        };

        // Accumulate assistant text; structured events are ignored.
        let text = stream.collect_text().await;

        info!(result_len = text.len(), "subagent finished");
        ToolResult::success(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_excluded_from_clone() {
        // The recursion break: a clone made for a child must not carry
        // the subagent tool.
        let registry = Arc::new(ToolRegistry::new());
        let provider: Arc<dyn Provider> = Arc::new(NoopProvider);
        SubagentTool::register(&registry, provider, AgentConfig::default()).unwrap();

        assert!(registry.names().contains(&SUBAGENT_TOOL_NAME.to_string()));
        let child = registry.clone_excluding(&[SUBAGENT_TOOL_NAME]);
        assert!(!child.names().contains(&SUBAGENT_TOOL_NAME.to_string()));
    }

    struct NoopProvider;

    #[async_trait]
    impl Provider for NoopProvider {
        async fn stream(
            &self,
            _request: crate::ai::provider::CompletionRequest,
            _on_retry: Option<crate::ai::provider::RetryCallback>,
        ) -> Result<
            tokio::sync::mpsc::UnboundedReceiver<crate::ai::streaming::StreamPart>,
            crate::ai::provider::ProviderError,
        > {
            let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
            let _ = tx.send(crate::ai::streaming::StreamPart::Finish {
                stop_reason: crate::ai::types::StopReason::EndTurn,
                usage: crate::ai::types::Usage::default(),
            });
            Ok(rx)
        }

        async fn complete(
            &self,
            _request: crate::ai::provider::CompletionRequest,
        ) -> Result<crate::ai::provider::Completion, crate::ai::provider::ProviderError> {
            Ok(crate::ai::provider::Completion {
                content: Vec::new(),
                stop_reason: crate::ai::types::StopReason::EndTurn,
                usage: crate::ai::types::Usage::default(),
            })
        }
    }
}
