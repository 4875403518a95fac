//! MCP adapter: exposes a connected MCP server's tools through the
//! registry.
//!
//! The wire protocol lives behind the [`McpClient`] contract. Each remote
//! tool registers as `{server}__{tool}` with a handler that delegates to
//! `call_tool`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::tools::registry::ToolRegistry;
use crate::tools::{Tool, ToolResult};

/// Remote tool definition as reported by `list_tools`.
#[derive(Debug, Clone)]
pub struct McpToolDef {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

/// Result of a remote tool call.
#[derive(Debug, Clone)]
pub struct McpCallResult {
    pub content: String,
    pub is_error: bool,
}

/// A connected MCP client. Transport details are the embedder's concern.
#[async_trait]
pub trait McpClient: Send + Sync {
    fn server_name(&self) -> &str;
    async fn list_tools(&self) -> anyhow::Result<Vec<McpToolDef>>;
    async fn call_tool(&self, name: &str, args: Value) -> anyhow::Result<McpCallResult>;
}

/// Wraps one remote tool as a registry [`Tool`].
struct McpTool {
    full_name: String,
    tool_name: String,
    definition: McpToolDef,
    client: Arc<dyn McpClient>,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn description(&self) -> &str {
        self.definition.description.as_deref().unwrap_or("MCP tool")
    }

    fn parameters_schema(&self) -> Value {
        self.definition.input_schema.clone()
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        match self.client.call_tool(&self.tool_name, args).await {
            Ok(result) => ToolResult {
                output: result.content,
                is_error: result.is_error,
            },
            Err(e) => ToolResult::error(format!("MCP error: {}", e)),
        }
    }
}

/// Register every tool of `client` into `registry`. Returns how many
/// were registered.
pub async fn register_mcp_tools(
    client: Arc<dyn McpClient>,
    registry: &ToolRegistry,
) -> anyhow::Result<usize> {
    let tools = client.list_tools().await?;
    let server = client.server_name().to_string();

    let mut registered = 0;
    for definition in tools {
        let tool = McpTool {
            full_name: format!("{}__{}", server, definition.name),
            tool_name: definition.name.clone(),
            definition,
            client: client.clone(),
        };
        registry.register(Arc::new(tool))?;
        registered += 1;
    }

    info!(server = %server, registered, "registered MCP tools");
    Ok(registered)
}
