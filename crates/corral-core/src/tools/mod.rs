//! Tool abstractions: the `Tool` trait, results, and the registry that
//! dispatches model-requested calls.

pub mod lock;
pub mod memory;
pub mod registry;

pub use lock::{KeyedLocks, LockGuard, LockProvider};
pub use memory::MemoryTool;
pub use registry::{RegistryError, ToolRegistry};

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use crate::ai::types::AiTool;

/// Tool execution result: opaque text plus an error flag.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            is_error: false,
        }
    }

    pub fn error(msg: impl std::fmt::Display) -> Self {
        Self {
            output: msg.to_string(),
            is_error: true,
        }
    }
}

/// A callable capability the model can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name. Must match `[A-Za-z0-9_]+` and be unique per registry.
    fn name(&self) -> &str;

    /// Description advertised to the model.
    fn description(&self) -> &str;

    /// JSON schema of the parameters.
    fn parameters_schema(&self) -> Value;

    /// Parameter whose string value identifies a file for advisory
    /// locking, if any.
    fn file_param(&self) -> Option<&str> {
        None
    }

    /// Run the tool. Implementations report failures through
    /// `ToolResult::error` rather than panicking.
    async fn invoke(&self, args: Value) -> ToolResult;

    /// Provider-ready definition.
    fn definition(&self) -> AiTool {
        AiTool {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.parameters_schema(),
        }
    }
}

/// Boxed future returned by external handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send>>;

/// Handler signature for [`FnTool`].
pub type Handler = Box<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// A tool backed by a user-supplied async callback.
///
/// Handler errors are captured into `ToolResult { is_error: true }` so a
/// failing tool never aborts the agent loop.
pub struct FnTool {
    name: String,
    description: String,
    parameters: Value,
    handler: Handler,
    file_param: Option<String>,
}

impl FnTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        handler: Handler,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            handler,
            file_param: None,
        }
    }

    pub fn with_file_param(mut self, param: impl Into<String>) -> Self {
        self.file_param = Some(param.into());
        self
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters.clone()
    }

    fn file_param(&self) -> Option<&str> {
        self.file_param.as_deref()
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        match (self.handler)(args).await {
            Ok(output) => ToolResult::success(output),
            Err(e) => ToolResult::error(format!("tool error: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool() -> FnTool {
        FnTool::new(
            "echo",
            "Echo the input back",
            json!({
                "type": "object",
                "properties": {"x": {"type": "string"}},
                "required": ["x"]
            }),
            Box::new(|args| {
                Box::pin(async move {
                    Ok(args
                        .get("x")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string())
                })
            }),
        )
    }

    #[tokio::test]
    async fn fn_tool_invokes_handler() {
        let tool = echo_tool();
        let result = tool.invoke(json!({"x": "hello"})).await;
        assert!(!result.is_error);
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn fn_tool_captures_handler_errors() {
        let tool = FnTool::new(
            "broken",
            "Always fails",
            json!({"type": "object"}),
            Box::new(|_| Box::pin(async { Err(anyhow::anyhow!("boom")) })),
        );
        let result = tool.invoke(json!({})).await;
        assert!(result.is_error);
        assert!(result.output.contains("boom"));
    }
}
