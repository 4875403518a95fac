//! Memory tool: a file-backed key/value store rooted inside a sandbox.
//!
//! Keys are plain file names under the root directory; values are file
//! contents. Path traversal attempts come back as error results, which
//! the agent treats like any other tool failure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::fs;
use tracing::warn;

use crate::tools::{Tool, ToolResult};

pub struct MemoryTool {
    root: PathBuf,
}

#[derive(Deserialize)]
struct Params {
    op: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

impl MemoryTool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a key to a path under the root, rejecting anything that
    /// could escape it.
    fn resolve_key(&self, key: &str) -> Result<PathBuf, String> {
        if key.is_empty() {
            return Err("memory key must not be empty".into());
        }
        if key.contains('/') || key.contains('\\') || key == "." || key == ".." {
            warn!(key, "rejected memory key with path separators");
            return Err(format!("invalid memory key '{}': must be a plain file name", key));
        }
        Ok(self.root.join(key))
    }

    async fn view(&self, key: Option<&str>) -> ToolResult {
        match key {
            None => self.list_keys().await,
            Some(key) => {
                let path = match self.resolve_key(key) {
                    Ok(p) => p,
                    Err(e) => return ToolResult::error(e),
                };
                match fs::read_to_string(&path).await {
                    Ok(content) => ToolResult::success(content),
                    Err(_) => ToolResult::error(format!("no memory entry '{}'", key)),
                }
            }
        }
    }

    async fn list_keys(&self) -> ToolResult {
        let mut keys = Vec::new();
        let mut entries = match fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            // Nothing written yet.
            Err(_) => return ToolResult::success("(no memory entries)"),
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                keys.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        keys.sort();
        if keys.is_empty() {
            ToolResult::success("(no memory entries)")
        } else {
            ToolResult::success(keys.join("\n"))
        }
    }

    async fn write(&self, key: &str, content: &str) -> ToolResult {
        let path = match self.resolve_key(key) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        if let Err(e) = fs::create_dir_all(&self.root).await {
            return ToolResult::error(format!("failed to create memory root: {}", e));
        }
        match fs::write(&path, content).await {
            Ok(()) => ToolResult::success(format!("stored '{}'", key)),
            Err(e) => ToolResult::error(format!("failed to write '{}': {}", key, e)),
        }
    }

    async fn delete(&self, key: &str) -> ToolResult {
        let path = match self.resolve_key(key) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e),
        };
        match fs::remove_file(&path).await {
            Ok(()) => ToolResult::success(format!("deleted '{}'", key)),
            Err(_) => ToolResult::error(format!("no memory entry '{}'", key)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Persistent key/value memory. Operations: view (list keys, or read one), write, delete."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "op": {
                    "type": "string",
                    "enum": ["view", "write", "delete"],
                    "description": "Operation to perform"
                },
                "key": {
                    "type": "string",
                    "description": "Entry name. Optional for view (lists all keys)."
                },
                "content": {
                    "type": "string",
                    "description": "Content to store (write only)"
                }
            },
            "required": ["op"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let params: Params = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("invalid parameters: {}", e)),
        };

        match params.op.as_str() {
            "view" => self.view(params.key.as_deref()).await,
            "write" => match (&params.key, &params.content) {
                (Some(key), Some(content)) => self.write(key, content).await,
                _ => ToolResult::error("write requires both 'key' and 'content'"),
            },
            "delete" => match &params.key {
                Some(key) => self.delete(key).await,
                None => ToolResult::error("delete requires 'key'"),
            },
            other => ToolResult::error(format!("unknown memory op '{}'", other)),
        }
    }
}
