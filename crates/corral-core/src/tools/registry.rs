//! Tool registry: registration, dispatch, oversized-result pagination,
//! per-file locking, and clone-with-exclusion for subagents.
//!
//! Tool output longer than `max_inline_bytes` is stored in a page cache
//! under a fresh `result_id` and returned page by page through the
//! built-in `read_more` tool. The cache lives in the registry, not in the
//! conversation, so paginated results stay readable after compaction.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::ai::types::AiTool;
use crate::tools::lock::LockProvider;
use crate::tools::{Tool, ToolResult};

/// Default inline-result ceiling (30 KiB, roughly 7,500 tokens).
pub const DEFAULT_MAX_INLINE_BYTES: usize = 30 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateName(String),

    #[error("invalid tool name '{0}': must match [A-Za-z0-9_]+")]
    InvalidName(String),
}

/// Registry of tools available to one agent.
pub struct ToolRegistry {
    tools: RwLock<Vec<Arc<dyn Tool>>>,
    pages: Arc<PageCache>,
    lock_provider: Option<Arc<dyn LockProvider>>,
    max_inline_bytes: usize,
    page_bytes: usize,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_INLINE_BYTES, DEFAULT_MAX_INLINE_BYTES)
    }

    pub fn with_limits(max_inline_bytes: usize, page_bytes: usize) -> Self {
        let pages = Arc::new(PageCache::default());
        let read_more: Arc<dyn Tool> = Arc::new(ReadMoreTool {
            pages: pages.clone(),
        });
        Self {
            tools: RwLock::new(vec![read_more]),
            pages,
            lock_provider: None,
            max_inline_bytes,
            page_bytes: page_bytes.max(1),
        }
    }

    pub fn with_lock_provider(mut self, provider: Arc<dyn LockProvider>) -> Self {
        self.lock_provider = Some(provider);
        self
    }

    /// Register a tool. Fails on a duplicate or malformed name.
    pub fn register(&self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(RegistryError::InvalidName(name));
        }

        let mut tools = self.tools.write().expect("tool list poisoned");
        if tools.iter().any(|t| t.name() == name) {
            return Err(RegistryError::DuplicateName(name));
        }
        info!(tool = %name, "registered tool");
        tools.push(tool);
        Ok(())
    }

    /// Provider-ready definitions in registration order.
    pub fn definitions(&self) -> Vec<AiTool> {
        let tools = self.tools.read().expect("tool list poisoned");
        tools.iter().map(|t| t.definition()).collect()
    }

    /// Registered tool names in registration order.
    pub fn names(&self) -> Vec<String> {
        let tools = self.tools.read().expect("tool list poisoned");
        tools.iter().map(|t| t.name().to_string()).collect()
    }

    fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().expect("tool list poisoned");
        tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Execute a tool by name.
    ///
    /// Unknown tools and handler failures come back as error results;
    /// dispatch itself never fails. When the tool declares a `file_param`
    /// and a lock provider is configured, the call holds the per-key lock
    /// for its whole duration.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::error(format!("unknown tool: {}", name));
        };

        let lock_key = tool.file_param().and_then(|param| {
            args.get(param)
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
        });

        debug!(tool = name, locked = lock_key.is_some(), "executing tool");

        let _guard = match (&self.lock_provider, &lock_key) {
            (Some(provider), Some(key)) => Some(provider.lock(key).await),
            _ => None,
        };

        let result = tool.invoke(args).await;
        self.maybe_paginate(result)
    }

    /// Retrieve a page of a previously paginated result. Pages are
    /// 1-indexed; this is also exposed to the model as the `read_more`
    /// tool.
    pub fn read_more(&self, result_id: &str, page: usize) -> ToolResult {
        match self.pages.page(result_id, page) {
            Ok(text) => ToolResult::success(text),
            Err(msg) => ToolResult::error(msg),
        }
    }

    /// Copy this registry minus `exclude`, for a subagent.
    ///
    /// Tools are shared by reference; the clone gets its own page cache
    /// (with its own `read_more`) and the same lock provider, so locks
    /// still serialise across parent and child. Registering into the
    /// clone never affects the parent.
    pub fn clone_excluding(&self, exclude: &[&str]) -> ToolRegistry {
        let cloned = ToolRegistry::with_limits(self.max_inline_bytes, self.page_bytes);
        let cloned = match &self.lock_provider {
            Some(provider) => cloned.with_lock_provider(provider.clone()),
            None => cloned,
        };

        let tools = self.tools.read().expect("tool list poisoned");
        {
            let mut child_tools = cloned.tools.write().expect("tool list poisoned");
            for tool in tools.iter() {
                let name = tool.name();
                if name == ReadMoreTool::NAME || exclude.contains(&name) {
                    continue;
                }
                child_tools.push(tool.clone());
            }
        }
        cloned
    }

    fn maybe_paginate(&self, result: ToolResult) -> ToolResult {
        if result.output.len() <= self.max_inline_bytes {
            return result;
        }

        let (result_id, total_pages, first_page) =
            self.pages.store(result.output, self.page_bytes);
        info!(
            result_id = %result_id,
            total_pages,
            "paginated oversized tool result"
        );

        ToolResult {
            output: format!(
                "{}\n\n[page 1 of {}; call read_more(result_id=\"{}\", page=2) for the next page]",
                first_page, total_pages, result_id
            ),
            is_error: result.is_error,
        }
    }
}

// ── Page cache ─────────────────────────────────────────────────────────

struct PaginatedResult {
    text: String,
    /// Exclusive end offset of each page, aligned to char boundaries.
    page_ends: Vec<usize>,
}

#[derive(Default)]
struct PageCache {
    entries: Mutex<HashMap<String, PaginatedResult>>,
}

impl PageCache {
    /// Store `text` and return `(result_id, total_pages, first_page)`.
    fn store(&self, text: String, page_bytes: usize) -> (String, usize, String) {
        let page_ends = page_boundaries(&text, page_bytes);
        let total_pages = page_ends.len();
        let first_page = text[..page_ends[0]].to_string();

        let result_id = Uuid::new_v4().simple().to_string()[..8].to_string();
        let mut entries = self.entries.lock().expect("page cache poisoned");
        entries.insert(result_id.clone(), PaginatedResult { text, page_ends });

        (result_id, total_pages, first_page)
    }

    fn page(&self, result_id: &str, page: usize) -> Result<String, String> {
        let entries = self.entries.lock().expect("page cache poisoned");
        let Some(entry) = entries.get(result_id) else {
            return Err(format!(
                "unknown or expired result id \"{}\"",
                result_id
            ));
        };

        let total_pages = entry.page_ends.len();
        if page < 1 || page > total_pages {
            return Err(format!(
                "page {} out of range: result has {} pages",
                page, total_pages
            ));
        }

        let start = if page == 1 {
            0
        } else {
            entry.page_ends[page - 2]
        };
        let end = entry.page_ends[page - 1];
        let content = &entry.text[start..end];

        if page == total_pages {
            Ok(format!("{}\n\n[page {} of {}; final page]", content, page, total_pages))
        } else {
            Ok(format!(
                "{}\n\n[page {} of {}; call read_more(result_id=\"{}\", page={}) for the next page]",
                content,
                page,
                total_pages,
                result_id,
                page + 1
            ))
        }
    }
}

/// Split points for `text` into pages of at most `page_bytes`, never
/// splitting a UTF-8 character.
fn page_boundaries(text: &str, page_bytes: usize) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = floor_char_boundary(text, (start + page_bytes).min(text.len()));
        if end <= start {
            // A single char wider than the page size; take it whole.
            end = text.len().min(start + page_bytes.max(4));
            while end < text.len() && !text.is_char_boundary(end) {
                end += 1;
            }
        }
        ends.push(end);
        start = end;
    }
    if ends.is_empty() {
        ends.push(0);
    }
    ends
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut boundary = index.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

// ── read_more tool ─────────────────────────────────────────────────────

struct ReadMoreTool {
    pages: Arc<PageCache>,
}

impl ReadMoreTool {
    const NAME: &'static str = "read_more";
}

#[derive(Deserialize)]
struct ReadMoreParams {
    result_id: String,
    page: usize,
}

#[async_trait]
impl Tool for ReadMoreTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn description(&self) -> &str {
        "Retrieve the next page of a paginated tool result. Pages are 1-indexed."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "result_id": {
                    "type": "string",
                    "description": "Result id from the pagination notice"
                },
                "page": {
                    "type": "integer",
                    "description": "Page number to retrieve (starting at 1)"
                }
            },
            "required": ["result_id", "page"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let params: ReadMoreParams = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("invalid parameters: {}", e)),
        };
        match self.pages.page(&params.result_id, params.page) {
            Ok(text) => ToolResult::success(text),
            Err(msg) => ToolResult::error(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FnTool;

    fn static_tool(name: &str, output: String) -> Arc<dyn Tool> {
        Arc::new(FnTool::new(
            name,
            "test tool",
            json!({"type": "object"}),
            Box::new(move |_| {
                let output = output.clone();
                Box::pin(async move { Ok(output) })
            }),
        ))
    }

    #[test]
    fn register_rejects_duplicates_and_bad_names() {
        let registry = ToolRegistry::new();
        registry
            .register(static_tool("echo", "hi".into()))
            .unwrap();

        assert!(matches!(
            registry.register(static_tool("echo", "hi".into())),
            Err(RegistryError::DuplicateName(_))
        ));
        assert!(matches!(
            registry.register(static_tool("bad name", "hi".into())),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let registry = ToolRegistry::new();
        registry.register(static_tool("alpha", "a".into())).unwrap();
        registry.register(static_tool("beta", "b".into())).unwrap();
        registry.register(static_tool("gamma", "c".into())).unwrap();

        assert_eq!(
            registry.names(),
            vec!["read_more", "alpha", "beta", "gamma"]
        );
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_an_error_result() {
        let registry = ToolRegistry::new();
        let result = registry.execute("missing", json!({})).await;
        assert!(result.is_error);
        assert!(result.output.contains("unknown tool"));
    }

    #[tokio::test]
    async fn oversized_result_paginates_and_reassembles() {
        let registry = ToolRegistry::with_limits(100, 40);
        let original: String = "abcdefghij".repeat(25); // 250 bytes
        registry
            .register(static_tool("big", original.clone()))
            .unwrap();

        let first = registry.execute("big", json!({})).await;
        assert!(!first.is_error);
        assert!(first.output.contains("[page 1 of 7;"));

        let result_id = first
            .output
            .split("result_id=\"")
            .nth(1)
            .and_then(|s| s.split('"').next())
            .expect("pagination notice carries the result id")
            .to_string();

        // Page 1 content plus all read_more pages reproduces the output.
        let mut reassembled = first
            .output
            .split("\n\n[page 1 of")
            .next()
            .unwrap()
            .to_string();
        for page in 2..=7 {
            let result = registry.read_more(&result_id, page);
            assert!(!result.is_error);
            reassembled.push_str(result.output.split("\n\n[page").next().unwrap());
        }
        assert_eq!(reassembled, original);
    }

    #[tokio::test]
    async fn pagination_respects_char_boundaries() {
        let registry = ToolRegistry::with_limits(10, 7);
        // Multibyte chars (3 bytes each) that do not divide the page size.
        let original = "日本語のテキスト".to_string();
        registry
            .register(static_tool("utf8", original.clone()))
            .unwrap();

        let first = registry.execute("utf8", json!({})).await;
        assert!(first.output.contains("[page 1 of"));
    }

    #[test]
    fn read_more_rejects_unknown_id_and_bad_page() {
        let registry = ToolRegistry::with_limits(10, 10);
        let result = registry.read_more("nope", 1);
        assert!(result.is_error);

        let (id, pages, _) = registry.pages.store("x".repeat(25), 10);
        assert_eq!(pages, 3);
        assert!(registry.read_more(&id, 0).is_error);
        assert!(registry.read_more(&id, 4).is_error);
        assert!(!registry.read_more(&id, 3).is_error);
    }

    #[tokio::test]
    async fn read_more_is_itself_a_tool() {
        let registry = ToolRegistry::with_limits(10, 10);
        let (id, _, _) = registry.pages.store("y".repeat(25), 10);

        let result = registry
            .execute("read_more", json!({"result_id": id, "page": 2}))
            .await;
        assert!(!result.is_error);
        assert!(result.output.contains("[page 2 of 3;"));
    }

    #[test]
    fn clone_excludes_and_preserves_order() {
        let registry = ToolRegistry::new();
        registry.register(static_tool("alpha", "a".into())).unwrap();
        registry.register(static_tool("beta", "b".into())).unwrap();
        registry.register(static_tool("gamma", "c".into())).unwrap();

        let child = registry.clone_excluding(&["beta"]);
        assert_eq!(child.names(), vec!["read_more", "alpha", "gamma"]);

        // Mutating the clone leaves the parent untouched.
        child.register(static_tool("delta", "d".into())).unwrap();
        assert_eq!(
            registry.names(),
            vec!["read_more", "alpha", "beta", "gamma"]
        );
    }

    #[tokio::test]
    async fn file_param_lock_serialises_same_key() {
        use crate::tools::lock::KeyedLocks;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        // Tracks the number of concurrently running handlers.
        let active = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicUsize::new(0));

        let make_tool = |name: &str| {
            let active = active.clone();
            let overlap = overlap.clone();
            Arc::new(
                FnTool::new(
                    name,
                    "writes a file",
                    json!({"type": "object"}),
                    Box::new(move |_| {
                        let active = active.clone();
                        let overlap = overlap.clone();
                        Box::pin(async move {
                            if active.fetch_add(1, Ordering::SeqCst) > 0 {
                                overlap.fetch_add(1, Ordering::SeqCst);
                            }
                            tokio::time::sleep(Duration::from_millis(20)).await;
                            active.fetch_sub(1, Ordering::SeqCst);
                            Ok("done".to_string())
                        })
                    }),
                )
                .with_file_param("path"),
            )
        };

        let registry = Arc::new(
            ToolRegistry::new().with_lock_provider(Arc::new(KeyedLocks::new())),
        );
        registry.register(make_tool("write_a")).unwrap();
        registry.register(make_tool("write_b")).unwrap();

        let r1 = registry.clone();
        let r2 = registry.clone();
        let (a, b) = tokio::join!(
            r1.execute("write_a", json!({"path": "same.txt"})),
            r2.execute("write_b", json!({"path": "same.txt"})),
        );
        assert!(!a.is_error);
        assert!(!b.is_error);
        assert_eq!(overlap.load(Ordering::SeqCst), 0);
    }
}
