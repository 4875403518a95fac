//! corral-core — an embeddable autonomous agent runtime.
//!
//! The crate is the core loop an application embeds to obtain an
//! "agent": a long-horizon conversation with an LLM that may invoke
//! registered tools (files, shell, subagents, memory, MCP services) to
//! accomplish multi-step tasks. It is a library, not a product — HTTP
//! front-ends, persistence, and tool policies live with the embedder.
//!
//! # Architecture
//!
//! - [`agent`] — the streaming tool-use loop and its event protocol.
//! - [`compact`] — two-phase context-window budget management.
//! - [`tools`] — tool registration, dispatch, pagination, locking.
//! - [`event_store`] — resumable per-stream event logs.
//! - [`ai`] — provider contract, retry policy, Anthropic implementation.
//! - [`skills`] — two-phase skill catalogue injected into the system prompt.
//! - [`sandbox`], [`session`], [`mcp`] — external collaborator contracts.
//!
//! # Example
//!
//! ```rust,no_run
//! use corral_core::{Agent, AgentConfig, AgentEvent};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let agent = Agent::anthropic(AgentConfig::default(), std::env::var("ANTHROPIC_API_KEY")?);
//! let mut stream = agent.stream_message("hello", &[], None).await?;
//! while let Some(event) = stream.next().await {
//!     if let AgentEvent::TextDelta { delta } = event {
//!         print!("{delta}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod ai;
pub mod compact;
pub mod event_store;
pub mod input;
pub mod mcp;
pub mod sandbox;
pub mod session;
pub mod skills;
pub mod token_counter;
pub mod tools;

pub use agent::events::AgentEvent;
pub use agent::subagent::{SubagentTool, SUBAGENT_TOOL_NAME};
pub use agent::{Agent, AgentConfig, AgentError, AgentStream};
pub use ai::{
    AnthropicProvider, Completion, CompletionRequest, Content, MediaSource, ModelMessage,
    Provider, ProviderError, RetryConfig, Role, StopReason, Usage,
};
pub use compact::{Compactor, COMPACT_SENTINEL};
pub use event_store::{EventStore, StoredEvent, StreamStatus};
pub use input::{Attachment, InputError};
pub use mcp::{register_mcp_tools, McpCallResult, McpClient, McpToolDef};
pub use sandbox::{ExecResult, LocalSandbox, Sandbox, SandboxError};
pub use session::{InMemorySessionStore, SessionStore};
pub use skills::{Skill, SkillRegistry};
pub use token_counter::TokenCounter;
pub use tools::{
    FnTool, KeyedLocks, LockProvider, MemoryTool, Tool, ToolRegistry, ToolResult,
};
