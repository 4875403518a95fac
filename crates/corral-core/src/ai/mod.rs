//! LLM provider layer: domain message types, the provider contract,
//! retry policy, and the Anthropic implementation.

pub mod anthropic;
pub mod provider;
pub mod retry;
pub mod streaming;
pub mod types;

pub use anthropic::AnthropicProvider;
pub use provider::{Completion, CompletionRequest, Provider, ProviderError, RetryCallback};
pub use retry::{with_retry, RetryConfig};
pub use streaming::StreamPart;
pub use types::{AiTool, AiToolCall, Content, MediaSource, ModelMessage, Role, StopReason, Usage};
