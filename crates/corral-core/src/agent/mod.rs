//! The agent: a conversation driven through the streaming tool-use loop.
//!
//! `Agent` owns its conversation exclusively and orchestrates the other
//! subsystems: compaction before each provider call, skill injection
//! into the system prompt, concurrent tool dispatch, token accounting,
//! and event publication (optionally mirrored into an [`EventStore`] for
//! resume).
//!
//! The loop runs as a spawned task; callers consume [`AgentEvent`]s from
//! the returned [`AgentStream`] and may cancel cooperatively.

pub mod events;
pub mod executor;
pub mod stream;
pub mod subagent;

use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::agent::events::AgentEvent;
use crate::ai::provider::{
    CompletionRequest, Provider, ProviderError, RetryCallback,
};
use crate::ai::retry::RetryConfig;
use crate::ai::types::{AiToolCall, Content, ModelMessage, Role, StopReason};
use crate::compact::Compactor;
use crate::event_store::EventStore;
use crate::input::{build_content, Attachment, InputError};
use crate::skills::SkillRegistry;
use crate::token_counter::TokenCounter;
use crate::tools::registry::ToolRegistry;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_MAX_TOKENS: u32 = 8192;
const DEFAULT_CONTEXT_WINDOW: u64 = 200_000;
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 25;

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a capable assistant that accomplishes multi-step tasks using the \
tools available to you. Think before acting, verify the results of your \
tool calls, and report what you did.";

/// Agent configuration. Every field has a sensible default.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Context window used for the compaction usage fraction.
    pub context_window: u64,
    /// Safety cap on tool rounds per `stream_message` call.
    pub max_tool_iterations: usize,
    /// Hint to the provider to reuse the system-prompt cache.
    pub enable_prompt_caching: bool,
    /// Retry knobs applied when the agent constructs its own provider.
    pub retry: RetryConfig,
    pub system_prompt: String,
    /// Usage fraction that triggers compaction.
    pub compact_threshold: f64,
    /// Most-recent turns protected from compaction.
    pub compact_protect_last_k: usize,
    /// Inline ceiling for tool results in the default registry.
    pub max_inline_bytes: usize,
    /// Page size for paginated tool results in the default registry.
    pub page_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            context_window: DEFAULT_CONTEXT_WINDOW,
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            enable_prompt_caching: true,
            retry: RetryConfig::default(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            compact_threshold: crate::compact::DEFAULT_COMPACT_THRESHOLD,
            compact_protect_last_k: crate::compact::DEFAULT_PROTECT_LAST_K,
            max_inline_bytes: crate::tools::registry::DEFAULT_MAX_INLINE_BYTES,
            page_bytes: crate::tools::registry::DEFAULT_MAX_INLINE_BYTES,
        }
    }
}

/// Errors surfaced synchronously from [`Agent::stream_message`].
///
/// Failures after the loop has started arrive as terminal
/// [`AgentEvent::Error`] events instead.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Handle to a running `stream_message` call.
pub struct AgentStream {
    events: mpsc::UnboundedReceiver<AgentEvent>,
    cancel: watch::Sender<bool>,
}

impl AgentStream {
    /// Next event, or `None` once the loop task is done.
    pub async fn next(&mut self) -> Option<AgentEvent> {
        self.events.recv().await
    }

    /// Request cooperative cancellation: the provider stream is closed,
    /// in-flight tool handlers are dropped, and the event-store stream
    /// (if any) is marked failed with reason `cancelled`.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Drain the stream, returning the concatenated assistant text.
    pub async fn collect_text(mut self) -> String {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            if let AgentEvent::TextDelta { delta } = event {
                text.push_str(&delta);
            }
        }
        text
    }

    /// Drain the stream into a vector of all events.
    pub async fn collect_events(mut self) -> Vec<AgentEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }
}

/// A stateful conversation agent.
pub struct Agent {
    config: AgentConfig,
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    skills: Option<Arc<RwLock<SkillRegistry>>>,
    event_store: Option<Arc<EventStore>>,
    token_counter: Option<Arc<TokenCounter>>,
    conversation: Arc<Mutex<Vec<ModelMessage>>>,
}

impl Agent {
    pub fn new(config: AgentConfig, provider: Arc<dyn Provider>) -> Self {
        let registry = Arc::new(ToolRegistry::with_limits(
            config.max_inline_bytes,
            config.page_bytes,
        ));
        Self {
            config,
            provider,
            registry,
            skills: None,
            event_store: None,
            token_counter: None,
            conversation: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience constructor wiring an [`AnthropicProvider`] with the
    /// config's retry knobs.
    ///
    /// [`AnthropicProvider`]: crate::ai::anthropic::AnthropicProvider
    pub fn anthropic(config: AgentConfig, api_key: impl Into<String>) -> Self {
        let provider = crate::ai::anthropic::AnthropicProvider::new(api_key)
            .with_retry_config(config.retry);
        Self::new(config, Arc::new(provider))
    }

    pub fn with_tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_skills(mut self, skills: Arc<RwLock<SkillRegistry>>) -> Self {
        self.skills = Some(skills);
        self
    }

    pub fn with_event_store(mut self, store: Arc<EventStore>) -> Self {
        self.event_store = Some(store);
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<TokenCounter>) -> Self {
        self.token_counter = Some(counter);
        self
    }

    pub fn tool_registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Read-only snapshot of the conversation.
    pub fn conversation(&self) -> Vec<ModelMessage> {
        self.conversation.lock().expect("conversation poisoned").clone()
    }

    /// Replace the conversation wholesale (session restore).
    pub fn load_conversation(&self, conversation: Vec<ModelMessage>) {
        *self.conversation.lock().expect("conversation poisoned") = conversation;
    }

    pub fn reset_conversation(&self) {
        self.conversation.lock().expect("conversation poisoned").clear();
        if let Some(counter) = &self.token_counter {
            counter.reset();
        }
        debug!("conversation reset");
    }

    /// Send a user message and stream the agent's work on it.
    ///
    /// Input errors surface here, before the conversation is touched.
    /// Everything after that — provider failures included — arrives as
    /// events on the returned stream, which always terminates with
    /// `done` or `error`. With a `stream_id`, events are mirrored into
    /// the event store for resume.
    pub async fn stream_message(
        &self,
        content: &str,
        attachments: &[Attachment],
        stream_id: Option<String>,
    ) -> Result<AgentStream, AgentError> {
        let blocks = build_content(content, attachments)?;

        {
            let mut conversation = self.conversation.lock().expect("conversation poisoned");
            conversation.push(ModelMessage::user(blocks));
        }
        debug!(content_len = content.len(), "user turn appended");

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = LoopTask {
            config: self.config.clone(),
            provider: self.provider.clone(),
            registry: self.registry.clone(),
            skills: self.skills.clone(),
            token_counter: self.token_counter.clone(),
            conversation: self.conversation.clone(),
            sink: EventSink {
                tx: event_tx,
                store: self.event_store.clone(),
                stream_id,
            },
            cancel: cancel_rx,
        };
        tokio::spawn(task.run());

        Ok(AgentStream {
            events: event_rx,
            cancel: cancel_tx,
        })
    }
}

// ── Event sink ─────────────────────────────────────────────────────────

/// Fans events out to the caller's channel and, when configured, the
/// event store. Store failures are logged and never fatal.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
    store: Option<Arc<EventStore>>,
    stream_id: Option<String>,
}

impl EventSink {
    fn emit(&self, event: AgentEvent) {
        if let (Some(store), Some(stream_id)) = (&self.store, &self.stream_id) {
            if let Err(e) = store.append(stream_id, event.clone()) {
                warn!(stream_id, error = %e, "event store append failed");
            }
        }
        let _ = self.tx.send(event);
    }

    fn finish_complete(&self) {
        if let (Some(store), Some(stream_id)) = (&self.store, &self.stream_id) {
            store.mark_complete(stream_id);
        }
    }

    fn finish_failed(&self, reason: &str) {
        if let (Some(store), Some(stream_id)) = (&self.store, &self.stream_id) {
            store.mark_failed(stream_id, reason);
        }
    }
}

// ── The loop ───────────────────────────────────────────────────────────

struct LoopTask {
    config: AgentConfig,
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    skills: Option<Arc<RwLock<SkillRegistry>>>,
    token_counter: Option<Arc<TokenCounter>>,
    conversation: Arc<Mutex<Vec<ModelMessage>>>,
    sink: EventSink,
    cancel: watch::Receiver<bool>,
}

impl LoopTask {
    async fn run(mut self) {
        let compactor = Compactor::new(self.provider.clone(), self.config.model.clone())
            .with_threshold(self.config.compact_threshold)
            .with_protect_last_k(self.config.compact_protect_last_k);

        let mut tool_rounds = 0usize;

        loop {
            if *self.cancel.borrow() {
                self.finish_cancelled();
                return;
            }

            self.maybe_compact(&compactor).await;

            // Stream one assistant turn.
            let request = self.build_request();
            let on_retry = self.retry_callback();
            let parts = match self.provider.stream(request, Some(on_retry)).await {
                Ok(parts) => parts,
                Err(error) => {
                    self.handle_provider_error(error, String::new());
                    return;
                }
            };

            let sink = self.sink.clone();
            let emit = move |event| sink.emit(event);
            let outcome = stream::process_stream(parts, &emit, &mut self.cancel).await;
            if outcome.cancelled {
                self.finish_cancelled();
                return;
            }
            if let Some(error) = outcome.error {
                self.handle_provider_error(error, outcome.text);
                return;
            }

            // Commit the assistant turn.
            let assistant = build_assistant_message(&outcome.text, &outcome.tool_calls);
            if !assistant.content.is_empty() {
                self.push_message(assistant);
            }

            if let Some(counter) = &self.token_counter {
                counter.update(outcome.usage.input_tokens, outcome.usage.output_tokens);
            }
            self.sink.emit(AgentEvent::Usage {
                input_tokens: outcome.usage.input_tokens,
                output_tokens: outcome.usage.output_tokens,
            });

            if outcome.stop_reason != StopReason::ToolUse || outcome.tool_calls.is_empty() {
                info!(tool_rounds, "turn complete");
                self.sink.emit(AgentEvent::Done);
                self.sink.finish_complete();
                return;
            }

            // Tool round.
            let Some(results) = executor::execute_tools(
                &outcome.tool_calls,
                &self.registry,
                &emit,
                &mut self.cancel,
            )
            .await
            else {
                self.finish_cancelled();
                return;
            };
            self.push_message(ModelMessage::user(results));

            tool_rounds += 1;
            if tool_rounds >= self.config.max_tool_iterations {
                warn!(
                    tool_rounds,
                    cap = self.config.max_tool_iterations,
                    "tool iteration cap reached"
                );
                self.push_message(ModelMessage::assistant_text(format!(
                    "Stopping: reached the limit of {} tool rounds for this request. \
                     Ask me to continue if more work is needed.",
                    self.config.max_tool_iterations
                )));
                self.sink.emit(AgentEvent::Error {
                    kind: "iteration_cap".into(),
                    message: format!(
                        "tool iteration cap of {} reached",
                        self.config.max_tool_iterations
                    ),
                });
                self.sink.emit(AgentEvent::Done);
                self.sink.finish_complete();
                return;
            }
        }
    }

    async fn maybe_compact(&self, compactor: &Compactor) {
        let Some(counter) = &self.token_counter else {
            return;
        };
        let fraction = counter.usage_fraction(self.config.context_window);
        if fraction < self.config.compact_threshold {
            return;
        }

        self.sink.emit(AgentEvent::CompactStart);
        let mut conversation = self.snapshot();
        let did_compact = compactor.compact(&mut conversation, fraction).await;
        if did_compact {
            *self.conversation.lock().expect("conversation poisoned") = conversation;
        }
        self.sink.emit(AgentEvent::CompactEnd);
    }

    fn build_request(&self) -> CompletionRequest {
        CompletionRequest {
            model: self.config.model.clone(),
            messages: self.snapshot(),
            system: self.render_system_prompt(),
            tools: self.registry.definitions(),
            max_tokens: self.config.max_tokens,
            enable_caching: self.config.enable_prompt_caching,
        }
    }

    /// Base instructions plus the skill registry's phase 1/2 injections,
    /// re-rendered every turn.
    fn render_system_prompt(&self) -> String {
        let mut system = self.config.system_prompt.clone();
        if let Some(skills) = &self.skills {
            let skills = skills.read().expect("skill registry poisoned");
            if let Some(suffix) = skills.render() {
                system.push_str("\n\n");
                system.push_str(&suffix);
            }
        }
        system
    }

    fn retry_callback(&self) -> RetryCallback {
        let sink = self.sink.clone();
        Arc::new(move |attempt, error: &ProviderError| {
            sink.emit(AgentEvent::Retry {
                attempt,
                error: error.to_string(),
            });
        })
    }

    fn snapshot(&self) -> Vec<ModelMessage> {
        self.conversation.lock().expect("conversation poisoned").clone()
    }

    fn push_message(&self, message: ModelMessage) {
        self.conversation
            .lock()
            .expect("conversation poisoned")
            .push(message);
    }

    /// Provider failure policy: auth errors rewind the pending user turn
    /// so the caller can retry the same message; everything else keeps
    /// whatever assistant text already streamed (or rewinds when none
    /// arrived) so the conversation stays well-formed.
    fn handle_provider_error(&self, error: ProviderError, partial_text: String) {
        match &error {
            ProviderError::Auth(_) => {
                self.pop_trailing_user_turn();
            }
            _ => {
                if partial_text.is_empty() {
                    self.pop_trailing_user_turn();
                } else {
                    self.push_message(ModelMessage::assistant_text(partial_text));
                }
            }
        }

        warn!(kind = error.kind(), error = %error, "provider error ended the loop");
        self.sink.emit(AgentEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
        });
        self.sink.finish_failed(error.kind());
    }

    fn pop_trailing_user_turn(&self) {
        let mut conversation = self.conversation.lock().expect("conversation poisoned");
        if conversation.last().map(|m| m.role) == Some(Role::User) {
            conversation.pop();
        }
    }

    fn finish_cancelled(&self) {
        info!("loop cancelled");
        self.sink.emit(AgentEvent::Error {
            kind: "cancelled".into(),
            message: "stream cancelled by caller".into(),
        });
        self.sink.finish_failed("cancelled");
    }
}

fn build_assistant_message(text: &str, tool_calls: &[AiToolCall]) -> ModelMessage {
    let mut content = Vec::with_capacity(tool_calls.len() + usize::from(!text.is_empty()));
    if !text.is_empty() {
        content.push(Content::Text {
            text: text.to_string(),
        });
    }
    for call in tool_calls {
        content.push(Content::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.arguments.clone(),
        });
    }
    ModelMessage {
        role: Role::Assistant,
        content,
    }
}
