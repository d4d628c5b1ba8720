//! Agent Contract (C7): a polymorphic interface with a message factory +
//! history discipline, plus two response generators (streaming/sync)
//! selected by `AgentConfig::stream_enabled`.
//!
//! Concrete model-provider SDKs are out of scope here; `mock` ships a
//! scriptable implementation for this crate's own tests and for downstream
//! callers' tests.

mod mock;

pub use mock::MockAgent;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::message::{Message, Role};

/// One chunk of a streaming response.
///
/// `content_cumulative`/`thinking_cumulative` carry the *cumulative* text
/// emitted so far for their respective channel (not a delta) — this is what
/// callbacks receive (§6) and what feeds back into provider-message
/// construction, so the two stay uniform.
#[derive(Clone, Debug, Default)]
pub struct StreamChunk {
    pub content_cumulative: Option<String>,
    pub thinking_cumulative: Option<String>,
    pub new_tool_calls: Option<Vec<Value>>,
}

/// The complete result of one turn's model call, streaming or not.
#[derive(Clone, Debug, Default)]
pub struct AgentResponse {
    pub thinking: Option<String>,
    pub content: String,
    pub tool_calls: Vec<Value>,
}

/// Abstract agent: provider-native message factory, history discipline, and
/// response generation. Implementations own their own history storage.
#[async_trait]
pub trait Agent: Send + Sync {
    fn config(&self) -> &AgentConfig;

    /// Current history, oldest first.
    fn history(&self) -> Vec<Message>;

    /// Replaces the whole history. Used by the default `add_message`/
    /// `reset`/`set_system_prompt` implementations below.
    fn replace_history(&self, messages: Vec<Message>);

    fn set_active_tools(&self, tools: Vec<Value>);
    fn active_tools(&self) -> Vec<Value>;

    /// Whether this agent exposes a non-streaming chat entry point the
    /// Sampling Gateway can use. Every `Agent` implementation has
    /// `generate_response_sync`, so the default is `true`; override to
    /// `false` for an agent that cannot safely be sampled out-of-band.
    fn supports_sampling(&self) -> bool {
        true
    }

    fn make_user_message(&self, content: &str, images: Option<Vec<String>>) -> Message {
        Message {
            role: Role::User,
            content: content.to_string(),
            images: images.unwrap_or_default(),
            thinking: None,
            tool_calls: vec![],
            name: None,
        }
    }

    fn make_system_message(&self, content: &str) -> Message {
        Message {
            role: Role::System,
            content: content.to_string(),
            images: vec![],
            thinking: None,
            tool_calls: vec![],
            name: None,
        }
    }

    fn make_tool_message(&self, content: &str, images: Option<Vec<String>>) -> Message {
        Message {
            role: Role::Tool,
            content: content.to_string(),
            images: images.unwrap_or_default(),
            thinking: None,
            tool_calls: vec![],
            name: None,
        }
    }

    fn make_assistant_message(
        &self,
        content: &str,
        thinking: Option<String>,
        tool_calls: Vec<Value>,
    ) -> Message {
        Message {
            role: Role::Assistant,
            content: content.to_string(),
            images: vec![],
            thinking,
            tool_calls,
            name: None,
        }
    }

    fn is_system_message(&self, message: &Message) -> bool {
        message.is_system()
    }

    /// Appends one message to history.
    fn add_message(&self, message: Message) {
        let mut history = self.history();
        history.push(message);
        self.replace_history(history);
    }

    /// Removes every history entry except the system message(s) (I4).
    fn reset(&self) {
        let history = self.history();
        let kept: Vec<Message> = history
            .into_iter()
            .filter(|m| self.is_system_message(m))
            .collect();
        self.replace_history(kept);
    }

    /// Upserts a system message at position 0 (I4). A no-op when `prompt` is
    /// empty.
    fn set_system_prompt(&self, prompt: &str) {
        if prompt.is_empty() {
            return;
        }
        let system_message = self.make_system_message(prompt);
        let mut history = self.history();
        if history.first().map(|m| self.is_system_message(m)).unwrap_or(false) {
            history[0] = system_message;
        } else {
            history.insert(0, system_message);
        }
        self.replace_history(history);
    }

    /// Non-streaming: ingest `new_messages` (appended to history), produce
    /// the complete response in one shot, and append an equivalent assistant
    /// history message.
    async fn generate_response_sync(&self, new_messages: &[Message]) -> Result<AgentResponse, AgentError>;

    /// Streaming: ingest `new_messages`, emit a finite sequence of chunks
    /// through `chunk_tx`, and append one assistant history message at
    /// end-of-stream with the full concatenated content/thinking/tool_calls.
    ///
    /// Tool-call deduplication by canonical fingerprint (only first-seen
    /// calls surfaced in a chunk's `new_tool_calls`) is this method's
    /// responsibility, not the scheduler's.
    async fn generate_response_stream(
        &self,
        new_messages: &[Message],
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<AgentResponse, AgentError>;
}
