//! Sampling Gateway (C8): a global-concurrency-capped entry point letting
//! MCP servers ask a session's model for a one-shot completion
//! ("sampling" in MCP terms), independent of that session's own turn
//! queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::agent::AgentResponse;
use crate::error::{AgentError, SamplingError};
use crate::message::Message;

#[derive(Clone, Debug, Default)]
pub struct SamplingMessage {
    pub role: String,
    pub text: String,
}

#[derive(Clone, Debug, Default)]
pub struct SamplingParams {
    pub system_prompt: Option<String>,
    pub messages: Vec<SamplingMessage>,
}

#[derive(Clone, Debug)]
pub struct SamplingResult {
    pub role: &'static str,
    pub content: String,
    pub model: String,
    pub stop_reason: Option<String>,
}

/// The session-facing surface the gateway needs: enough to build and run a
/// one-shot completion without depending on the scheduler's session type
/// directly.
#[async_trait]
pub trait Samplable: Send + Sync {
    fn model(&self) -> String;
    fn supports_sampling(&self) -> bool;
    async fn sample_once(&self, messages: &[Message]) -> Result<AgentResponse, AgentError>;
}

/// Looks a session up by its `"{user_id}:{chat_id}"` key, filtering out
/// sessions that are no longer active. Implemented by the Manager so this
/// module never depends on it directly.
pub trait SessionLookup: Send + Sync {
    fn find(&self, session_key: &str) -> Option<Arc<dyn Samplable>>;
}

#[derive(Default)]
pub struct SamplingCounters {
    inflight: AtomicU64,
    completed: AtomicU64,
    rejected: AtomicU64,
}

impl SamplingCounters {
    pub fn inflight(&self) -> u64 {
        self.inflight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }
}

pub struct SamplingGateway {
    sessions: Arc<dyn SessionLookup>,
    semaphore: Arc<Semaphore>,
    request_timeout: Duration,
    counters: SamplingCounters,
}

impl SamplingGateway {
    pub fn new(sessions: Arc<dyn SessionLookup>, max_concurrency: usize, request_timeout: Duration) -> Self {
        Self {
            sessions,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            request_timeout,
            counters: SamplingCounters::default(),
        }
    }

    pub fn counters(&self) -> &SamplingCounters {
        &self.counters
    }

    /// Runs one sampling request end to end. `completed`/`rejected` are
    /// mutually exclusive per call: every rejection path returns before
    /// `inflight` is ever incremented, and `completed` is only incremented
    /// on the single success path.
    pub async fn sample(&self, session_key: &str, params: SamplingParams) -> Result<SamplingResult, SamplingError> {
        let session = match self.sessions.find(session_key) {
            Some(s) => s,
            None => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                return Err(SamplingError::UnknownSession(session_key.to_string()));
            }
        };

        if !session.supports_sampling() {
            self.counters.rejected.fetch_add(1, Ordering::SeqCst);
            return Err(SamplingError::UnsupportedProvider(session_key.to_string()));
        }

        let messages = match to_provider_messages(&params) {
            Ok(m) => m,
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };

        let _permit = self.semaphore.acquire().await.expect("semaphore closed");
        self.counters.inflight.fetch_add(1, Ordering::SeqCst);
        let outcome = tokio::time::timeout(self.request_timeout, session.sample_once(&messages)).await;
        self.counters.inflight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Ok(Ok(response)) => {
                self.counters.completed.fetch_add(1, Ordering::SeqCst);
                Ok(SamplingResult {
                    role: "assistant",
                    content: response.content.trim().to_string(),
                    model: session.model(),
                    stop_reason: None,
                })
            }
            Ok(Err(e)) => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                Err(SamplingError::InvalidRequest(e.to_string()))
            }
            Err(_elapsed) => {
                self.counters.rejected.fetch_add(1, Ordering::SeqCst);
                Err(SamplingError::Timeout)
            }
        }
    }
}

fn to_provider_messages(params: &SamplingParams) -> Result<Vec<Message>, SamplingError> {
    if params.messages.is_empty() {
        return Err(SamplingError::InvalidRequest("sampling request has no messages".to_string()));
    }

    let mut messages = Vec::with_capacity(params.messages.len() + 1);
    if let Some(system_prompt) = &params.system_prompt {
        messages.push(role_message("system", system_prompt)?);
    }
    for m in &params.messages {
        messages.push(role_message(&m.role, &m.text)?);
    }
    Ok(messages)
}

fn role_message(role: &str, text: &str) -> Result<Message, SamplingError> {
    use crate::message::Role;
    let role = match role {
        "user" => Role::User,
        "assistant" => Role::Assistant,
        "system" => Role::System,
        "tool" => Role::Tool,
        other => return Err(SamplingError::InvalidRequest(format!("unknown sampling message role '{}'", other))),
    };
    Ok(Message {
        role,
        content: text.to_string(),
        images: vec![],
        thinking: None,
        tool_calls: vec![],
        name: None,
    })
}
