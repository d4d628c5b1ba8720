//! Session Scheduler (C9): one worker task per session, a FIFO turn queue,
//! and an atomic commit-then-enqueue discipline for the pending entries a
//! turn accumulates while it runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::adapter::McpAdapter;
use crate::agent::Agent;
use crate::callbacks::Callbacks;
use crate::mcp::McpClient;

const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryRole {
    User,
    Tool,
    Assistant,
}

impl EntryRole {
    fn as_str(self) -> Option<&'static str> {
        match self {
            EntryRole::User => Some("user"),
            EntryRole::Tool => Some("tool"),
            EntryRole::Assistant => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnEntry {
    pub payload: Value,
    pub role: EntryRole,
}

pub type Turn = Vec<TurnEntry>;

/// Renders a non-inlined artifact (currently only blob artifacts) to text
/// for a post-turn `on_agent_response` callback. The default renders
/// nothing, leaving artifacts entirely out-of-band.
pub trait BlobRenderer: Send + Sync {
    fn render(&self, artifact: &Value) -> Option<String>;
}

pub struct NoopBlobRenderer;

impl BlobRenderer for NoopBlobRenderer {
    fn render(&self, _artifact: &Value) -> Option<String> {
        None
    }
}

pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub chat_id: String,
    pub provider: String,
    pub agent: Arc<dyn Agent>,
    pub adapter: Arc<McpAdapter>,
    pub mcp_client: Arc<McpClient>,
    pending: Mutex<Turn>,
    queue_tx: mpsc::UnboundedSender<Turn>,
    active: Arc<AtomicBool>,
}

impl Session {
    pub fn append_pending(&self, payload: Value, role: EntryRole) {
        self.pending.lock().expect("lock poisoned").push(TurnEntry { payload, role });
    }

    /// Atomically takes whatever has accumulated in `pending` and enqueues
    /// it as one turn. A no-op if nothing has accumulated.
    pub fn commit_pending(&self) {
        let turn = std::mem::take(&mut *self.pending.lock().expect("lock poisoned"));
        if !turn.is_empty() {
            let _ = self.queue_tx.send(turn);
        }
    }

    pub fn send_user_message(&self, text: &str) {
        self.append_pending(Value::String(text.to_string()), EntryRole::User);
        self.commit_pending();
    }

    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

pub struct SessionHandle {
    pub session: Arc<Session>,
    pub worker: JoinHandle<()>,
}

#[allow(clippy::too_many_arguments)]
pub fn spawn_session(
    session_id: String,
    user_id: String,
    chat_id: String,
    provider: String,
    agent: Arc<dyn Agent>,
    adapter: Arc<McpAdapter>,
    mcp_client: Arc<McpClient>,
    callbacks: Callbacks,
    blob_renderer: Arc<dyn BlobRenderer>,
) -> SessionHandle {
    let (queue_tx, queue_rx) = mpsc::unbounded_channel();
    let active = Arc::new(AtomicBool::new(true));

    let session = Arc::new(Session {
        session_id,
        user_id,
        chat_id,
        provider,
        agent,
        adapter,
        mcp_client,
        pending: Mutex::new(Vec::new()),
        queue_tx,
        active,
    });

    let worker_session = Arc::clone(&session);
    let worker = tokio::spawn(run_worker(worker_session, queue_rx, callbacks, blob_renderer));

    SessionHandle { session, worker }
}

async fn run_worker(
    session: Arc<Session>,
    mut queue_rx: mpsc::UnboundedReceiver<Turn>,
    callbacks: Callbacks,
    blob_renderer: Arc<dyn BlobRenderer>,
) {
    while session.is_active() {
        match tokio::time::timeout(DEQUEUE_TIMEOUT, queue_rx.recv()).await {
            Ok(Some(turn)) => {
                if let Err(e) = process_turn(&session, turn, &callbacks, blob_renderer.as_ref()).await {
                    tracing::warn!(session_id = %session.session_id, error = %e, "turn processing failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                session.commit_pending();
            }
            Ok(None) => break,
            Err(_elapsed) => continue,
        }
    }
}

async fn process_turn(
    session: &Session,
    turn: Turn,
    callbacks: &Callbacks,
    blob_renderer: &dyn BlobRenderer,
) -> Result<(), crate::error::AgentError> {
    if turn.is_empty() {
        return Ok(());
    }

    let mut all_messages = Vec::new();
    for entry in &turn {
        let (messages, artifacts) = session
            .adapter
            .build_provider_messages(session.agent.as_ref(), std::slice::from_ref(&entry.payload), entry.role.as_str());

        if entry.role == EntryRole::Tool {
            for message in &messages {
                if !message.content.is_empty() {
                    if let Some(cb) = &callbacks.on_tool_response {
                        cb(&session.user_id, &session.chat_id, &message.content);
                    }
                }
            }
            for artifact in &artifacts {
                if artifact.get("kind").and_then(Value::as_str) == Some("blob") {
                    if let Some(text) = blob_renderer.render(artifact) {
                        if let Some(cb) = &callbacks.on_agent_response {
                            cb(&session.user_id, &session.chat_id, &text);
                        }
                    }
                }
            }
        }

        all_messages.extend(messages);
    }

    let mut dispatched_requests: Vec<Value> = Vec::new();
    let thinking: Option<String>;
    let final_content: String;

    if session.agent.config().stream_enabled {
        let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::channel(32);
        let agent = Arc::clone(&session.agent);
        let messages_for_task = all_messages.clone();
        let task = tokio::spawn(async move { agent.generate_response_stream(&messages_for_task, chunk_tx).await });

        while let Some(chunk) = chunk_rx.recv().await {
            if let Some(content) = &chunk.content_cumulative {
                if let Some(cb) = &callbacks.on_agent_response {
                    cb(&session.user_id, &session.chat_id, content);
                }
            }
            if session.agent.config().thinking_enabled {
                if let Some(thinking) = &chunk.thinking_cumulative {
                    if let Some(cb) = &callbacks.on_agent_thinking {
                        cb(&session.user_id, &session.chat_id, thinking);
                    }
                }
            }
            if let Some(calls) = &chunk.new_tool_calls {
                for call in calls {
                    dispatch_tool_call(session, call, callbacks, &mut dispatched_requests).await;
                }
            }
        }

        let response = task
            .await
            .map_err(|e| crate::error::AgentError::Protocol(e.to_string()))??;
        thinking = response.thinking;
        final_content = response.content;
    } else {
        let response = session.agent.generate_response_sync(&all_messages).await?;
        for call in &response.tool_calls {
            dispatch_tool_call(session, call, callbacks, &mut dispatched_requests).await;
        }
        thinking = response.thinking;
        final_content = response.content;
    }

    if let Some(cb) = &callbacks.on_agent_completion {
        let rpc_calls = if dispatched_requests.is_empty() { None } else { Some(dispatched_requests.as_slice()) };
        cb(&session.user_id, &session.chat_id, thinking.as_deref(), Some(final_content.as_str()), rpc_calls);
    }

    Ok(())
}

async fn dispatch_tool_call(session: &Session, call: &Value, callbacks: &Callbacks, dispatched_requests: &mut Vec<Value>) {
    let (requests, diagnostic) = session.adapter.adapt_model_call_to_mcp(Some(call));

    for request in &requests {
        if let Some(cb) = &callbacks.on_agent_tool_call {
            let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
            let params = request.get("params").cloned().unwrap_or(Value::Null);
            cb(&session.user_id, &session.chat_id, method, &params);
        }
        let result = session.mcp_client.execute_json_rpc(request).await;
        session.append_pending(result, EntryRole::Tool);
        dispatched_requests.push(request.clone());
    }

    if let Some(message) = diagnostic {
        session.append_pending(Value::String(message), EntryRole::Tool);
    }
}
