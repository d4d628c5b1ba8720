//! Agent Manager (C10): the top-level facade that owns provider factories,
//! active sessions keyed by `(user_id, chat_id)`, and the wiring between a
//! session's MCP client and its adapter/agent pair.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::adapter::{ContentMapperConfig, McpAdapter};
use crate::agent::{Agent, AgentResponse};
use crate::callbacks::Callbacks;
use crate::config::{AgentConfig, McpClientConfig};
use crate::error::{AgentError, ConfigError};
use crate::mcp::McpClient;
use crate::message::Message;
use crate::sampling::{Samplable, SessionLookup};
use crate::scheduler::{self, BlobRenderer, EntryRole, NoopBlobRenderer, Session, SessionHandle};

pub type AgentFactory = Arc<dyn Fn(&AgentConfig, Option<&Value>) -> Arc<dyn Agent> + Send + Sync>;

/// Named provider factories with optional per-provider default option
/// bundles, merged under caller-supplied overrides at session-creation
/// time.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, AgentFactory>,
    defaults: HashMap<String, Value>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: impl Into<String>, factory: AgentFactory, default_options: Option<Value>) {
        let provider = provider.into();
        if let Some(options) = default_options {
            self.defaults.insert(provider.clone(), options);
        }
        self.factories.insert(provider, factory);
    }

    fn build(&self, provider: &str, config: &AgentConfig, overrides: Option<&Value>) -> Result<Arc<dyn Agent>, ConfigError> {
        let factory = self
            .factories
            .get(provider)
            .ok_or_else(|| ConfigError::Message(format!("unknown provider '{}'", provider)))?;

        let options = match (self.defaults.get(provider), overrides) {
            (Some(defaults), Some(overrides)) => Some(merge_json(defaults.clone(), overrides.clone())),
            (Some(defaults), None) => Some(defaults.clone()),
            (None, Some(overrides)) => Some(overrides.clone()),
            (None, None) => None,
        };

        Ok(factory(config, options.as_ref()))
    }
}

fn merge_json(mut base: Value, overrides: Value) -> Value {
    if let (Value::Object(base_map), Value::Object(override_map)) = (&mut base, overrides) {
        for (k, v) in override_map {
            base_map.insert(k, v);
        }
    }
    base
}

fn session_key(user_id: &str, chat_id: &str) -> String {
    format!("{}:{}", user_id, chat_id)
}

pub struct AgentManager {
    registry: ProviderRegistry,
    sessions: Mutex<HashMap<String, SessionHandle>>,
    callbacks: Callbacks,
    system_prompt: Option<String>,
    blob_renderer: Arc<dyn BlobRenderer>,
}

impl AgentManager {
    pub fn new(registry: ProviderRegistry, callbacks: Callbacks, system_prompt: Option<String>) -> Self {
        Self {
            registry,
            sessions: Mutex::new(HashMap::new()),
            callbacks,
            system_prompt,
            blob_renderer: Arc::new(NoopBlobRenderer),
        }
    }

    pub fn with_blob_renderer(mut self, renderer: Arc<dyn BlobRenderer>) -> Self {
        self.blob_renderer = renderer;
        self
    }

    /// Creates a session if one doesn't already exist for `(user_id,
    /// chat_id)`; idempotent (I1) — returns the existing session id without
    /// re-creating anything when a session is already active.
    pub async fn create_session(
        &self,
        user_id: &str,
        chat_id: &str,
        provider: &str,
        agent_config: AgentConfig,
        mcp_config: McpClientConfig,
        provider_overrides: Option<&Value>,
    ) -> Result<String, ConfigError> {
        let key = session_key(user_id, chat_id);
        if let Some(handle) = self.sessions.lock().expect("lock poisoned").get(&key) {
            return Ok(handle.session.session_id.clone());
        }

        let agent = self.registry.build(provider, &agent_config, provider_overrides)?;
        if let Some(system_prompt) = &self.system_prompt {
            agent.set_system_prompt(system_prompt);
        }

        let adapter = Arc::new(McpAdapter::new(ContentMapperConfig {
            supports_vision: agent_config.supports_vision,
            inline_blob_mime_types: ContentMapperConfig::default_inline_mimes(),
            max_inline_blob_size: 512_000,
        }));

        let mcp_client = Arc::new(
            McpClient::connect(&mcp_config)
                .await
                .map_err(|e| ConfigError::Message(e.to_string()))?,
        );

        let session_id = uuid::Uuid::new_v4().to_string();

        let handle = scheduler::spawn_session(
            session_id.clone(),
            user_id.to_string(),
            chat_id.to_string(),
            provider.to_string(),
            Arc::clone(&agent),
            Arc::clone(&adapter),
            Arc::clone(&mcp_client),
            self.callbacks.clone(),
            Arc::clone(&self.blob_renderer),
        );

        let hook_session = Arc::clone(&handle.session);
        let hook_adapter = Arc::clone(&adapter);
        let hook_agent = Arc::clone(&agent);
        mcp_client.set_on_capabilities_changed(Arc::new(move |tools, prompts, resources| {
            let summary = hook_adapter.update_capabilities(tools.to_vec(), prompts.to_vec(), resources.to_vec());
            hook_agent.set_active_tools(hook_adapter.to_backend_tools());
            if let Some(summary) = summary {
                // Rides on the next send_message or post-turn commit (I6) — not
                // committed here directly.
                hook_session.append_pending(Value::String(summary), EntryRole::Tool);
            }
        }));

        mcp_client.refresh_capabilities().await;

        self.sessions.lock().expect("lock poisoned").insert(key, handle);
        Ok(session_id)
    }

    pub fn send_message(&self, user_id: &str, chat_id: &str, text: &str) {
        let key = session_key(user_id, chat_id);
        if let Some(handle) = self.sessions.lock().expect("lock poisoned").get(&key) {
            handle.session.send_user_message(text);
        }
    }

    pub async fn end_session(&self, user_id: &str, chat_id: &str) {
        let key = session_key(user_id, chat_id);
        let handle = self.sessions.lock().expect("lock poisoned").remove(&key);
        if let Some(handle) = handle {
            handle.session.deactivate();
            let _ = handle.worker.await;
        }
    }

    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = {
            let mut sessions = self.sessions.lock().expect("lock poisoned");
            sessions.drain().map(|(_, handle)| handle).collect()
        };

        let waiters = handles.into_iter().map(|handle| async move {
            handle.session.deactivate();
            let _ = handle.worker.await;
        });
        futures::future::join_all(waiters).await;
    }
}

#[async_trait]
impl Samplable for Session {
    fn model(&self) -> String {
        self.agent.config().model.clone()
    }

    fn supports_sampling(&self) -> bool {
        self.agent.supports_sampling()
    }

    async fn sample_once(&self, messages: &[Message]) -> Result<AgentResponse, AgentError> {
        self.agent.generate_response_sync(messages).await
    }
}

impl SessionLookup for AgentManager {
    fn find(&self, session_key: &str) -> Option<Arc<dyn Samplable>> {
        let sessions = self.sessions.lock().expect("lock poisoned");
        let handle = sessions.get(session_key)?;
        if handle.session.is_active() {
            Some(Arc::clone(&handle.session) as Arc<dyn Samplable>)
        } else {
            None
        }
    }
}
