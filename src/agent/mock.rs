use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::fingerprint::fingerprint;
use crate::message::Message;

use super::{Agent, AgentResponse, StreamChunk};

/// Scriptable agent with no network calls: a fixed sync response and a
/// scripted chunk sequence, set before each call under test.
pub struct MockAgent {
    config: AgentConfig,
    history: Mutex<Vec<Message>>,
    active_tools: Mutex<Vec<Value>>,
    sync_response: Mutex<AgentResponse>,
    stream_chunks: Mutex<Vec<StreamChunk>>,
}

impl MockAgent {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            history: Mutex::new(Vec::new()),
            active_tools: Mutex::new(Vec::new()),
            sync_response: Mutex::new(AgentResponse::default()),
            stream_chunks: Mutex::new(Vec::new()),
        }
    }

    pub fn set_sync_response(&self, response: AgentResponse) {
        *self.sync_response.lock().expect("lock poisoned") = response;
    }

    pub fn set_stream_chunks(&self, chunks: Vec<StreamChunk>) {
        *self.stream_chunks.lock().expect("lock poisoned") = chunks;
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn history(&self) -> Vec<Message> {
        self.history.lock().expect("lock poisoned").clone()
    }

    fn replace_history(&self, messages: Vec<Message>) {
        *self.history.lock().expect("lock poisoned") = messages;
    }

    fn set_active_tools(&self, tools: Vec<Value>) {
        *self.active_tools.lock().expect("lock poisoned") = tools;
    }

    fn active_tools(&self) -> Vec<Value> {
        self.active_tools.lock().expect("lock poisoned").clone()
    }

    async fn generate_response_sync(&self, new_messages: &[Message]) -> Result<AgentResponse, AgentError> {
        for m in new_messages {
            self.add_message(m.clone());
        }
        let response = self.sync_response.lock().expect("lock poisoned").clone();
        self.add_message(self.make_assistant_message(
            &response.content,
            response.thinking.clone(),
            response.tool_calls.clone(),
        ));
        Ok(response)
    }

    async fn generate_response_stream(
        &self,
        new_messages: &[Message],
        chunk_tx: mpsc::Sender<StreamChunk>,
    ) -> Result<AgentResponse, AgentError> {
        for m in new_messages {
            self.add_message(m.clone());
        }

        let chunks = self.stream_chunks.lock().expect("lock poisoned").clone();
        let mut seen: HashSet<String> = HashSet::new();
        let mut final_content = String::new();
        let mut final_thinking: Option<String> = None;
        let mut all_tool_calls = Vec::new();

        for chunk in chunks {
            if let Some(content) = &chunk.content_cumulative {
                final_content = content.clone();
            }
            if let Some(thinking) = &chunk.thinking_cumulative {
                final_thinking = Some(thinking.clone());
            }

            let mut to_emit = chunk.clone();
            if let Some(calls) = &chunk.new_tool_calls {
                let mut fresh = Vec::new();
                for call in calls {
                    if seen.insert(fingerprint(call)) {
                        fresh.push(call.clone());
                        all_tool_calls.push(call.clone());
                    }
                }
                to_emit.new_tool_calls = if fresh.is_empty() { None } else { Some(fresh) };
            }

            let _ = chunk_tx.send(to_emit).await;
        }

        self.add_message(self.make_assistant_message(
            &final_content,
            final_thinking.clone(),
            all_tool_calls.clone(),
        ));

        Ok(AgentResponse {
            thinking: final_thinking,
            content: final_content,
            tool_calls: all_tool_calls,
        })
    }
}
