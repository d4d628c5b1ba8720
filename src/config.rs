use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shared agent configuration used across providers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Target model identifier.
    pub model: String,
    /// Whether reasoning/thinking output should be requested and surfaced.
    #[serde(default)]
    pub thinking_enabled: bool,
    /// Whether responses are streamed.
    #[serde(default)]
    pub stream_enabled: bool,
    /// Optional path to a text file used as the system message. Loading it
    /// is the caller's responsibility; this crate only carries the path.
    #[serde(default)]
    pub system_prompt_path: Option<String>,
    /// Gates inline images in tool responses.
    #[serde(default)]
    pub supports_vision: bool,
    /// Provider-specific option bundle passed to the agent factory.
    #[serde(default)]
    pub options: Option<Value>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "default-model".to_string(),
            thinking_enabled: false,
            stream_enabled: false,
            system_prompt_path: None,
            supports_vision: false,
            options: None,
        }
    }
}

fn default_transport() -> String {
    "sse".to_string()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_sse_read_timeout_secs() -> u64 {
    300
}

/// Configuration for one MCP Client connection. Only `transport = "sse"`
/// (the streaming server-sent variant) is implemented by this crate; other
/// values are accepted here but rejected by `McpClient::connect` with a
/// clear unsupported-transport error.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McpClientConfig {
    pub name: String,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_sse_read_timeout_secs")]
    pub sse_read_timeout_secs: u64,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            transport: default_transport(),
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            url: None,
            auth_token: None,
            timeout_secs: default_timeout_secs(),
            sse_read_timeout_secs: default_sse_read_timeout_secs(),
        }
    }
}

impl McpClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sse_read_timeout(&self) -> Duration {
        Duration::from_secs(self.sse_read_timeout_secs)
    }
}
