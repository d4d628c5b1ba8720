//! MCP Client (C6): a capability-caching JSON-RPC client over the
//! Streamable HTTP transport, with dirty-flag-driven refresh and a hook
//! fired whenever a refresh actually changes the catalog.

pub mod jsonrpc;
pub mod transport;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::capability::{Prompt, PromptArgument, Resource, Tool};
use crate::config::McpClientConfig;
use crate::error::McpError;

use transport::{HttpTransport, McpOutcome, McpTransport};

pub type CapabilitiesChangedHook = Arc<dyn Fn(&[Tool], &[Prompt], &[Resource]) + Send + Sync>;

pub struct McpClient {
    transport: Arc<dyn McpTransport>,
    tools_cache: Mutex<Vec<Tool>>,
    prompts_cache: Mutex<Vec<Prompt>>,
    resources_cache: Mutex<Vec<Resource>>,
    tools_dirty: AtomicBool,
    prompts_dirty: AtomicBool,
    resources_dirty: AtomicBool,
    next_id: AtomicU64,
    on_capabilities_changed: Mutex<Option<CapabilitiesChangedHook>>,
}

impl McpClient {
    pub fn new(transport: Arc<dyn McpTransport>) -> Self {
        Self {
            transport,
            tools_cache: Mutex::new(Vec::new()),
            prompts_cache: Mutex::new(Vec::new()),
            resources_cache: Mutex::new(Vec::new()),
            tools_dirty: AtomicBool::new(true),
            prompts_dirty: AtomicBool::new(true),
            resources_dirty: AtomicBool::new(true),
            next_id: AtomicU64::new(1),
            on_capabilities_changed: Mutex::new(None),
        }
    }

    pub async fn connect(config: &McpClientConfig) -> Result<Self, McpError> {
        if config.transport != "sse" && config.transport != "streamable_http" {
            return Err(McpError::UnsupportedTransport(config.transport.clone()));
        }
        let url = config
            .url
            .clone()
            .ok_or_else(|| McpError::Transport("McpClientConfig.url is required for the http transport".to_string()))?;

        let mut headers = Vec::new();
        if let Some(token) = &config.auth_token {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        let transport = HttpTransport::connect(url, headers, config.timeout()).await?;
        Ok(Self::new(Arc::new(transport)))
    }

    pub fn set_on_capabilities_changed(&self, hook: CapabilitiesChangedHook) {
        *self.on_capabilities_changed.lock().expect("lock poisoned") = Some(hook);
    }

    pub fn mark_tools_dirty(&self) {
        self.tools_dirty.store(true, Ordering::SeqCst);
    }

    pub fn mark_prompts_dirty(&self) {
        self.prompts_dirty.store(true, Ordering::SeqCst);
    }

    pub fn mark_resources_dirty(&self) {
        self.resources_dirty.store(true, Ordering::SeqCst);
    }

    pub fn handle_notification(&self, method: &str) {
        match method {
            "notifications/tools/list_changed" => self.mark_tools_dirty(),
            "notifications/prompts/list_changed" => self.mark_prompts_dirty(),
            "notifications/resources/list_changed" => self.mark_resources_dirty(),
            other => tracing::debug!(method = other, "unhandled mcp notification"),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    async fn raw_list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let id = self.next_request_id();
        let outcome = self.transport.request(Value::from(id), "tools/list", serde_json::json!({})).await?;
        match outcome {
            McpOutcome::Result(value) => Ok(parse_tools(&value)),
            McpOutcome::Error { code, message } => Err(McpError::JsonRpc { code, message }),
        }
    }

    async fn raw_list_prompts(&self) -> Result<Vec<Prompt>, McpError> {
        let id = self.next_request_id();
        let outcome = self.transport.request(Value::from(id), "prompts/list", serde_json::json!({})).await?;
        match outcome {
            McpOutcome::Result(value) => Ok(parse_prompts(&value)),
            McpOutcome::Error { code, message } => Err(McpError::JsonRpc { code, message }),
        }
    }

    async fn raw_list_resources(&self) -> Result<Vec<Resource>, McpError> {
        let id = self.next_request_id();
        let outcome = self.transport.request(Value::from(id), "resources/list", serde_json::json!({})).await?;
        match outcome {
            McpOutcome::Result(value) => Ok(parse_resources(&value)),
            McpOutcome::Error { code, message } => Err(McpError::JsonRpc { code, message }),
        }
    }

    /// Re-fetches any catalog currently marked dirty, updates the cache on
    /// success, and (only if at least one catalog actually refreshed) fires
    /// the capabilities-changed hook with the full, current catalog triple.
    /// A failed refresh restores the dirty flag so the next call retries.
    pub async fn refresh_capabilities(&self) {
        let mut fetched_any = false;

        if self.tools_dirty.swap(false, Ordering::SeqCst) {
            match self.raw_list_tools().await {
                Ok(tools) => {
                    *self.tools_cache.lock().expect("lock poisoned") = tools;
                    fetched_any = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to refresh tool catalog");
                    self.tools_dirty.store(true, Ordering::SeqCst);
                }
            }
        }

        if self.prompts_dirty.swap(false, Ordering::SeqCst) {
            match self.raw_list_prompts().await {
                Ok(prompts) => {
                    *self.prompts_cache.lock().expect("lock poisoned") = prompts;
                    fetched_any = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to refresh prompt catalog");
                    self.prompts_dirty.store(true, Ordering::SeqCst);
                }
            }
        }

        if self.resources_dirty.swap(false, Ordering::SeqCst) {
            match self.raw_list_resources().await {
                Ok(resources) => {
                    *self.resources_cache.lock().expect("lock poisoned") = resources;
                    fetched_any = true;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to refresh resource catalog");
                    self.resources_dirty.store(true, Ordering::SeqCst);
                }
            }
        }

        if fetched_any {
            if let Some(hook) = self.on_capabilities_changed.lock().expect("lock poisoned").clone() {
                let tools = self.tools_cache.lock().expect("lock poisoned").clone();
                let prompts = self.prompts_cache.lock().expect("lock poisoned").clone();
                let resources = self.resources_cache.lock().expect("lock poisoned").clone();
                hook(&tools, &prompts, &resources);
            }
        }
    }

    pub async fn list_tools(&self) -> Vec<Tool> {
        self.refresh_capabilities().await;
        self.tools_cache.lock().expect("lock poisoned").clone()
    }

    pub async fn list_prompts(&self) -> Vec<Prompt> {
        self.refresh_capabilities().await;
        self.prompts_cache.lock().expect("lock poisoned").clone()
    }

    pub async fn list_resources(&self) -> Vec<Resource> {
        self.refresh_capabilities().await;
        self.resources_cache.lock().expect("lock poisoned").clone()
    }

    async fn call_tool(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::Transport("tools/call requires a 'name' parameter".to_string()))?;
        let id = self.next_request_id();
        let outcome = self
            .transport
            .request(Value::from(id), "tools/call", serde_json::json!({"name": name, "arguments": params.get("arguments").cloned().unwrap_or(serde_json::json!({}))}))
            .await?;
        outcome_to_result(outcome)
    }

    async fn get_prompt(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::Transport("prompts/get requires a 'name' parameter".to_string()))?;
        let id = self.next_request_id();
        let outcome = self
            .transport
            .request(Value::from(id), "prompts/get", serde_json::json!({"name": name, "arguments": params.get("arguments").cloned().unwrap_or(serde_json::json!({}))}))
            .await?;
        outcome_to_result(outcome)
    }

    async fn read_resource(&self, params: &Value) -> Result<Value, McpError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::Transport("resources/read requires a 'uri' parameter".to_string()))?;
        let id = self.next_request_id();
        let outcome = self.transport.request(Value::from(id), "resources/read", serde_json::json!({"uri": uri})).await?;
        outcome_to_result(outcome)
    }

    /// Dispatches one JSON-RPC request and always returns `Ok`: every
    /// failure mode (missing method, unrecognized method, transport error,
    /// server-reported error) is folded into `{"error": "..."}` so the
    /// scheduler never needs a distinct error path for this call.
    pub async fn execute_json_rpc(&self, request: &Value) -> Value {
        let method = match request.get("method").and_then(Value::as_str) {
            Some(m) => m,
            None => return serde_json::json!({"error": "request is missing a 'method' field"}),
        };
        let params = request.get("params").cloned().unwrap_or(serde_json::json!({}));

        let result = match method {
            "tools/call" => self.call_tool(&params).await,
            "prompts/get" => self.get_prompt(&params).await,
            "resources/read" => self.read_resource(&params).await,
            "tools/list" => self.raw_list_tools().await.map(|v| serde_json::json!({"tools": v})),
            "prompts/list" => self.raw_list_prompts().await.map(|v| serde_json::json!({"prompts": v})),
            "resources/list" => self.raw_list_resources().await.map(|v| serde_json::json!({"resources": v})),
            other => Err(McpError::Transport(format!("unrecognized method '{}'", other))),
        };

        self.refresh_capabilities().await;

        match result {
            Ok(value) => value,
            Err(e) => serde_json::json!({"error": e.to_string()}),
        }
    }
}

fn outcome_to_result(outcome: McpOutcome) -> Result<Value, McpError> {
    match outcome {
        McpOutcome::Result(value) => Ok(value),
        McpOutcome::Error { code, message } => Err(McpError::JsonRpc { code, message }),
    }
}

fn parse_tools(value: &Value) -> Vec<Tool> {
    value
        .get("tools")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name").and_then(Value::as_str)?.to_string();
                    Some(Tool {
                        name,
                        description: item.get("description").and_then(Value::as_str).map(String::from),
                        input_schema: item.get("inputSchema").cloned().unwrap_or(serde_json::json!({"type": "object"})),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_prompts(value: &Value) -> Vec<Prompt> {
    value
        .get("prompts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let name = item.get("name").and_then(Value::as_str)?.to_string();
                    let arguments = item
                        .get("arguments")
                        .and_then(Value::as_array)
                        .map(|args| {
                            args.iter()
                                .filter_map(|a| {
                                    Some(PromptArgument {
                                        name: a.get("name").and_then(Value::as_str)?.to_string(),
                                        description: a.get("description").and_then(Value::as_str).map(String::from),
                                        required: a.get("required").and_then(Value::as_bool).unwrap_or(false),
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    Some(Prompt {
                        name,
                        description: item.get("description").and_then(Value::as_str).map(String::from),
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_resources(value: &Value) -> Vec<Resource> {
    value
        .get("resources")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let uri = item.get("uri").and_then(Value::as_str)?.to_string();
                    Some(Resource {
                        uri,
                        title: item.get("title").and_then(Value::as_str).map(String::from),
                        description: item.get("description").and_then(Value::as_str).map(String::from),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    struct StubTransport {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl McpTransport for StubTransport {
        async fn request(&self, _id: Value, method: &str, _params: Value) -> Result<McpOutcome, McpError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match method {
                "tools/list" => Ok(McpOutcome::Result(serde_json::json!({
                    "tools": [{"name": "echo", "description": "echoes", "inputSchema": {"type": "object"}}]
                }))),
                "prompts/list" => Ok(McpOutcome::Result(serde_json::json!({"prompts": []}))),
                "resources/list" => Ok(McpOutcome::Result(serde_json::json!({"resources": []}))),
                "tools/call" => Ok(McpOutcome::Result(serde_json::json!({"content": [{"type": "text", "text": "ok"}]}))),
                other => Err(McpError::Transport(format!("unexpected method {}", other))),
            }
        }
    }

    #[tokio::test]
    async fn list_tools_refreshes_a_dirty_catalog_once() {
        let transport = Arc::new(StubTransport { calls: AtomicUsize::new(0) });
        let client = McpClient::new(transport.clone());
        let tools = client.list_tools().await;
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let tools_again = client.list_tools().await;
        assert_eq!(tools_again.len(), 1);
    }

    #[tokio::test]
    async fn execute_json_rpc_never_raises_and_refreshes_catalogs_afterward() {
        let transport = Arc::new(StubTransport { calls: AtomicUsize::new(0) });
        let client = McpClient::new(transport);
        let result = client.execute_json_rpc(&serde_json::json!({"method": "tools/call", "params": {"name": "echo"}})).await;
        assert!(result.get("error").is_none());

        let missing_method = client.execute_json_rpc(&serde_json::json!({})).await;
        assert!(missing_method.get("error").is_some());
    }

    #[tokio::test]
    async fn connect_rejects_unsupported_transport_kinds() {
        let config = McpClientConfig {
            transport: "stdio".to_string(),
            ..McpClientConfig::default()
        };
        let err = McpClient::connect(&config).await.unwrap_err();
        assert!(matches!(err, McpError::UnsupportedTransport(_)));
    }
}
