use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderValue;
use serde_json::Value;

use crate::error::McpError;

use super::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

pub const MCP_PROTOCOL_VERSION: &str = "2025-11-25";

/// The outcome of one JSON-RPC request: either a result payload or a
/// server-reported error, both distinct from a transport-level failure
/// (which surfaces as `Err(McpError)`).
#[derive(Clone, Debug)]
pub enum McpOutcome {
    Result(Value),
    Error { code: i64, message: String },
}

#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn request(&self, id: Value, method: &str, params: Value) -> Result<McpOutcome, McpError>;
}

/// Streamable HTTP transport: JSON-RPC 2.0 requests POSTed to a single
/// endpoint, whose response is either a plain JSON body or a short-lived
/// `text/event-stream`. The only transport this crate implements; `sse` and
/// `streamable_http` are both accepted as config aliases for it.
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: Vec<(String, String)>,
    session_id: Mutex<Option<String>>,
}

impl HttpTransport {
    pub async fn connect(url: String, headers: Vec<(String, String)>, timeout: Duration) -> Result<Self, McpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let transport = Self {
            client,
            url,
            headers,
            session_id: Mutex::new(None),
        };
        transport.initialize().await?;
        Ok(transport)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let request = JsonRpcRequest::new(
            Value::from(0),
            "initialize",
            serde_json::json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "shuttle", "version": env!("CARGO_PKG_VERSION")},
            }),
        );

        let response = self.send(&request).await?;

        if let Some(session_header) = response.headers().get("MCP-Session-Id") {
            if let Ok(value) = session_header.to_str() {
                *self.session_id.lock().expect("lock poisoned") = Some(value.to_string());
            }
        }

        if response.status().as_u16() == 202 {
            // server acknowledged with no body
        } else {
            let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).cloned();
            let body = response.text().await.map_err(|e| McpError::Transport(e.to_string()))?;
            parse_json_rpc_body(&body, content_type.as_ref())?;
        }

        let notification = JsonRpcNotification::new("notifications/initialized", serde_json::json!({}));
        let mut post = self.client.post(&self.url).json(&notification);
        post = self.apply_headers(post);
        post.send().await.map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(())
    }

    fn apply_headers(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        builder = builder.header("MCP-Protocol-Version", MCP_PROTOCOL_VERSION);
        if let Some(session_id) = self.session_id.lock().expect("lock poisoned").clone() {
            builder = builder.header("MCP-Session-Id", session_id);
        }
        builder
    }

    async fn send(&self, request: &JsonRpcRequest) -> Result<reqwest::Response, McpError> {
        let mut post = self.client.post(&self.url).json(request);
        post = self.apply_headers(post);
        post.send().await.map_err(|e| McpError::Transport(e.to_string()))
    }
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, id: Value, method: &str, params: Value) -> Result<McpOutcome, McpError> {
        let request = JsonRpcRequest::new(id, method, params);
        let response = self.send(&request).await?;
        let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).cloned();
        let body = response.text().await.map_err(|e| McpError::Transport(e.to_string()))?;
        let parsed = parse_json_rpc_body(&body, content_type.as_ref())?;

        match parsed.error {
            Some(e) => Ok(McpOutcome::Error { code: e.code, message: e.message }),
            None => Ok(McpOutcome::Result(parsed.result.unwrap_or(Value::Null))),
        }
    }
}

/// Parses a JSON-RPC response body, which may be a plain JSON object or a
/// `text/event-stream` carrying one or more `data: ...` lines.
pub fn parse_json_rpc_body(body: &str, content_type: Option<&HeaderValue>) -> Result<JsonRpcResponse, McpError> {
    let is_event_stream = content_type
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("text/event-stream"))
        .unwrap_or(false);

    if !is_event_stream {
        return serde_json::from_str(body).map_err(|e| McpError::Transport(format!("invalid json-rpc body: {}", e)));
    }

    let mut buffer = String::new();
    for line in body.lines() {
        if let Some(data) = line.strip_prefix("data: ") {
            if data == "[DONE]" {
                break;
            }
            buffer.push_str(data);
            if let Some(response) = try_parse(&buffer) {
                return Ok(response);
            }
        } else if line.is_empty() {
            if let Some(response) = try_parse(&buffer) {
                return Ok(response);
            }
            buffer.clear();
        }
    }

    if let Some(response) = try_parse(&buffer) {
        return Ok(response);
    }

    Err(McpError::Transport("no json-rpc response found in event stream".to_string()))
}

fn try_parse(buffer: &str) -> Option<JsonRpcResponse> {
    if buffer.is_empty() {
        return None;
    }
    let response: JsonRpcResponse = serde_json::from_str(buffer).ok()?;
    if response.result.is_some() || response.error.is_some() {
        Some(response)
    } else {
        None
    }
}
