//! End-to-end scenarios driving the full Adapter → Scheduler → MCP Client
//! path through `MockAgent` and a stub transport, with no real network I/O.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;

use shuttle::adapter::{ContentMapperConfig, McpAdapter};
use shuttle::agent::{Agent, AgentResponse, MockAgent, StreamChunk};
use shuttle::callbacks::Callbacks;
use shuttle::capability::{Resource, Tool};
use shuttle::config::AgentConfig;
use shuttle::error::McpError;
use shuttle::mcp::transport::{McpOutcome, McpTransport};
use shuttle::mcp::McpClient;
use shuttle::sampling::{Samplable, SamplingGateway, SamplingMessage, SamplingParams, SessionLookup};
use shuttle::scheduler::{self, EntryRole, NoopBlobRenderer, SessionHandle};

/// A stub MCP transport scripted per test: each variant of `Script` answers
/// a fixed set of methods.
struct ScriptedTransport {
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    call_tool_response: Value,
    calls: StdMutex<Vec<(String, Value)>>,
}

impl ScriptedTransport {
    fn new(tools: Vec<Tool>, resources: Vec<Resource>, call_tool_response: Value) -> Self {
        Self {
            tools,
            resources,
            call_tool_response,
            calls: StdMutex::new(Vec::new()),
        }
    }

    fn recorded_calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl McpTransport for ScriptedTransport {
    async fn request(&self, _id: Value, method: &str, params: Value) -> Result<McpOutcome, McpError> {
        self.calls.lock().expect("lock poisoned").push((method.to_string(), params.clone()));
        match method {
            "tools/list" => Ok(McpOutcome::Result(json!({
                "tools": self.tools.iter().map(|t| json!({
                    "name": t.name, "description": t.description, "inputSchema": t.input_schema,
                })).collect::<Vec<_>>()
            }))),
            "prompts/list" => Ok(McpOutcome::Result(json!({"prompts": []}))),
            "resources/list" => Ok(McpOutcome::Result(json!({
                "resources": self.resources.iter().map(|r| json!({
                    "uri": r.uri, "title": r.title, "description": r.description,
                })).collect::<Vec<_>>()
            }))),
            "tools/call" => Ok(McpOutcome::Result(self.call_tool_response.clone())),
            "resources/read" => Ok(McpOutcome::Result(self.call_tool_response.clone())),
            other => Err(McpError::Transport(format!("unexpected method {}", other))),
        }
    }
}

async fn build_session(
    stream_enabled: bool,
    tools: Vec<Tool>,
    resources: Vec<Resource>,
    call_tool_response: Value,
    callbacks: Callbacks,
) -> (SessionHandle, Arc<MockAgent>, Arc<ScriptedTransport>) {
    let mut config = AgentConfig::default();
    config.stream_enabled = stream_enabled;
    let mock_agent = Arc::new(MockAgent::new(config));
    let agent: Arc<dyn Agent> = mock_agent.clone();

    let adapter = Arc::new(McpAdapter::new(ContentMapperConfig {
        supports_vision: false,
        inline_blob_mime_types: ContentMapperConfig::default_inline_mimes(),
        max_inline_blob_size: 10_000,
    }));

    let transport = Arc::new(ScriptedTransport::new(tools.clone(), resources.clone(), call_tool_response));
    let mcp_client = Arc::new(McpClient::new(transport.clone()));
    adapter.update_capabilities(tools, vec![], resources);

    let handle = scheduler::spawn_session(
        "session-1".to_string(),
        "alice".to_string(),
        "c1".to_string(),
        "mock".to_string(),
        agent,
        adapter,
        mcp_client,
        callbacks,
        Arc::new(NoopBlobRenderer),
    );

    (handle, mock_agent, transport)
}

async fn drain_until(count: &AtomicUsize, expected: usize, timeout: Duration) {
    let deadline = tokio::time::Instant::now() + timeout;
    while count.load(Ordering::SeqCst) < expected && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn scenario_1_user_message_with_no_tool_calls_streams_cumulative_chunks() {
    let responses = Arc::new(AsyncMutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));

    let responses_clone = responses.clone();
    let completions_clone = completions.clone();
    let callbacks = Callbacks {
        on_agent_response: Some(Arc::new(move |_u, _c, text: &str| {
            let responses_clone = responses_clone.clone();
            let text = text.to_string();
            tokio::spawn(async move { responses_clone.lock().await.push(text) });
        })),
        on_agent_completion: Some(Arc::new(move |_u, _c, thinking, content, rpc_calls| {
            assert!(thinking.is_none());
            assert_eq!(content, Some("Hi Alice"));
            assert!(rpc_calls.is_none());
            completions_clone.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    };

    let (handle, mock_agent, _transport) = build_session(true, vec![], vec![], json!({}), callbacks).await;
    mock_agent.set_stream_chunks(vec![
        StreamChunk {
            content_cumulative: Some("Hi ".to_string()),
            thinking_cumulative: None,
            new_tool_calls: None,
        },
        StreamChunk {
            content_cumulative: Some("Hi Alice".to_string()),
            thinking_cumulative: None,
            new_tool_calls: None,
        },
    ]);

    handle.session.send_user_message("hello");
    drain_until(&completions, 1, Duration::from_secs(2)).await;

    assert_eq!(completions.load(Ordering::SeqCst), 1);
    let seen = responses.lock().await.clone();
    assert_eq!(seen, vec!["Hi ".to_string(), "Hi Alice".to_string()]);

    handle.session.deactivate();
    let _ = handle.worker.await;
}

#[tokio::test]
async fn scenario_2_single_tool_call_round_trips_through_mcp() {
    let tool_calls = Arc::new(AsyncMutex::new(Vec::new()));
    let tool_responses = Arc::new(AsyncMutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));

    let tool_calls_clone = tool_calls.clone();
    let tool_responses_clone = tool_responses.clone();
    let completions_clone = completions.clone();
    let callbacks = Callbacks {
        on_agent_tool_call: Some(Arc::new(move |_u, _c, method: &str, params: &Value| {
            let tool_calls_clone = tool_calls_clone.clone();
            let entry = (method.to_string(), params.clone());
            tokio::spawn(async move { tool_calls_clone.lock().await.push(entry) });
        })),
        on_tool_response: Some(Arc::new(move |_u, _c, text: &str| {
            let tool_responses_clone = tool_responses_clone.clone();
            let text = text.to_string();
            tokio::spawn(async move { tool_responses_clone.lock().await.push(text) });
        })),
        on_agent_completion: Some(Arc::new(move |_u, _c, _thinking, _content, rpc_calls| {
            assert!(rpc_calls.is_some());
            completions_clone.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    };

    let echo_tool = Tool {
        name: "echo".to_string(),
        description: Some("echoes input".to_string()),
        input_schema: json!({"type": "object", "properties": {"input": {"type": "string"}}}),
    };
    let call_response = json!({"content": [{"type": "text", "text": "x"}]});

    let (handle, mock_agent, _transport) = build_session(false, vec![echo_tool], vec![], call_response, callbacks).await;
    mock_agent.set_sync_response(AgentResponse {
        thinking: None,
        content: "done".to_string(),
        tool_calls: vec![json!({"function": {"name": "echo", "arguments": "{\"input\": \"x\"}"}})],
    });

    handle.session.send_user_message("use echo");
    drain_until(&completions, 1, Duration::from_secs(2)).await;

    let calls = tool_calls.lock().await.clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "tools/call");
    assert_eq!(calls[0].1["name"], "echo");
    assert_eq!(calls[0].1["arguments"]["input"], "x");

    let responses = tool_responses.lock().await.clone();
    assert_eq!(responses, vec!["x".to_string()]);

    handle.session.deactivate();
    let _ = handle.worker.await;
}

#[tokio::test]
async fn scenario_3_unknown_tool_name_surfaces_fuzzy_hint_with_no_rpc_dispatched() {
    let tool_responses = Arc::new(AsyncMutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));

    let tool_responses_clone = tool_responses.clone();
    let completions_clone = completions.clone();
    let callbacks = Callbacks {
        on_tool_response: Some(Arc::new(move |_u, _c, text: &str| {
            let tool_responses_clone = tool_responses_clone.clone();
            let text = text.to_string();
            tokio::spawn(async move { tool_responses_clone.lock().await.push(text) });
        })),
        on_agent_completion: Some(Arc::new(move |_u, _c, _thinking, _content, rpc_calls| {
            assert!(rpc_calls.is_none());
            completions_clone.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    };

    let echo_tool = Tool {
        name: "echo".to_string(),
        description: None,
        input_schema: json!({"type": "object", "properties": {}}),
    };

    let (handle, mock_agent, transport) = build_session(false, vec![echo_tool], vec![], json!({}), callbacks).await;
    mock_agent.set_sync_response(AgentResponse {
        thinking: None,
        content: "done".to_string(),
        tool_calls: vec![json!({"function": {"name": "ech", "arguments": {}}})],
    });

    handle.session.send_user_message("use ech");
    drain_until(&completions, 1, Duration::from_secs(2)).await;

    let responses = tool_responses.lock().await.clone();
    assert_eq!(responses.len(), 1);
    assert!(responses[0].contains("did you mean: echo") || responses[0].contains("echo"));
    assert!(!transport.recorded_calls().iter().any(|(m, _)| m == "tools/call"));

    handle.session.deactivate();
    let _ = handle.worker.await;
}

#[tokio::test]
async fn scenario_4_capability_change_mid_session_rides_on_the_next_turn() {
    let completions = Arc::new(AtomicUsize::new(0));
    let bodies = Arc::new(AsyncMutex::new(Vec::new()));

    let completions_clone = completions.clone();
    let bodies_clone = bodies.clone();
    let callbacks = Callbacks {
        on_tool_response: Some(Arc::new(move |_u, _c, text: &str| {
            let bodies_clone = bodies_clone.clone();
            let text = text.to_string();
            tokio::spawn(async move { bodies_clone.lock().await.push(text) });
        })),
        on_agent_completion: Some(Arc::new(move |_u, _c, _t, _content, _rpc| {
            completions_clone.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    };

    let (handle, mock_agent, _transport) = build_session(false, vec![], vec![], json!({}), callbacks).await;
    mock_agent.set_sync_response(AgentResponse {
        thinking: None,
        content: "done".to_string(),
        tool_calls: vec![],
    });

    // Simulate C6 discovering a new tool mid-session: append the summary to
    // pending without committing, exactly as the capabilities-changed hook
    // does.
    let summary = handle
        .session
        .adapter
        .update_capabilities(
            vec![Tool {
                name: "new_tool".to_string(),
                description: Some("fresh".to_string()),
                input_schema: json!({"type": "object", "properties": {}}),
            }],
            vec![],
            vec![],
        )
        .expect("adding a tool should produce a diff summary");
    assert!(summary.starts_with("The list of available tools has been updated."));
    handle.session.append_pending(Value::String(summary), EntryRole::Tool);

    assert!(handle
        .session
        .adapter
        .to_backend_tools()
        .iter()
        .any(|t| t["function"]["name"] == "new_tool"));

    handle.session.send_user_message("hi");
    drain_until(&completions, 1, Duration::from_secs(2)).await;

    let seen = bodies.lock().await.clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with("The list of available tools has been updated."));

    handle.session.deactivate();
    let _ = handle.worker.await;
}

#[tokio::test]
async fn scenario_5_resource_read_via_uri_maps_to_a_tool_message() {
    let tool_responses = Arc::new(AsyncMutex::new(Vec::new()));
    let completions = Arc::new(AtomicUsize::new(0));

    let tool_responses_clone = tool_responses.clone();
    let completions_clone = completions.clone();
    let callbacks = Callbacks {
        on_tool_response: Some(Arc::new(move |_u, _c, text: &str| {
            let tool_responses_clone = tool_responses_clone.clone();
            let text = text.to_string();
            tokio::spawn(async move { tool_responses_clone.lock().await.push(text) });
        })),
        on_agent_completion: Some(Arc::new(move |_u, _c, _t, _content, _rpc| {
            completions_clone.fetch_add(1, Ordering::SeqCst);
        })),
        ..Callbacks::default()
    };

    let resource = Resource {
        uri: "file://a.md".to_string(),
        title: Some("a".to_string()),
        description: None,
    };
    let read_response = json!({"contents": [{"uri": "file://a.md", "mimeType": "text/plain", "text": "# hi"}]});

    let (handle, mock_agent, transport) = build_session(false, vec![], vec![resource], read_response, callbacks).await;
    mock_agent.set_sync_response(AgentResponse {
        thinking: None,
        content: "done".to_string(),
        tool_calls: vec![json!({"function": {"name": "file://a.md", "arguments": {}}})],
    });

    handle.session.send_user_message("read a.md");
    drain_until(&completions, 1, Duration::from_secs(2)).await;

    assert!(transport.recorded_calls().iter().any(|(m, p)| m == "resources/read" && p["uri"] == "file://a.md"));
    let seen = tool_responses.lock().await.clone();
    assert_eq!(seen, vec!["# hi".to_string()]);

    handle.session.deactivate();
    let _ = handle.worker.await;
}

struct FixedSession {
    model: String,
    active: AtomicBool,
}

#[async_trait]
impl Samplable for FixedSession {
    fn model(&self) -> String {
        self.model.clone()
    }

    fn supports_sampling(&self) -> bool {
        true
    }

    async fn sample_once(&self, _messages: &[shuttle::message::Message]) -> Result<AgentResponse, shuttle::error::AgentError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(AgentResponse {
            thinking: None,
            content: "sampled".to_string(),
            tool_calls: vec![],
        })
    }
}

struct StaticLookup {
    sessions: std::collections::HashMap<String, Arc<dyn Samplable>>,
}

impl SessionLookup for StaticLookup {
    fn find(&self, key: &str) -> Option<Arc<dyn Samplable>> {
        self.sessions.get(key).cloned()
    }
}

#[tokio::test]
async fn scenario_6_sampling_throttles_at_max_concurrency() {
    let mut sessions: std::collections::HashMap<String, Arc<dyn Samplable>> = std::collections::HashMap::new();
    sessions.insert(
        "alice:c1".to_string(),
        Arc::new(FixedSession { model: "m".to_string(), active: AtomicBool::new(true) }),
    );
    sessions.insert(
        "bob:c1".to_string(),
        Arc::new(FixedSession { model: "m".to_string(), active: AtomicBool::new(true) }),
    );
    sessions.insert(
        "carol:c1".to_string(),
        Arc::new(FixedSession { model: "m".to_string(), active: AtomicBool::new(true) }),
    );

    let gateway = Arc::new(SamplingGateway::new(Arc::new(StaticLookup { sessions }), 2, Duration::from_secs(5)));

    let params = || SamplingParams {
        system_prompt: None,
        messages: vec![SamplingMessage { role: "user".to_string(), text: "hi".to_string() }],
    };

    let g1 = gateway.clone();
    let g2 = gateway.clone();
    let g3 = gateway.clone();
    let t1 = tokio::spawn(async move { g1.sample("alice:c1", params()).await });
    let t2 = tokio::spawn(async move { g2.sample("bob:c1", params()).await });
    let t3 = tokio::spawn(async move { g3.sample("carol:c1", params()).await });

    tokio::time::sleep(Duration::from_millis(15)).await;
    assert_eq!(gateway.counters().inflight(), 2);

    let (r1, r2, r3) = tokio::join!(t1, t2, t3);
    assert!(r1.unwrap().is_ok());
    assert!(r2.unwrap().is_ok());
    assert!(r3.unwrap().is_ok());
    assert_eq!(gateway.counters().completed(), 3);
    assert_eq!(gateway.counters().inflight(), 0);
}
