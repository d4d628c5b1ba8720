//! MCP Adapter (C5): the facade gluing the Tool Mapper (C2), Call Translator
//! (C3), and Content Mapper (C4) together behind the operations the
//! scheduler actually needs.

pub mod call_translator;
pub mod content_mapper;
pub mod tool_mapper;

use std::sync::Mutex;

use serde_json::Value;

use crate::agent::Agent;
use crate::capability::{Prompt, Resource, Tool};
use crate::message::Message;

pub use content_mapper::{ContentMapper, ContentMapperConfig, MappedContent};
pub use tool_mapper::{CapabilityKind, ToolMapper};

pub struct McpAdapter {
    tool_mapper: Mutex<ToolMapper>,
    content_mapper: ContentMapper,
}

impl McpAdapter {
    pub fn new(content_mapper_config: ContentMapperConfig) -> Self {
        Self {
            tool_mapper: Mutex::new(ToolMapper::new()),
            content_mapper: ContentMapper::new(content_mapper_config),
        }
    }

    /// Replaces the capability catalog and returns a human-readable diff
    /// summary if anything changed.
    pub fn update_capabilities(&self, tools: Vec<Tool>, prompts: Vec<Prompt>, resources: Vec<Resource>) -> Option<String> {
        self.tool_mapper.lock().expect("lock poisoned").update(tools, prompts, resources)
    }

    pub fn to_backend_tools(&self) -> Vec<Value> {
        self.tool_mapper.lock().expect("lock poisoned").provider_tools()
    }

    /// Translates a provider tool-call payload into JSON-RPC requests against
    /// the current catalog. Unresolvable entries are folded into a single
    /// diagnostic string rather than propagated as an error, so callers
    /// always get *some* requests plus an optional message to surface back
    /// to the model.
    pub fn adapt_model_call_to_mcp(&self, payload: Option<&Value>) -> (Vec<Value>, Option<String>) {
        let tool_mapper = self.tool_mapper.lock().expect("lock poisoned");

        let calls = match call_translator::extract_tool_calls(payload) {
            Ok(calls) => calls,
            Err(e) => return (vec![], Some(format_mapping_failure(&tool_mapper, &[e.to_string()]))),
        };

        let mut requests = Vec::new();
        let mut failures = Vec::new();
        for (i, call) in calls.iter().enumerate() {
            match call_translator::to_json_rpc(&tool_mapper, call, (i + 1) as u64) {
                Ok(request) => requests.push(request),
                Err(e) => failures.push(e.to_string()),
            }
        }

        let diagnostic = if failures.is_empty() {
            None
        } else {
            Some(format_mapping_failure(&tool_mapper, &failures))
        };

        (requests, diagnostic)
    }

    /// Maps raw MCP result payloads into provider-native messages. A direct
    /// user-role echo (the `role == "user"` fast path) stringifies each
    /// payload rather than running it through the content mapper — used for
    /// sampling-originated user turns that don't carry MCP content shapes.
    pub fn build_provider_messages(&self, agent: &dyn Agent, payloads: &[Value], role: Option<&str>) -> (Vec<Message>, Vec<Value>) {
        if role == Some("user") {
            let messages = payloads
                .iter()
                .map(|p| agent.make_user_message(&stringify(p), None))
                .collect();
            return (messages, vec![]);
        }

        let (mapped, artifacts) = self.content_mapper.map_items(payloads);
        let messages = mapped
            .into_iter()
            .map(|m| {
                let images = if m.images.is_empty() { None } else { Some(m.images) };
                agent.make_tool_message(&m.text, images)
            })
            .collect();
        (messages, artifacts)
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn format_mapping_failure(tool_mapper: &ToolMapper, failures: &[String]) -> String {
    let mut names: Vec<&str> = tool_mapper.tools().keys().collect();
    names.extend(tool_mapper.resources().keys());
    names.sort_unstable();

    format!(
        "Requested tool or resource could not be mapped. Check the currently available tools; availability can change during the session. Available: [{}]. Details: {}",
        names.join(", "),
        failures.join(" ; ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::MockAgent;
    use crate::config::AgentConfig;
    use serde_json::json;

    #[test]
    fn adapt_model_call_to_mcp_resolves_a_known_tool() {
        let adapter = McpAdapter::new(ContentMapperConfig {
            supports_vision: false,
            inline_blob_mime_types: ContentMapperConfig::default_inline_mimes(),
            max_inline_blob_size: 1_000,
        });
        adapter.update_capabilities(
            vec![Tool {
                name: "echo".to_string(),
                description: None,
                input_schema: json!({"type": "object", "properties": {}}),
            }],
            vec![],
            vec![],
        );

        let call = json!({"function": {"name": "echo", "arguments": {}}});
        let (requests, diagnostic) = adapter.adapt_model_call_to_mcp(Some(&json!([call])));
        assert_eq!(requests.len(), 1);
        assert!(diagnostic.is_none());
    }

    #[test]
    fn adapt_model_call_to_mcp_reports_unresolvable_calls() {
        let adapter = McpAdapter::new(ContentMapperConfig {
            supports_vision: false,
            inline_blob_mime_types: ContentMapperConfig::default_inline_mimes(),
            max_inline_blob_size: 1_000,
        });
        let call = json!({"function": {"name": "missing", "arguments": {}}});
        let (requests, diagnostic) = adapter.adapt_model_call_to_mcp(Some(&json!([call])));
        assert!(requests.is_empty());
        assert!(diagnostic.unwrap().contains("Requested tool or resource could not be mapped"));
    }

    #[test]
    fn build_provider_messages_user_role_stringifies_payloads_without_content_mapping() {
        let adapter = McpAdapter::new(ContentMapperConfig {
            supports_vision: false,
            inline_blob_mime_types: ContentMapperConfig::default_inline_mimes(),
            max_inline_blob_size: 1_000,
        });
        let agent = MockAgent::new(AgentConfig::default());
        let (messages, artifacts) = adapter.build_provider_messages(&agent, &[json!("hello")], Some("user"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello");
        assert!(artifacts.is_empty());
    }
}
