use std::collections::HashMap;

use serde_json::{json, Value};

use crate::capability::{CapabilityChange, OrderedIndex, Prompt, Resource, Tool};

/// Which catalog a reverse-index entry (and therefore a resolved call)
/// points into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CapabilityKind {
    Tool,
    Resource,
}

/// Maps the capability catalog (tools/prompts/resources) onto the provider's
/// function-calling surface and keeps a reverse index from provider-visible
/// name back to the MCP capability it resolves to.
///
/// Prompts are part of the catalog for description/diffing purposes but
/// never become provider-callable functions: the provider invokes tools, not
/// MCP prompts, by design.
pub struct ToolMapper {
    tools: OrderedIndex<Tool>,
    prompts: OrderedIndex<Prompt>,
    resources: OrderedIndex<Resource>,
    reverse_index: HashMap<String, (CapabilityKind, String)>,
    provider_tools: Vec<Value>,
}

impl Default for ToolMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolMapper {
    pub fn new() -> Self {
        Self {
            tools: OrderedIndex::new(),
            prompts: OrderedIndex::new(),
            resources: OrderedIndex::new(),
            reverse_index: HashMap::new(),
            provider_tools: Vec::new(),
        }
    }

    pub fn reverse_index(&self) -> &HashMap<String, (CapabilityKind, String)> {
        &self.reverse_index
    }

    pub fn tools(&self) -> &OrderedIndex<Tool> {
        &self.tools
    }

    pub fn resources(&self) -> &OrderedIndex<Resource> {
        &self.resources
    }

    pub fn provider_tools(&self) -> Vec<Value> {
        self.provider_tools.clone()
    }

    /// Replaces all three catalogs and rebuilds the provider-tool list and
    /// reverse index from scratch. Returns the human-readable diff summary,
    /// or `None` if nothing changed.
    pub fn update(&mut self, tools: Vec<Tool>, prompts: Vec<Prompt>, resources: Vec<Resource>) -> Option<String> {
        let tool_change = self
            .tools
            .replace_all(tools.into_iter().map(|t| (t.name.clone(), t)).collect());
        self.prompts
            .replace_all(prompts.into_iter().map(|p| (p.name.clone(), p)).collect());
        let resource_change = self
            .resources
            .replace_all(resources.into_iter().map(|r| (r.uri.clone(), r)).collect());

        self.rebuild_provider_tools();
        format_capability_update(self, &tool_change, &resource_change)
    }

    fn rebuild_provider_tools(&mut self) {
        let mut provider_tools = Vec::new();
        let mut reverse_index = HashMap::new();

        for (name, tool) in self.tools.iter() {
            let parameters = normalize_root_schema(tool.input_schema.clone());
            provider_tools.push(json!({
                "type": "function",
                "function": {
                    "name": name,
                    "description": tool.description.clone().unwrap_or_default(),
                    "parameters": parameters,
                }
            }));
            reverse_index.insert(name.to_string(), (CapabilityKind::Tool, name.to_string()));
        }

        for (uri, resource) in self.resources.iter() {
            let description = merge_resource_description(resource);
            provider_tools.push(json!({
                "type": "function",
                "function": {
                    "name": resource_provider_name(resource),
                    "description": description,
                    "parameters": {"type": "object", "properties": {}},
                }
            }));
            reverse_index.insert(resource_provider_name(resource), (CapabilityKind::Resource, uri.to_string()));
        }

        self.provider_tools = provider_tools;
        self.reverse_index = reverse_index;
    }
}

fn resource_provider_name(resource: &Resource) -> String {
    resource.uri.clone()
}

fn merge_resource_description(resource: &Resource) -> String {
    match (&resource.title, &resource.description) {
        (Some(title), Some(desc)) => format!("{}: {}", title, desc),
        (Some(title), None) => title.clone(),
        (None, Some(desc)) => desc.clone(),
        (None, None) => String::new(),
    }
}

/// Wraps a non-object JSON Schema as `{"payload": schema}` so every
/// provider-tool parameter list is a JSON-Schema object, and strips a
/// top-level `$schema` key the provider side doesn't expect.
pub fn normalize_root_schema(mut schema: Value) -> Value {
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
    }

    let is_object_schema = schema
        .get("type")
        .and_then(Value::as_str)
        .map(|t| t == "object")
        .unwrap_or(false);

    if is_object_schema {
        schema
    } else {
        json!({
            "type": "object",
            "properties": {"payload": schema},
            "required": ["payload"],
            "additionalProperties": false,
        })
    }
}

fn format_capability_update(
    mapper: &ToolMapper,
    tool_change: &CapabilityChange<String>,
    resource_change: &CapabilityChange<String>,
) -> Option<String> {
    if tool_change.added.is_empty()
        && tool_change.removed.is_empty()
        && resource_change.added.is_empty()
        && resource_change.removed.is_empty()
    {
        return None;
    }

    let mut lines = vec![
        "The list of available tools has been updated.".to_string(),
        String::new(),
        "The following Tools are available:".to_string(),
    ];

    let mut idx = 1;
    for (name, tool) in mapper.tools.iter() {
        lines.push(format!("{}. {}: {}", idx, name, tool.description.clone().unwrap_or_default()));
        idx += 1;
    }
    for (uri, resource) in mapper.resources.iter() {
        lines.push(format!("{}. {}: {}", idx, uri, merge_resource_description(resource)));
        idx += 1;
    }
    if idx == 1 {
        lines.push("None".to_string());
    }

    let mut removed_names: Vec<&str> = Vec::new();
    removed_names.extend(tool_change.removed.iter().map(String::as_str));
    removed_names.extend(resource_change.removed.iter().map(String::as_str));
    if !removed_names.is_empty() {
        lines.push(String::new());
        lines.push("The following tools have been removed:".to_string());
        for (i, name) in removed_names.iter().enumerate() {
            lines.push(format!("{}. {}", i + 1, name));
        }
    }

    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: Some(format!("does {}", name)),
            input_schema: json!({"type": "string"}),
        }
    }

    #[test]
    fn update_with_no_changes_returns_none_on_second_call() {
        let mut mapper = ToolMapper::new();
        let summary = mapper.update(vec![tool("echo")], vec![], vec![]);
        assert!(summary.is_some());
        let summary = mapper.update(vec![tool("echo")], vec![], vec![]);
        assert!(summary.is_none());
    }

    #[test]
    fn provider_tools_round_trip_tool_names_into_the_reverse_index() {
        let mut mapper = ToolMapper::new();
        mapper.update(vec![tool("echo")], vec![], vec![]);
        let provider_tools = mapper.provider_tools();
        assert_eq!(provider_tools.len(), 1);
        assert_eq!(provider_tools[0]["function"]["name"], "echo");
        let (kind, key) = mapper.reverse_index().get("echo").unwrap();
        assert_eq!(*kind, CapabilityKind::Tool);
        assert_eq!(key, "echo");
    }

    #[test]
    fn diff_summary_announces_update_and_lists_removed_entries() {
        let mut mapper = ToolMapper::new();
        mapper.update(vec![tool("echo"), tool("sum")], vec![], vec![]);
        let summary = mapper.update(vec![tool("echo")], vec![], vec![]).unwrap();
        assert!(summary.starts_with("The list of available tools has been updated."));
        assert!(summary.contains("The following tools have been removed:"));
        assert!(summary.contains("sum"));
    }

    #[test]
    fn non_object_schema_is_wrapped_under_payload() {
        let normalized = normalize_root_schema(json!({"type": "string"}));
        assert_eq!(normalized["type"], "object");
        assert_eq!(normalized["properties"]["payload"]["type"], "string");
        assert_eq!(normalized["required"][0], "payload");
    }

    #[test]
    fn object_schema_passes_through_with_schema_key_stripped() {
        let normalized = normalize_root_schema(json!({"type": "object", "$schema": "x", "properties": {}}));
        assert_eq!(normalized["type"], "object");
        assert!(normalized.get("$schema").is_none());
    }
}
