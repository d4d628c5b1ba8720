use serde_json::{json, Value};
use similar::TextDiff;

use crate::error::TranslationError;

use super::tool_mapper::{CapabilityKind, ToolMapper};

/// Pulls the list of raw tool-call payloads out of whatever shape the
/// provider handed back: a bare array, a single `{"function": ...}` call, a
/// chat-completion-shaped `message.tool_calls`, or a top-level `tool_calls`
/// array.
pub fn extract_tool_calls(payload: Option<&Value>) -> Result<Vec<Value>, TranslationError> {
    let payload = match payload {
        None => return Ok(vec![]),
        Some(Value::Null) => return Ok(vec![]),
        Some(v) => v,
    };

    let raw_entries: Vec<Value> = match payload {
        Value::Array(items) => items.clone(),
        Value::Object(map) if map.contains_key("function") => vec![payload.clone()],
        Value::Object(map) if map.contains_key("message") => {
            match map.get("message").and_then(|m| m.get("tool_calls")).and_then(Value::as_array) {
                Some(calls) => calls.clone(),
                None => {
                    return Err(TranslationError::Message(
                        "payload has a 'message' field but no 'message.tool_calls' array".to_string(),
                    ))
                }
            }
        }
        Value::Object(map) if map.contains_key("tool_calls") => match map.get("tool_calls").and_then(Value::as_array) {
            Some(calls) => calls.clone(),
            None => return Err(TranslationError::Message("'tool_calls' is present but not an array".to_string())),
        },
        _ => {
            return Err(TranslationError::Message(
                "payload is not a recognized tool-call shape".to_string(),
            ))
        }
    };

    raw_entries.into_iter().map(coerce_entry).collect()
}

fn coerce_entry(entry: Value) -> Result<Value, TranslationError> {
    if entry.is_object() {
        Ok(entry)
    } else {
        Err(TranslationError::Message("tool call entry must be an object".to_string()))
    }
}

/// Normalizes a `function.arguments` payload (possibly absent, already an
/// object, a JSON-encoded string, or a bare scalar) into a JSON object
/// suitable for `params.arguments`.
pub fn coerce_arguments(raw: Option<&Value>) -> Value {
    match raw {
        None => json!({}),
        Some(Value::Null) => json!({}),
        Some(Value::Object(_)) => raw.unwrap().clone(),
        Some(Value::String(s)) => {
            if s.is_empty() {
                json!({})
            } else {
                match serde_json::from_str::<Value>(s) {
                    Ok(Value::Object(map)) => Value::Object(map),
                    Ok(other) => json!({"_": other}),
                    Err(_) => json!({"_raw": s}),
                }
            }
        }
        Some(other) => json!({"_": other.clone()}),
    }
}

/// Translates one extracted tool-call entry into a JSON-RPC request against
/// the currently known capability catalog.
pub fn to_json_rpc(tool_mapper: &ToolMapper, call: &Value, rpc_id: u64) -> Result<Value, TranslationError> {
    let function = call.get("function").unwrap_or(call);
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| TranslationError::Message("tool call is missing a function name".to_string()))?;
    let arguments = coerce_arguments(function.get("arguments"));

    if let Some((kind, key)) = tool_mapper.reverse_index().get(name) {
        return Ok(make_rpc(*kind, key, arguments, rpc_id));
    }
    if tool_mapper.tools().contains_key(name) {
        return Ok(make_rpc(CapabilityKind::Tool, name, arguments, rpc_id));
    }
    if tool_mapper.resources().contains_key(name) {
        return Ok(make_rpc(CapabilityKind::Resource, name, arguments, rpc_id));
    }
    if let Some(uri) = arguments.get("uri").and_then(Value::as_str) {
        if tool_mapper.resources().contains_key(uri) {
            return Ok(make_rpc(CapabilityKind::Resource, uri, arguments, rpc_id));
        }
    }

    Err(no_match_error(tool_mapper, name))
}

fn make_rpc(kind: CapabilityKind, key: &str, arguments: Value, rpc_id: u64) -> Value {
    match kind {
        CapabilityKind::Tool => json!({
            "jsonrpc": "2.0",
            "id": rpc_id,
            "method": "tools/call",
            "params": {"name": key, "arguments": arguments},
        }),
        CapabilityKind::Resource => json!({
            "jsonrpc": "2.0",
            "id": rpc_id,
            "method": "resources/read",
            "params": {"uri": key},
        }),
    }
}

fn no_match_error(tool_mapper: &ToolMapper, name: &str) -> TranslationError {
    let mut candidates: Vec<String> = tool_mapper.tools().keys().map(String::from).collect();
    candidates.extend(tool_mapper.resources().keys().map(String::from));

    let suggestions = fuzzy_suggest(name, &candidates, 3, 0.6);
    if suggestions.is_empty() {
        TranslationError::Message(format!("tool_call '{}' could not be mapped to an MCP capability.", name))
    } else {
        TranslationError::Message(format!(
            "tool_call '{}' could not be mapped to an MCP capability (did you mean: {}).",
            name,
            suggestions.join(", ")
        ))
    }
}

fn fuzzy_suggest(name: &str, candidates: &[String], limit: usize, cutoff: f32) -> Vec<String> {
    let mut scored: Vec<(f32, &str)> = candidates
        .iter()
        .map(|candidate| (TextDiff::from_chars(name, candidate.as_str()).ratio(), candidate.as_str()))
        .filter(|(score, _)| *score >= cutoff)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.into_iter().take(limit).map(|(_, name)| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{Resource, Tool};

    fn mapper_with(tools: Vec<&str>) -> ToolMapper {
        let mut mapper = ToolMapper::new();
        mapper.update(
            tools
                .into_iter()
                .map(|n| Tool {
                    name: n.to_string(),
                    description: None,
                    input_schema: json!({"type": "object", "properties": {}}),
                })
                .collect(),
            vec![],
            vec![],
        );
        mapper
    }

    #[test]
    fn extract_tool_calls_handles_bare_array_and_nested_shapes() {
        let call = json!({"function": {"name": "echo", "arguments": {}}});
        assert_eq!(extract_tool_calls(Some(&json!([call.clone()]))).unwrap().len(), 1);
        assert_eq!(extract_tool_calls(Some(&call)).unwrap().len(), 1);
        assert_eq!(
            extract_tool_calls(Some(&json!({"message": {"tool_calls": [call.clone()]}})))
                .unwrap()
                .len(),
            1
        );
        assert_eq!(extract_tool_calls(Some(&json!({"tool_calls": [call]}))).unwrap().len(), 1);
        assert!(extract_tool_calls(None).unwrap().is_empty());
    }

    #[test]
    fn coerce_arguments_parses_json_encoded_string_arguments() {
        assert_eq!(coerce_arguments(Some(&json!("{\"a\": 1}"))), json!({"a": 1}));
        assert_eq!(coerce_arguments(Some(&json!(""))), json!({}));
        assert_eq!(coerce_arguments(Some(&json!("not json"))), json!({"_raw": "not json"}));
        assert_eq!(coerce_arguments(None), json!({}));
    }

    #[test]
    fn to_json_rpc_resolves_a_direct_tool_match() {
        let mapper = mapper_with(vec!["echo"]);
        let call = json!({"function": {"name": "echo", "arguments": {"x": 1}}});
        let rpc = to_json_rpc(&mapper, &call, 1).unwrap();
        assert_eq!(rpc["method"], "tools/call");
        assert_eq!(rpc["params"]["name"], "echo");
    }

    #[test]
    fn to_json_rpc_resolves_resource_via_uri_argument() {
        let mut mapper = ToolMapper::new();
        mapper.update(
            vec![],
            vec![],
            vec![Resource {
                uri: "file:///a.txt".to_string(),
                title: None,
                description: None,
            }],
        );
        let call = json!({"function": {"name": "read_file", "arguments": {"uri": "file:///a.txt"}}});
        let rpc = to_json_rpc(&mapper, &call, 1).unwrap();
        assert_eq!(rpc["method"], "resources/read");
        assert_eq!(rpc["params"]["uri"], "file:///a.txt");
    }

    #[test]
    fn to_json_rpc_reports_fuzzy_suggestions_on_unmatched_name() {
        let mapper = mapper_with(vec!["echo"]);
        let call = json!({"function": {"name": "ecko", "arguments": {}}});
        let err = to_json_rpc(&mapper, &call, 1).unwrap_err();
        assert!(err.to_string().contains("did you mean"));
        assert!(err.to_string().contains("echo"));
    }

    #[test]
    fn to_json_rpc_is_idempotent_given_the_same_call_twice() {
        let mapper = mapper_with(vec!["echo"]);
        let call = json!({"function": {"name": "echo", "arguments": {"x": 1}}});
        let a = to_json_rpc(&mapper, &call, 1).unwrap();
        let b = to_json_rpc(&mapper, &call, 1).unwrap();
        assert_eq!(a, b);
    }
}
