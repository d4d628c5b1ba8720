use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// One piece of mapped textual content, with any inline images carried
/// alongside it for providers that accept multimodal messages.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MappedContent {
    pub text: String,
    pub images: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ContentMapperConfig {
    pub supports_vision: bool,
    pub inline_blob_mime_types: Vec<String>,
    pub max_inline_blob_size: usize,
}

impl ContentMapperConfig {
    pub fn default_inline_mimes() -> Vec<String> {
        vec!["text/plain", "text/markdown", "application/json", "application/xml"]
            .into_iter()
            .map(String::from)
            .collect()
    }
}

/// Maps raw MCP result payloads (`CallToolResult`/`GetPromptResult`/
/// `ReadResourceResult`/list results) onto provider-native message content,
/// deciding per-blob whether to inline it as text or surface it as an
/// artifact for out-of-band rendering.
pub struct ContentMapper {
    config: ContentMapperConfig,
}

struct BlobInfo {
    mime: String,
    name: String,
    blob_b64: String,
    meta: Value,
}

impl ContentMapper {
    pub fn new(config: ContentMapperConfig) -> Self {
        Self { config }
    }

    /// Maps a batch of raw MCP result payloads to `(mapped_text_items,
    /// artifacts)`. Artifacts are out-of-band content (large blobs, images
    /// when vision is unsupported, audio, unrecognized blocks) the caller
    /// may render separately.
    pub fn map_items(&self, items: &[Value]) -> (Vec<MappedContent>, Vec<Value>) {
        let mut mapped = Vec::new();
        let mut artifacts = Vec::new();
        for item in items {
            self.coerce_entry(item, None, &mut mapped, &mut artifacts);
        }
        (mapped, artifacts)
    }

    fn coerce_entry(&self, value: &Value, role: Option<&str>, mapped: &mut Vec<MappedContent>, artifacts: &mut Vec<Value>) {
        if let Value::Array(items) = value {
            for item in items {
                self.coerce_entry(item, role, mapped, artifacts);
            }
            return;
        }

        if let Value::String(text) = value {
            mapped.push(MappedContent {
                text: text.clone(),
                images: vec![],
            });
            return;
        }

        let object = match value.as_object() {
            Some(o) => o,
            None => return,
        };

        let entry_role = object.get("role").and_then(Value::as_str).or(role);

        if let Some(Value::Array(blocks)) = object.get("content") {
            for block in blocks {
                self.handle_content_block(block, entry_role, mapped, artifacts);
            }
            return;
        }

        if let Some(Value::Array(messages)) = object.get("messages") {
            for message in messages {
                let message_role = message.get("role").and_then(Value::as_str);
                if let Some(content) = message.get("content") {
                    self.coerce_entry(content, message_role, mapped, artifacts);
                } else {
                    self.coerce_entry(message, message_role, mapped, artifacts);
                }
            }
            return;
        }

        if let Some(Value::Array(contents)) = object.get("contents") {
            for resource in contents {
                self.handle_resource(resource, entry_role, mapped, artifacts);
            }
            return;
        }

        for (kind, key) in [("tools", "tools"), ("prompts", "prompts"), ("resources", "resources")] {
            if let Some(Value::Array(items)) = object.get(key) {
                self.handle_list(kind, items, mapped);
                return;
            }
        }

        if object.contains_key("uri") && (object.contains_key("text") || object.contains_key("blob")) {
            self.handle_resource(value, entry_role, mapped, artifacts);
            return;
        }

        self.handle_content_block(value, entry_role, mapped, artifacts);
    }

    fn handle_content_block(&self, block: &Value, role: Option<&str>, mapped: &mut Vec<MappedContent>, artifacts: &mut Vec<Value>) {
        let prefix = role.map(|r| format!("[{}]: ", r)).unwrap_or_default();
        let block_type = block.get("type").and_then(Value::as_str);

        if let Some(text) = block.get("text").and_then(Value::as_str) {
            if block_type.is_none() || block_type == Some("text") {
                if !text.is_empty() {
                    mapped.push(MappedContent {
                        text: format!("{}{}", prefix, text),
                        images: vec![],
                    });
                }
                return;
            }
        }

        if block_type == Some("image") {
            if let Some(data) = block.get("data").and_then(Value::as_str) {
                if self.config.supports_vision {
                    mapped.push(MappedContent {
                        text: prefix,
                        images: vec![data.to_string()],
                    });
                } else {
                    artifacts.push(serde_json::json!({"kind": "image", "note": "vision_not_supported", "data": data}));
                }
                return;
            }
        }

        if block_type == Some("resource_link") {
            let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
            let uri = block.get("uri").and_then(Value::as_str).unwrap_or_default();
            mapped.push(MappedContent {
                text: format!("{}- {}: {}", prefix, name, uri),
                images: vec![],
            });
            return;
        }

        if block_type == Some("resource") {
            if let Some(info) = extract_embedded_blob(block) {
                self.handle_blob_info(info, &prefix, mapped, artifacts);
                return;
            }
        }

        if block_type == Some("audio") {
            artifacts.push(serde_json::json!({"kind": "audio"}));
            return;
        }

        artifacts.push(serde_json::json!({"kind": "other"}));
    }

    fn handle_resource(&self, resource: &Value, role: Option<&str>, mapped: &mut Vec<MappedContent>, artifacts: &mut Vec<Value>) {
        let prefix = role.map(|r| format!("[{}]: ", r)).unwrap_or_default();

        if let Some(text) = resource.get("text").and_then(Value::as_str) {
            mapped.push(MappedContent {
                text: format!("{}{}", prefix, text),
                images: vec![],
            });
            return;
        }

        if let Some(blob) = resource.get("blob").and_then(Value::as_str) {
            let uri = resource.get("uri").and_then(Value::as_str).unwrap_or_default().to_string();
            let mime = resource
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("application/octet-stream")
                .to_lowercase();
            self.handle_blob_info(
                BlobInfo {
                    mime,
                    name: uri,
                    blob_b64: blob.to_string(),
                    meta: serde_json::json!({}),
                },
                &prefix,
                mapped,
                artifacts,
            );
        }
    }

    fn handle_list(&self, kind: &str, items: &[Value], mapped: &mut Vec<MappedContent>) {
        if items.is_empty() {
            return;
        }

        let mut entries = Vec::new();
        for item in items {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .or_else(|| item.get("uri").and_then(Value::as_str))
                .unwrap_or("(unnamed)");
            let description = item.get("description").and_then(Value::as_str).unwrap_or_default();
            let schema = item.get("inputSchema").or_else(|| item.get("arguments"));
            let schema_text = schema
                .map(|s| serde_json::to_string_pretty(s).unwrap_or_default())
                .unwrap_or_default();
            entries.push(format!("Name: {}\nDescription: {}\nSchema:\n{}", name, description, schema_text));
        }

        let _ = kind;
        let body = entries.join("\n\n");
        mapped.push(MappedContent {
            text: format!("The following callable entries are available:\n\n{}", body),
            images: vec![],
        });
    }

    fn handle_blob_info(&self, info: BlobInfo, prefix: &str, mapped: &mut Vec<MappedContent>, artifacts: &mut Vec<Value>) {
        let size = estimate_blob_size(&info.blob_b64);
        let inline = self.config.inline_blob_mime_types.iter().any(|m| m == &info.mime)
            && size <= self.config.max_inline_blob_size;

        if inline {
            if let Some(text) = decode_blob_text(&info.blob_b64, &info.mime) {
                mapped.push(MappedContent {
                    text: format!("{}{}", prefix, text),
                    images: vec![],
                });
                return;
            }
        }

        artifacts.push(serde_json::json!({
            "kind": "blob",
            "mime": info.mime,
            "name": info.name,
            "blob_b64": info.blob_b64,
            "meta": info.meta,
            "size_bytes": size,
        }));
    }
}

fn extract_embedded_blob(block: &Value) -> Option<BlobInfo> {
    let resource = block.get("resource")?;
    let blob = resource.get("blob").and_then(Value::as_str)?;
    let mime = resource
        .get("mimeType")
        .and_then(Value::as_str)
        .unwrap_or("application/octet-stream")
        .to_lowercase();
    let uri = resource.get("uri").and_then(Value::as_str).unwrap_or_default().to_string();
    let meta = block.get("meta").cloned().unwrap_or(serde_json::json!({}));
    Some(BlobInfo {
        mime,
        name: uri,
        blob_b64: blob.to_string(),
        meta,
    })
}

fn estimate_blob_size(b64: &str) -> usize {
    let padding = b64.chars().rev().take_while(|c| *c == '=').count();
    (b64.len() * 3 / 4).saturating_sub(padding)
}

fn decode_blob_text(b64: &str, mime: &str) -> Option<String> {
    let is_text_like = mime.starts_with("text/") || mime == "application/json" || mime == "application/xml";
    if !is_text_like {
        return None;
    }
    let bytes = BASE64.decode(b64).ok()?;
    String::from_utf8(bytes).ok()
}
