use serde_json::Value;

/// Canonical fingerprint of a normalized tool call, used by the Agent
/// Contract's streaming generator to dedup tool calls (first-seen wins).
///
/// Stable under key reordering, unstable across argument differences. This
/// relies on `serde_json::Map` being backed by a `BTreeMap` — true only when
/// the `preserve_order` feature is not enabled anywhere in the dependency
/// graph — which makes `serde_json::to_string` on a `Value` already
/// key-sorted with no insignificant whitespace.
pub fn fingerprint(call: &Value) -> String {
    serde_json::to_string(call).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_under_key_reordering() {
        let a = json!({"function": {"name": "echo", "arguments": {"input": "x"}}});
        let b = json!({"function": {"arguments": {"input": "x"}, "name": "echo"}});
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn unstable_across_argument_differences() {
        let a = json!({"function": {"name": "echo", "arguments": {"input": "x"}}});
        let b = json!({"function": {"name": "echo", "arguments": {"input": "y"}}});
        assert_ne!(fingerprint(&a), fingerprint(&b));
    }

    #[test]
    fn idempotent_fingerprint_of_the_same_value() {
        let a = json!({"function": {"name": "echo", "arguments": {"input": "x"}}});
        assert_eq!(fingerprint(&a), fingerprint(&a));
    }
}
