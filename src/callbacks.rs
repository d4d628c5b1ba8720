use std::sync::Arc;

use serde_json::Value;

/// `(user, chat, text)` — used for response/thinking/tool-response
/// callbacks, which all share this shape.
pub type TextCallback = Arc<dyn Fn(&str, &str, &str) + Send + Sync>;

/// `(user, chat, method, params)` — fired before a JSON-RPC call is
/// dispatched.
pub type ToolCallCallback = Arc<dyn Fn(&str, &str, &str, &Value) + Send + Sync>;

/// `(user, chat, thinking, content, rpc_calls)` — fired exactly once per
/// processed turn, always last.
pub type CompletionCallback =
    Arc<dyn Fn(&str, &str, Option<&str>, Option<&str>, Option<&[Value]>) + Send + Sync>;

/// The five external callbacks the Manager fans turn activity out to. Any
/// subset may be left unset; unset callbacks are simply not invoked.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_agent_response: Option<TextCallback>,
    pub on_agent_thinking: Option<TextCallback>,
    pub on_agent_tool_call: Option<ToolCallCallback>,
    pub on_tool_response: Option<TextCallback>,
    pub on_agent_completion: Option<CompletionCallback>,
}
