//! Bridges a conversational model to an MCP capability server across many
//! concurrent sessions: translates provider tool calls into MCP JSON-RPC
//! requests, maps MCP results back onto provider-native messages, and keeps
//! each session's turn queue, capability catalog, and streaming state in
//! sync as the underlying server's tools/prompts/resources change.

pub mod adapter;
pub mod agent;
pub mod callbacks;
pub mod capability;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod manager;
pub mod mcp;
pub mod message;
pub mod sampling;
pub mod scheduler;
pub mod stream_buffer;

#[cfg(test)]
mod test_logging {
    #[ctor::ctor]
    fn init() {
        let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
            .with_test_writer()
            .try_init();
    }
}
