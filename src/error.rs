use thiserror::Error;

/// Errors from the Agent Contract's response generators (C7).
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Errors from the Call Translator (C3). Always folded into a tool-role
/// pending entry by the adapter rather than propagated to the scheduler.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("{0}")]
    Message(String),
}

/// Errors from the MCP Client (C6).
#[derive(Debug, Error)]
pub enum McpError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("unsupported transport: {0}")]
    UnsupportedTransport(String),
    #[error("json-rpc error {code}: {message}")]
    JsonRpc { code: i64, message: String },
}

/// Errors from the Sampling Gateway (C8), returned to the caller as MCP
/// error-data values rather than raised.
#[derive(Debug, Error)]
pub enum SamplingError {
    #[error("unknown or inactive session '{0}'")]
    UnknownSession(String),
    #[error("sampling not supported for provider of session '{0}'")]
    UnsupportedProvider(String),
    #[error("invalid sampling request: {0}")]
    InvalidRequest(String),
    #[error("sampling timed out")]
    Timeout,
}

/// Errors raised to the embedding program at Manager startup; no session is
/// created.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Message(String),
}
