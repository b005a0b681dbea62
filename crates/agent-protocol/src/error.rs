//! Error types for protocol adapters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The configured protocol tag names no known variant.
    #[error("unsupported protocol: {0}")]
    Unsupported(String),

    /// The adapter's writer has been shut down.
    #[error("protocol channel closed")]
    Closed,

    /// No session has been established with the agent yet.
    #[error("no active session")]
    NoSession,

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("agent returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
