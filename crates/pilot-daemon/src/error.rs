//! Error types for the pilot daemon.

use pilot_rpc::protocol::{self, RpcError};

/// Errors that can occur in the daemon
#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] pilot_core::Error),

    /// Frame could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] pilot_rpc::transport::CodecError),

    /// Command metadata is not a JSON object
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    /// Unknown command name
    #[error("Unknown command: {0}")]
    MethodNotFound(String),

    /// File watcher error
    #[error("Watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The listen address is taken, usually by another launcher
    #[error("Address already in use: {0}")]
    AddrInUse(String),
}

impl From<DaemonError> for RpcError {
    fn from(err: DaemonError) -> Self {
        match err {
            DaemonError::InvalidParams(msg) => RpcError::invalid_params(msg),
            DaemonError::MethodNotFound(name) => RpcError::unknown_command(&name),
            DaemonError::Json(e) => RpcError::new(protocol::PARSE_ERROR, e.to_string()),
            DaemonError::Codec(e) => RpcError::new(protocol::INVALID_REQUEST, e.to_string()),
            other => RpcError::new(protocol::INTERNAL_ERROR, other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DaemonError>;
