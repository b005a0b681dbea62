//! Error types for the process manager.

use agent_protocol::ProtocolError;
use permission_coordinator::PermissionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("agent process already running")]
    AlreadyRunning,

    #[error("agent process is not running")]
    NotRunning,

    #[error("no agent command configured")]
    NoCommand,

    #[error("failed to spawn agent process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("agent process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Permission(#[from] PermissionError),
}

impl ManagerError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already_running",
            Self::NotRunning => "not_running",
            Self::NoCommand => "no_command",
            Self::Spawn(_) => "spawn_failed",
            Self::MissingPipe(_) => "missing_pipe",
            Self::Protocol(ProtocolError::Unsupported(_)) => "unsupported_protocol",
            Self::Protocol(_) => "protocol_error",
            Self::Permission(e) => e.code(),
        }
    }
}

pub type ManagerResult<T> = Result<T, ManagerError>;
