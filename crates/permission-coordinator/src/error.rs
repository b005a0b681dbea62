use thiserror::Error;

/// Errors from responding to a pending permission request.
#[derive(Debug, Error)]
pub enum PermissionError {
    #[error("no pending permission request with id {0}")]
    NotFound(String),

    #[error("permission request {0} already has a response queued")]
    ResponseSlotFull(String),
}

impl PermissionError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "permission_not_found",
            Self::ResponseSlotFull(_) => "permission_response_slot_full",
        }
    }
}

pub type PermissionResult<T> = Result<T, PermissionError>;
