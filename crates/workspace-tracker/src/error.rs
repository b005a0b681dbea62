use thiserror::Error;

/// Failures while snapshotting a workspace.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("git executable not found")]
    GitNotInstalled,

    #[error("not a git repository: {message}")]
    NotARepository { message: String },

    #[error("git command failed ({command}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("git command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("failed to parse git output: {message}")]
    Parse { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl TrackerError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::GitNotInstalled => "git_not_installed",
            Self::NotARepository { .. } => "not_a_repository",
            Self::CommandFailed { .. } => "command_failed",
            Self::Timeout { .. } => "timeout",
            Self::Parse { .. } => "parse_error",
            Self::Io(_) => "io_error",
        }
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
