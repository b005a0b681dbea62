use serde::{Deserialize, Serialize};

/// Flat, string-valued view of the managed process for status displays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub status: String,
    pub exit_code: String,
    /// Empty when no process is running.
    pub pid: String,
    pub last_error: String,
    pub protocol: String,
    pub session_id: String,
    /// RFC 3339, empty before the first start.
    pub started_at: String,
}
