use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire protocol spoken with the agent over stdio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// JSON-RPC 2.0 Agent Client Protocol.
    #[serde(rename = "acp")]
    Acp,
    /// Claude CLI `--input-format stream-json --output-format stream-json`.
    #[serde(rename = "stream-json")]
    StreamJson,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Acp => "acp",
            Self::StreamJson => "stream-json",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProtocolKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "acp" => Ok(Self::Acp),
            "stream-json" | "stream_json" | "claude" => Ok(Self::StreamJson),
            _ => Err(ProtocolError::Unsupported(s.to_string())),
        }
    }
}
