//! Types shared by every protocol variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// What a decoded protocol event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionUpdateKind {
    SessionStarted,
    AgentMessage,
    AgentThought,
    ToolCall,
    ToolCallUpdate,
    Plan,
    TurnCompleted,
    Other,
}

/// One decoded event from the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub kind: SessionUpdateKind,
    pub session_id: Option<String>,
    /// Human-readable summary where the kind has one.
    pub text: Option<String>,
    pub payload: Value,
    /// The protocol line this update was decoded from.
    pub raw: String,
    pub received_at: DateTime<Utc>,
}

impl SessionUpdate {
    pub fn new(
        kind: SessionUpdateKind,
        session_id: Option<String>,
        text: Option<String>,
        payload: Value,
        raw: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            session_id,
            text,
            payload,
            raw: raw.into(),
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionOptionKind {
    AllowOnce,
    AllowAlways,
    RejectOnce,
    RejectAlways,
}

impl PermissionOptionKind {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::AllowOnce | Self::AllowAlways)
    }
}

/// A choice offered to the user for a permission request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionOption {
    pub option_id: String,
    pub name: String,
    pub kind: PermissionOptionKind,
}

impl PermissionOption {
    pub fn new(
        option_id: impl Into<String>,
        name: impl Into<String>,
        kind: PermissionOptionKind,
    ) -> Self {
        Self {
            option_id: option_id.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn is_allow(&self) -> bool {
        self.kind.is_allow()
    }
}

/// Agent-initiated request for approval of a tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRequest {
    pub session_id: String,
    pub tool_call_id: String,
    pub title: String,
    pub options: Vec<PermissionOption>,
}

impl PermissionRequest {
    pub fn option(&self, option_id: &str) -> Option<&PermissionOption> {
        self.options.iter().find(|o| o.option_id == option_id)
    }
}

/// How a permission request was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PermissionDecision {
    Selected { option_id: String },
    Cancelled,
}

impl PermissionDecision {
    pub fn selected(option_id: impl Into<String>) -> Self {
        Self::Selected {
            option_id: option_id.into(),
        }
    }

    pub fn option_id(&self) -> Option<&str> {
        match self {
            Self::Selected { option_id } => Some(option_id),
            Self::Cancelled => None,
        }
    }
}

pub type PermissionFuture = Pin<Box<dyn Future<Output = PermissionDecision> + Send>>;

/// Callback the adapter invokes for every permission request.
pub type PermissionHandler = Arc<dyn Fn(PermissionRequest) -> PermissionFuture + Send + Sync>;

/// Wrap an async closure as a [`PermissionHandler`].
pub fn permission_handler<F, Fut>(handler: F) -> PermissionHandler
where
    F: Fn(PermissionRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = PermissionDecision> + Send + 'static,
{
    Arc::new(move |request| Box::pin(handler(request)))
}
