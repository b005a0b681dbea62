//! Claude CLI stream-json: one JSON event per stdout line, user messages and
//! permission replies on stdin.

use crate::adapter::{AdapterOptions, ProtocolAdapter};
use crate::error::ProtocolResult;
use crate::kind::ProtocolKind;
use crate::transport::{preview, AdapterIo, BoxedReader, LineWriter};
use crate::types::{
    PermissionDecision, PermissionHandler, PermissionOption, PermissionOptionKind,
    PermissionRequest, SessionUpdate, SessionUpdateKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::{json, Value};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const ALLOW_OPTION_ID: &str = "allow";
pub const DENY_OPTION_ID: &str = "deny";

fn ansi_regex() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1B(?:\[[0-9;?]*[A-Za-z~]|\][^\x07]*\x07)").expect("valid ANSI pattern")
    })
}

/// Strip ANSI escapes and parse a stdout line.
///
/// Returns `None` for blank lines, non-JSON lines and invalid JSON.
pub fn parse_stdout_line(line: &str) -> Option<(String, Value)> {
    let clean = ansi_regex().replace_all(line, "").to_string();
    let trimmed = clean.trim();
    if trimmed.is_empty() || !trimmed.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(json) => Some((trimmed.to_string(), json)),
        Err(e) => {
            tracing::debug!(error = %e, line = %preview(trimmed), "Failed to parse stream-json line");
            None
        }
    }
}

struct StreamInner {
    writer: LineWriter,
    session_id: Mutex<Option<String>>,
    handler: PermissionHandler,
}

impl StreamInner {
    fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }
}

/// stream-json variant of [`ProtocolAdapter`].
pub struct StreamJsonAdapter {
    inner: Arc<StreamInner>,
    updates: Mutex<Option<mpsc::Receiver<SessionUpdate>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StreamJsonAdapter {
    pub fn spawn(io: AdapterIo, options: AdapterOptions, handler: PermissionHandler) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(options.update_capacity.max(1));
        let inner = Arc::new(StreamInner {
            writer: LineWriter::new(io.writer),
            session_id: Mutex::new(None),
            handler,
        });

        let reader = tokio::spawn(read_loop(Arc::clone(&inner), io.reader, updates_tx));

        Self {
            inner,
            updates: Mutex::new(Some(updates_rx)),
            reader: Mutex::new(Some(reader)),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for StreamJsonAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::StreamJson
    }

    fn take_updates(&self) -> Option<mpsc::Receiver<SessionUpdate>> {
        self.updates.lock().take()
    }

    fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }

    async fn send_prompt(&self, text: &str) -> ProtocolResult<()> {
        let mut message = json!({
            "type": "user",
            "message": {
                "role": "user",
                "content": [{"type": "text", "text": text}],
            },
        });
        if let Some(session_id) = self.inner.session_id() {
            message["session_id"] = Value::String(session_id);
        }
        self.inner.writer.send(&message).await
    }

    async fn close(&self) -> ProtocolResult<()> {
        self.inner.writer.shutdown().await;
        Ok(())
    }
}

impl Drop for StreamJsonAdapter {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

async fn read_loop(
    inner: Arc<StreamInner>,
    reader: BoxedReader,
    updates: mpsc::Sender<SessionUpdate>,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let Some((raw, event)) = parse_stdout_line(&line) else {
                    continue;
                };
                let update = handle_event(&inner, event, raw);
                if updates.send(update).await.is_err() {
                    tracing::trace!("stream-json update receiver dropped");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Error reading stream-json stdout");
                break;
            }
        }
    }

    tracing::debug!("stream-json reader finished");
}

fn handle_event(inner: &Arc<StreamInner>, event: Value, raw: String) -> SessionUpdate {
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or_default();

    if let Some(id) = event.get("session_id").and_then(Value::as_str) {
        let mut current = inner.session_id.lock();
        if current.as_deref() != Some(id) {
            tracing::debug!(session_id = %id, "stream-json session id recorded");
            *current = Some(id.to_string());
        }
    }

    let (kind, text) = match event_type {
        "system" => match event.get("subtype").and_then(Value::as_str) {
            Some("init") => (SessionUpdateKind::SessionStarted, None),
            _ => (SessionUpdateKind::Other, None),
        },
        "assistant" => classify_assistant(&event),
        "user" => (SessionUpdateKind::ToolCallUpdate, None),
        "result" => (
            SessionUpdateKind::TurnCompleted,
            event
                .get("result")
                .and_then(Value::as_str)
                .or_else(|| event.get("subtype").and_then(Value::as_str))
                .map(str::to_string),
        ),
        "control_request" => {
            let title = handle_control_request(inner, &event);
            (SessionUpdateKind::Other, title)
        }
        _ => (SessionUpdateKind::Other, None),
    };

    SessionUpdate::new(kind, inner.session_id(), text, event, raw)
}

fn classify_assistant(event: &Value) -> (SessionUpdateKind, Option<String>) {
    let blocks = event
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let block_type = |b: &Value| b.get("type").and_then(Value::as_str).map(str::to_string);

    let tool_use = blocks
        .iter()
        .find(|b| block_type(*b).as_deref() == Some("tool_use"));
    if let Some(tool) = tool_use {
        let name = tool.get("name").and_then(Value::as_str).map(str::to_string);
        return (SessionUpdateKind::ToolCall, name);
    }

    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| block_type(*b).as_deref() == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    if !text.is_empty() {
        return (SessionUpdateKind::AgentMessage, Some(text.join("")));
    }

    let thinking: Vec<&str> = blocks
        .iter()
        .filter_map(|b| b.get("thinking").and_then(Value::as_str))
        .collect();
    if !thinking.is_empty() {
        return (SessionUpdateKind::AgentThought, Some(thinking.join("")));
    }

    (SessionUpdateKind::AgentMessage, None)
}

/// Hand a `can_use_tool` request to the permission handler. Returns the tool
/// name for the update summary.
fn handle_control_request(inner: &Arc<StreamInner>, event: &Value) -> Option<String> {
    let request = event.get("request")?;
    if request.get("subtype").and_then(Value::as_str) != Some("can_use_tool") {
        tracing::debug!("Ignoring unsupported control_request");
        return None;
    }

    let request_id = event.get("request_id").and_then(Value::as_str)?.to_string();
    let tool_name = request
        .get("tool_name")
        .and_then(Value::as_str)
        .unwrap_or("tool")
        .to_string();
    let input = request.get("input").cloned().unwrap_or_else(|| json!({}));
    let tool_call_id = request
        .get("tool_use_id")
        .and_then(Value::as_str)
        .unwrap_or(&request_id)
        .to_string();

    let permission = PermissionRequest {
        session_id: inner.session_id().unwrap_or_default(),
        tool_call_id,
        title: tool_name.clone(),
        options: synthesized_options(),
    };

    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        let decision = (inner.handler)(permission.clone()).await;
        let allowed = match &decision {
            PermissionDecision::Selected { option_id } => permission
                .option(option_id)
                .map(PermissionOption::is_allow)
                .unwrap_or(false),
            PermissionDecision::Cancelled => false,
        };
        let reply = control_response(&request_id, allowed, &decision, input);
        if let Err(e) = inner.writer.send(&reply).await {
            tracing::warn!(error = %e, request_id = %request_id, "Failed to answer control_request");
        }
    });

    Some(tool_name)
}

fn synthesized_options() -> Vec<PermissionOption> {
    vec![
        PermissionOption::new(ALLOW_OPTION_ID, "Allow", PermissionOptionKind::AllowOnce),
        PermissionOption::new(DENY_OPTION_ID, "Deny", PermissionOptionKind::RejectOnce),
    ]
}

fn control_response(
    request_id: &str,
    allowed: bool,
    decision: &PermissionDecision,
    input: Value,
) -> Value {
    let behavior = if allowed {
        json!({"behavior": "allow", "updatedInput": input})
    } else {
        let message = match decision {
            PermissionDecision::Cancelled => "Permission request cancelled",
            PermissionDecision::Selected { .. } => "Permission denied by user",
        };
        json!({"behavior": "deny", "message": message})
    };

    json!({
        "type": "control_response",
        "response": {
            "subtype": "success",
            "request_id": request_id,
            "response": behavior,
        },
    })
}
