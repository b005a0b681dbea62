//! Agent Client Protocol: JSON-RPC 2.0 over newline-delimited stdio.

use crate::adapter::{AdapterOptions, ProtocolAdapter};
use crate::error::{ProtocolError, ProtocolResult};
use crate::kind::ProtocolKind;
use crate::transport::{preview, AdapterIo, BoxedReader, LineWriter};
use crate::types::{
    PermissionDecision, PermissionHandler, PermissionOption, PermissionOptionKind,
    PermissionRequest, SessionUpdate, SessionUpdateKind,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const PROTOCOL_VERSION: u64 = 1;
const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;

type RpcReply = Result<Value, ProtocolError>;

struct AcpInner {
    writer: LineWriter,
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<RpcReply>>>,
    session: watch::Sender<Option<String>>,
    handler: PermissionHandler,
    working_dir: PathBuf,
    handshake_timeout: Duration,
}

impl AcpInner {
    /// Send a request and wait for the matching response.
    async fn request(&self, method: &str, params: Value) -> RpcReply {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let message = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        if let Err(e) = self.writer.send(&message).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        rx.await.map_err(|_| ProtocolError::Closed)?
    }

    async fn respond(&self, id: Value, result: Value) -> ProtocolResult<()> {
        self.writer
            .send(&json!({"jsonrpc": "2.0", "id": id, "result": result}))
            .await
    }

    async fn respond_error(&self, id: Value, code: i64, message: &str) -> ProtocolResult<()> {
        self.writer
            .send(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": code, "message": message},
            }))
            .await
    }

    fn session_id(&self) -> Option<String> {
        self.session.borrow().clone()
    }

    /// Fail every in-flight request. Called when stdout closes.
    fn fail_pending(&self) {
        let pending: Vec<_> = self.pending.lock().drain().collect();
        for (_, tx) in pending {
            let _ = tx.send(Err(ProtocolError::Closed));
        }
    }
}

/// ACP variant of [`ProtocolAdapter`].
pub struct AcpAdapter {
    inner: Arc<AcpInner>,
    updates: Mutex<Option<mpsc::Receiver<SessionUpdate>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AcpAdapter {
    /// Start the reader and the `initialize` / `session/new` handshake.
    pub fn spawn(io: AdapterIo, options: AdapterOptions, handler: PermissionHandler) -> Self {
        let (updates_tx, updates_rx) = mpsc::channel(options.update_capacity.max(1));
        let (session, _) = watch::channel(None);

        let inner = Arc::new(AcpInner {
            writer: LineWriter::new(io.writer),
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            session,
            handler,
            working_dir: options.working_dir,
            handshake_timeout: options.handshake_timeout,
        });

        let reader = tokio::spawn(read_loop(Arc::clone(&inner), io.reader, updates_tx.clone()));
        let handshake = tokio::spawn(run_handshake(Arc::clone(&inner), updates_tx));

        Self {
            inner,
            updates: Mutex::new(Some(updates_rx)),
            tasks: Mutex::new(vec![reader, handshake]),
        }
    }
}

#[async_trait]
impl ProtocolAdapter for AcpAdapter {
    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Acp
    }

    fn take_updates(&self) -> Option<mpsc::Receiver<SessionUpdate>> {
        self.updates.lock().take()
    }

    fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }

    async fn send_prompt(&self, text: &str) -> ProtocolResult<()> {
        let mut session = self.inner.session.subscribe();
        let ready = tokio::time::timeout(
            self.inner.handshake_timeout,
            session.wait_for(Option::is_some),
        )
        .await
        .map(|waited| waited.map(|id| id.clone()));
        let session_id = match ready {
            Ok(Ok(Some(id))) => id,
            _ => return Err(ProtocolError::NoSession),
        };

        // The response carries the stop reason and is handled by the reader.
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .writer
            .send(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": "session/prompt",
                "params": {
                    "sessionId": session_id,
                    "prompt": [{"type": "text", "text": text}],
                },
            }))
            .await
    }

    async fn close(&self) -> ProtocolResult<()> {
        self.inner.writer.shutdown().await;
        Ok(())
    }
}

impl Drop for AcpAdapter {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn run_handshake(inner: Arc<AcpInner>, updates: mpsc::Sender<SessionUpdate>) {
    let timeout = inner.handshake_timeout;
    match tokio::time::timeout(timeout, handshake(&inner)).await {
        Ok(Ok((session_id, result))) => {
            tracing::info!(session_id = %session_id, "ACP session established");
            let update = SessionUpdate::new(
                SessionUpdateKind::SessionStarted,
                Some(session_id),
                None,
                result.clone(),
                result.to_string(),
            );
            let _ = updates.send(update).await;
        }
        Ok(Err(e)) => tracing::warn!(error = %e, "ACP handshake failed"),
        Err(_) => tracing::warn!(timeout_ms = timeout.as_millis() as u64, "ACP handshake timed out"),
    }
}

async fn handshake(inner: &AcpInner) -> ProtocolResult<(String, Value)> {
    inner
        .request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "clientCapabilities": {
                    "fs": {"readTextFile": false, "writeTextFile": false},
                },
            }),
        )
        .await?;

    let result = inner
        .request(
            "session/new",
            json!({"cwd": inner.working_dir.to_string_lossy(), "mcpServers": []}),
        )
        .await?;

    let session_id = result
        .get("sessionId")
        .and_then(Value::as_str)
        .ok_or_else(|| ProtocolError::Handshake("session/new returned no sessionId".to_string()))?
        .to_string();

    inner.session.send_replace(Some(session_id.clone()));
    Ok((session_id, result))
}

async fn read_loop(inner: Arc<AcpInner>, reader: BoxedReader, updates: mpsc::Sender<SessionUpdate>) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let message = match serde_json::from_str::<Value>(&line) {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::debug!(error = %e, line = %preview(&line), "Skipping non-JSON ACP line");
                        continue;
                    }
                };
                if let Some(update) = dispatch(&inner, message, line) {
                    if updates.send(update).await.is_err() {
                        tracing::trace!("ACP update receiver dropped");
                    }
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "Error reading ACP stdout");
                break;
            }
        }
    }

    inner.fail_pending();
    tracing::debug!("ACP reader finished");
}

/// Route one decoded message. Returns the update to publish, if any.
fn dispatch(inner: &Arc<AcpInner>, message: Value, raw: String) -> Option<SessionUpdate> {
    let method = message.get("method").and_then(Value::as_str).map(str::to_string);
    let id = message.get("id").cloned().filter(|id| !id.is_null());

    match (method, id) {
        (Some(method), Some(id)) => handle_request(inner, method, id, message, raw),
        (Some(method), None) => handle_notification(inner, &method, message, raw),
        (None, Some(id)) => handle_response(inner, id, message, raw),
        (None, None) => {
            tracing::debug!(line = %preview(&raw), "Ignoring ACP message without method or id");
            None
        }
    }
}

fn handle_response(
    inner: &AcpInner,
    id: Value,
    message: Value,
    raw: String,
) -> Option<SessionUpdate> {
    let reply = match message.get("error") {
        Some(error) => Err(ProtocolError::Rpc {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        }),
        None => Ok(message.get("result").cloned().unwrap_or(Value::Null)),
    };

    let waiter = id.as_u64().and_then(|id| inner.pending.lock().remove(&id));
    if let Some(tx) = waiter {
        let _ = tx.send(reply);
        return None;
    }

    match reply {
        Ok(result) => {
            let stop_reason = result.get("stopReason").and_then(Value::as_str)?.to_string();
            Some(SessionUpdate::new(
                SessionUpdateKind::TurnCompleted,
                inner.session_id(),
                Some(stop_reason),
                result,
                raw,
            ))
        }
        Err(e) => {
            tracing::warn!(error = %e, "ACP prompt failed");
            Some(SessionUpdate::new(
                SessionUpdateKind::TurnCompleted,
                inner.session_id(),
                Some(e.to_string()),
                message,
                raw,
            ))
        }
    }
}

fn handle_notification(
    inner: &AcpInner,
    method: &str,
    message: Value,
    raw: String,
) -> Option<SessionUpdate> {
    if method != "session/update" {
        tracing::debug!(method = %method, "Unhandled ACP notification");
        return Some(SessionUpdate::new(
            SessionUpdateKind::Other,
            inner.session_id(),
            None,
            message,
            raw,
        ));
    }

    let params = message.get("params").cloned().unwrap_or(Value::Null);
    let session_id = params
        .get("sessionId")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| inner.session_id());
    let update = params.get("update").cloned().unwrap_or(Value::Null);
    let (kind, text) = classify_update(&update);

    Some(SessionUpdate::new(kind, session_id, text, update, raw))
}

fn classify_update(update: &Value) -> (SessionUpdateKind, Option<String>) {
    let tag = update
        .get("sessionUpdate")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let content_text = || {
        update
            .get("content")
            .and_then(|c| c.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    let title = || update.get("title").and_then(Value::as_str).map(str::to_string);

    match tag {
        "agent_message_chunk" => (SessionUpdateKind::AgentMessage, content_text()),
        "agent_thought_chunk" => (SessionUpdateKind::AgentThought, content_text()),
        "tool_call" => (SessionUpdateKind::ToolCall, title()),
        "tool_call_update" => (
            SessionUpdateKind::ToolCallUpdate,
            update
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(title),
        ),
        "plan" => (SessionUpdateKind::Plan, None),
        _ => (SessionUpdateKind::Other, None),
    }
}

fn handle_request(
    inner: &Arc<AcpInner>,
    method: String,
    id: Value,
    message: Value,
    raw: String,
) -> Option<SessionUpdate> {
    let session_id = inner.session_id();

    if method != "session/request_permission" {
        tracing::debug!(method = %method, "Rejecting unsupported ACP request");
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            let text = format!("method not found: {method}");
            if let Err(e) = inner.respond_error(id, METHOD_NOT_FOUND, &text).await {
                tracing::debug!(error = %e, "Failed to reject ACP request");
            }
        });
        return None;
    }

    let params = message.get("params").cloned().unwrap_or(Value::Null);
    let request = parse_permission_request(&params, session_id.as_deref());
    let inner_for_task = Arc::clone(inner);

    tokio::spawn(async move {
        let inner = inner_for_task;
        let result = match request {
            Some(request) => {
                let decision = (inner.handler)(request).await;
                inner.respond(id, permission_outcome(&decision)).await
            }
            None => {
                inner
                    .respond_error(id, INVALID_PARAMS, "malformed permission request")
                    .await
            }
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to answer ACP permission request");
        }
    });

    Some(SessionUpdate::new(
        SessionUpdateKind::Other,
        session_id,
        params
            .get("toolCall")
            .and_then(|t| t.get("title"))
            .and_then(Value::as_str)
            .map(str::to_string),
        message,
        raw,
    ))
}

fn parse_permission_request(params: &Value, fallback_session: Option<&str>) -> Option<PermissionRequest> {
    let session_id = params
        .get("sessionId")
        .and_then(Value::as_str)
        .or(fallback_session)?
        .to_string();
    let tool_call = params.get("toolCall")?;
    let tool_call_id = tool_call.get("toolCallId").and_then(Value::as_str)?.to_string();
    let title = tool_call
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let options = params
        .get("options")
        .and_then(Value::as_array)?
        .iter()
        .filter_map(|option| {
            let kind = serde_json::from_value::<PermissionOptionKind>(option.get("kind")?.clone()).ok()?;
            Some(PermissionOption {
                option_id: option.get("optionId").and_then(Value::as_str)?.to_string(),
                name: option
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                kind,
            })
        })
        .collect();

    Some(PermissionRequest {
        session_id,
        tool_call_id,
        title,
        options,
    })
}

fn permission_outcome(decision: &PermissionDecision) -> Value {
    match decision {
        PermissionDecision::Selected { option_id } => {
            json!({"outcome": {"outcome": "selected", "optionId": option_id}})
        }
        PermissionDecision::Cancelled => json!({"outcome": {"outcome": "cancelled"}}),
    }
}
