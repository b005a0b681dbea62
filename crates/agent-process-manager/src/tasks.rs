//! Background tasks owned by one run of the agent process.

use crate::status::{ProcessStatus, StatusCell};
use agent_output_buffer::{OutputBuffer, OutputLine, OutputStream};
use agent_protocol::{ProtocolAdapter, SessionUpdate};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use permission_coordinator::PermissionCoordinator;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, trace, warn};
use workspace_tracker::WorkspaceTracker;

/// Per-run facts readable without the lifecycle lock.
#[derive(Default)]
pub(crate) struct RunRecord {
    pub pid: Option<u32>,
    pub exit_code: Option<i32>,
    pub exit_error: Option<String>,
    pub adapter: Option<Arc<dyn ProtocolAdapter>>,
    pub started_at: Option<DateTime<Utc>>,
}

/// State shared between the manager and its tasks.
pub(crate) struct Shared {
    pub status: StatusCell,
    pub record: Mutex<RunRecord>,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            status: StatusCell::new(),
            record: Mutex::new(RunRecord::default()),
        }
    }

    pub fn adapter(&self) -> Option<Arc<dyn ProtocolAdapter>> {
        self.record.lock().adapter.clone()
    }

    fn record_exit(&self, code: i32, error: Option<String>) {
        let mut record = self.record.lock();
        record.exit_code = Some(code);
        record.exit_error = error;
        record.pid = None;
    }
}

pub(crate) async fn read_stderr(stderr: ChildStderr, output: Arc<OutputBuffer>) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                trace!(line = %line, "Agent stderr");
                output.push(OutputStream::Stderr, line);
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Error reading agent stderr");
                break;
            }
        }
    }
    debug!("Agent stderr closed");
}

/// Copy adapter updates into the manager's channel, recording each raw
/// protocol line. Never blocks on a slow consumer.
pub(crate) async fn forward_updates(
    mut updates: mpsc::Receiver<SessionUpdate>,
    out: mpsc::Sender<SessionUpdate>,
    output: Arc<OutputBuffer>,
) {
    while let Some(update) = updates.recv().await {
        output.append(OutputLine::stdout(update.raw.clone()));
        match out.try_send(update) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(update)) => {
                warn!(kind = ?update.kind, "Update channel full, dropping session update");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                trace!("Update receiver dropped");
            }
        }
    }
    debug!("Adapter update stream ended");
}

/// Owns the child: reaps it, honours kill requests and records the exit.
pub(crate) async fn wait_for_exit(
    mut child: Child,
    mut stop_rx: broadcast::Receiver<()>,
    mut kill_rx: oneshot::Receiver<()>,
    shared: Arc<Shared>,
    coordinator: Arc<PermissionCoordinator>,
    tracker: Option<Arc<WorkspaceTracker>>,
) {
    let pid = child.id();
    let mut stop_requested = false;

    let result = loop {
        tokio::select! {
            status = child.wait() => break status,
            _ = stop_rx.recv(), if !stop_requested => {
                stop_requested = true;
                debug!(pid = ?pid, "Stop requested, waiting for agent to exit");
            }
            _ = &mut kill_rx => {
                info!(pid = ?pid, "Killing agent process");
                if let Err(e) = child.start_kill() {
                    warn!(pid = ?pid, error = %e, "Failed to kill agent process");
                }
                break child.wait().await;
            }
        }
    };

    let (code, error) = match result {
        Ok(status) if status.success() => (status.code().unwrap_or(0), None),
        Ok(status) => (status.code().unwrap_or(-1), Some(format!("agent exited: {status}"))),
        Err(e) => (-1, Some(format!("failed to wait for agent: {e}"))),
    };
    shared.record_exit(code, error.clone());

    if stop_requested {
        info!(pid = ?pid, exit_code = code, "Agent process exited after stop request");
        return;
    }

    if shared
        .status
        .transition(ProcessStatus::Running, ProcessStatus::Stopped)
    {
        match &error {
            Some(error) => warn!(pid = ?pid, exit_code = code, error = %error, "Agent process exited unexpectedly"),
            None => info!(pid = ?pid, exit_code = code, "Agent process exited"),
        }
        coordinator.cancel_all();
        if let Some(tracker) = tracker {
            tracker.stop().await;
        }
        if let Some(adapter) = shared.adapter() {
            if let Err(e) = adapter.close().await {
                debug!(error = %e, "Failed to close adapter after exit");
            }
        }
    }
}
