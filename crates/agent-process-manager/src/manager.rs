//! Lifecycle of the supervised agent process.

use crate::error::{ManagerError, ManagerResult};
use crate::info::ProcessInfo;
use crate::status::ProcessStatus;
use crate::tasks::{forward_updates, read_stderr, wait_for_exit, Shared};
use agent_output_buffer::OutputBuffer;
use agent_protocol::{
    create_adapter, AdapterIo, AdapterOptions, ProtocolAdapter, ProtocolKind, SessionUpdate,
};
use chrono::Utc;
use parking_lot::Mutex;
use permission_coordinator::{CoordinatorConfig, PermissionCoordinator, PermissionNotification};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use supervisor_config::{AgentConfig, Config, TrackerConfig};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};
use workspace_tracker::WorkspaceTracker;

/// Time the exit waiter gets to reap the child after a kill.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Handles for one run of the agent process.
struct ManagedProcess {
    pid: Option<u32>,
    stop_tx: broadcast::Sender<()>,
    kill_tx: Option<oneshot::Sender<()>>,
    exit_waiter: JoinHandle<()>,
    stderr_reader: JoinHandle<()>,
    update_forwarder: JoinHandle<()>,
}

impl ManagedProcess {
    fn abort_all(&self) {
        self.exit_waiter.abort();
        self.stderr_reader.abort();
        self.update_forwarder.abort();
    }

    fn is_finished(&self) -> bool {
        self.exit_waiter.is_finished()
            && self.stderr_reader.is_finished()
            && self.update_forwarder.is_finished()
    }
}

/// Supervises one agent subprocess at a time.
///
/// The update channel, permission notifications and output buffer are
/// created with the manager and survive restarts.
pub struct AgentProcessManager {
    config: AgentConfig,
    shared: Arc<Shared>,
    lifecycle: tokio::sync::Mutex<Option<ManagedProcess>>,
    coordinator: Arc<PermissionCoordinator>,
    notifications: Mutex<Option<mpsc::Receiver<PermissionNotification>>>,
    updates_tx: mpsc::Sender<SessionUpdate>,
    updates_rx: Mutex<Option<mpsc::Receiver<SessionUpdate>>>,
    output: Arc<OutputBuffer>,
    tracker: Option<Arc<WorkspaceTracker>>,
}

impl AgentProcessManager {
    /// Create a manager. A tracker is attached when `tracker` is given and
    /// enabled.
    pub fn new(config: AgentConfig, tracker: Option<TrackerConfig>) -> Self {
        let (coordinator, notifications) =
            PermissionCoordinator::new(CoordinatorConfig::from_agent_config(&config));
        let (updates_tx, updates_rx) = mpsc::channel(config.update_channel_capacity.max(1));
        let tracker = tracker
            .filter(|t| t.enabled)
            .map(|t| Arc::new(WorkspaceTracker::new(&config.working_dir, &t)));

        Self {
            output: Arc::new(OutputBuffer::new(config.output_buffer_capacity)),
            config,
            shared: Arc::new(Shared::new()),
            lifecycle: tokio::sync::Mutex::new(None),
            coordinator,
            notifications: Mutex::new(Some(notifications)),
            updates_tx,
            updates_rx: Mutex::new(Some(updates_rx)),
            tracker,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.agent.clone(), Some(config.tracker.clone()))
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the agent and wire up its protocol adapter.
    ///
    /// Fails with [`ManagerError::AlreadyRunning`] while a run is active.
    /// Any other failure leaves the status at `Error`.
    pub async fn start(&self) -> ManagerResult<()> {
        let mut run = self.lifecycle.lock().await;

        let status = self.shared.status.get();
        if matches!(status, ProcessStatus::Starting | ProcessStatus::Running) {
            return Err(ManagerError::AlreadyRunning);
        }

        if let Some(previous) = run.take() {
            if !previous.is_finished() {
                debug!("Aborting leftover tasks from previous run");
            }
            previous.abort_all();
        }

        self.shared.status.set(ProcessStatus::Starting);
        {
            let mut record = self.shared.record.lock();
            *record = Default::default();
        }

        match self.launch().await {
            Ok(process) => {
                info!(
                    pid = ?process.pid,
                    protocol = %self.config.protocol,
                    working_dir = %self.config.working_dir.display(),
                    "Agent process started"
                );
                *run = Some(process);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, code = e.code(), "Failed to start agent process");
                {
                    let mut record = self.shared.record.lock();
                    record.exit_error = Some(e.to_string());
                }
                self.shared.status.set(ProcessStatus::Error);
                Err(e)
            }
        }
    }

    async fn launch(&self) -> ManagerResult<ManagedProcess> {
        let (program, args) = self
            .config
            .command
            .split_first()
            .filter(|(program, _)| !program.trim().is_empty())
            .ok_or(ManagerError::NoCommand)?;
        let kind: ProtocolKind = self.config.protocol.parse()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.config.working_dir)
            .envs(&self.config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %program, args = ?args, "Spawning agent process");
        let mut child = cmd.spawn().map_err(ManagerError::Spawn)?;
        let pid = child.id();

        let stdin = child.stdin.take().ok_or(ManagerError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(ManagerError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(ManagerError::MissingPipe("stderr"))?;

        let options = AdapterOptions::new(&self.config.working_dir)
            .with_update_capacity(self.config.update_channel_capacity);
        let adapter = create_adapter(
            kind,
            AdapterIo::new(stdout, stdin),
            options,
            self.coordinator.handler(),
        );
        let adapter_updates = adapter.take_updates();

        {
            let mut record = self.shared.record.lock();
            record.pid = pid;
            record.adapter = Some(Arc::clone(&adapter));
            record.started_at = Some(Utc::now());
        }
        // Running before the tasks exist, so an instant exit lands on Stopped.
        self.shared.status.set(ProcessStatus::Running);
        if let Some(tracker) = &self.tracker {
            tracker.start();
        }

        let (stop_tx, stop_rx) = broadcast::channel(1);
        let (kill_tx, kill_rx) = oneshot::channel();

        let stderr_reader = tokio::spawn(read_stderr(stderr, Arc::clone(&self.output)));
        let update_forwarder = match adapter_updates {
            Some(updates) => tokio::spawn(forward_updates(
                updates,
                self.updates_tx.clone(),
                Arc::clone(&self.output),
            )),
            None => tokio::spawn(async {}),
        };
        let exit_waiter = tokio::spawn(wait_for_exit(
            child,
            stop_rx,
            kill_rx,
            Arc::clone(&self.shared),
            Arc::clone(&self.coordinator),
            self.tracker.clone(),
        ));

        Ok(ManagedProcess {
            pid,
            stop_tx,
            kill_tx: Some(kill_tx),
            exit_waiter,
            stderr_reader,
            update_forwarder,
        })
    }

    /// Stop the agent, waiting at most `timeout` for a clean exit before
    /// killing it. Idempotent. Always ends in `Stopped`.
    pub async fn stop(&self, timeout: Duration) -> ManagerResult<()> {
        let mut run = self.lifecycle.lock().await;

        match self.shared.status.get() {
            ProcessStatus::Stopped | ProcessStatus::Stopping => return Ok(()),
            ProcessStatus::Error => {
                self.shared.status.set(ProcessStatus::Stopped);
                return Ok(());
            }
            ProcessStatus::Starting | ProcessStatus::Running | ProcessStatus::Paused => {}
        }

        self.shared.status.set(ProcessStatus::Stopping);
        info!(timeout_ms = timeout.as_millis() as u64, "Stopping agent process");
        let deadline = Instant::now() + timeout;
        let mut within_deadline = true;

        if let Some(tracker) = &self.tracker {
            if timeout_at(deadline, tracker.stop()).await.is_err() {
                warn!("Workspace tracker did not stop before deadline");
                within_deadline = false;
            }
        }
        self.coordinator.cancel_all();
        if within_deadline {
            if let Some(adapter) = self.shared.adapter() {
                // A write blocked on a full stdin pipe holds the writer
                // until the agent is killed.
                match timeout_at(deadline, adapter.close()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(error = %e, "Failed to close adapter"),
                    Err(_) => {
                        warn!("Adapter did not close before deadline");
                        within_deadline = false;
                    }
                }
            }
        }

        if let Some(mut process) = run.take() {
            let _ = process.stop_tx.send(());

            let joined = within_deadline
                && timeout_at(deadline, async {
                    let _ = (&mut process.exit_waiter).await;
                    let _ = (&mut process.stderr_reader).await;
                    let _ = (&mut process.update_forwarder).await;
                })
                .await
                .is_ok();

            if !joined {
                warn!(pid = ?process.pid, "Agent did not exit before deadline, killing");
                if let Some(kill_tx) = process.kill_tx.take() {
                    let _ = kill_tx.send(());
                }
                if !process.exit_waiter.is_finished() {
                    let _ = tokio::time::timeout(KILL_GRACE, &mut process.exit_waiter).await;
                }
                process.abort_all();
            }
        }

        self.shared.status.set(ProcessStatus::Stopped);
        info!(exit_code = self.exit_code(), "Agent process stopped");
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn status(&self) -> ProcessStatus {
        self.shared.status.get()
    }

    pub fn watch_status(&self) -> watch::Receiver<ProcessStatus> {
        self.shared.status.subscribe()
    }

    /// Exit code of the last run, -1 until an exit is observed.
    pub fn exit_code(&self) -> i32 {
        self.shared.record.lock().exit_code.unwrap_or(-1)
    }

    pub fn exit_error(&self) -> Option<String> {
        self.shared.record.lock().exit_error.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.shared.record.lock().pid
    }

    pub fn adapter(&self) -> Option<Arc<dyn ProtocolAdapter>> {
        self.shared.adapter()
    }

    pub fn session_id(&self) -> Option<String> {
        self.adapter().and_then(|adapter| adapter.session_id())
    }

    pub fn process_info(&self) -> ProcessInfo {
        let status = self.status();
        let record = self.shared.record.lock();
        ProcessInfo {
            status: status.to_string(),
            exit_code: record.exit_code.unwrap_or(-1).to_string(),
            pid: record.pid.map(|p| p.to_string()).unwrap_or_default(),
            last_error: record.exit_error.clone().unwrap_or_default(),
            protocol: self.config.protocol.clone(),
            session_id: record
                .adapter
                .as_ref()
                .and_then(|a| a.session_id())
                .unwrap_or_default(),
            started_at: record
                .started_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        }
    }

    // =========================================================================
    // Channels
    // =========================================================================

    /// Session updates from every run. Returns `Some` only on the first call.
    pub fn take_updates(&self) -> Option<mpsc::Receiver<SessionUpdate>> {
        self.updates_rx.lock().take()
    }

    /// Permission requests awaiting a decision. Returns `Some` only on the
    /// first call.
    pub fn take_permission_notifications(&self) -> Option<mpsc::Receiver<PermissionNotification>> {
        self.notifications.lock().take()
    }

    pub fn respond_to_permission(
        &self,
        id: &str,
        option_id: Option<String>,
        cancelled: bool,
    ) -> ManagerResult<()> {
        self.coordinator
            .respond_to_permission(id, option_id, cancelled)
            .map_err(Into::into)
    }

    pub fn pending_permissions(&self) -> Vec<PermissionNotification> {
        self.coordinator.pending()
    }

    pub fn permission_coordinator(&self) -> &Arc<PermissionCoordinator> {
        &self.coordinator
    }

    pub async fn send_prompt(&self, text: &str) -> ManagerResult<()> {
        if self.status() != ProcessStatus::Running {
            return Err(ManagerError::NotRunning);
        }
        let adapter = self.adapter().ok_or(ManagerError::NotRunning)?;
        adapter.send_prompt(text).await?;
        Ok(())
    }

    pub fn output_buffer(&self) -> &Arc<OutputBuffer> {
        &self.output
    }

    pub fn workspace_tracker(&self) -> Option<&Arc<WorkspaceTracker>> {
        self.tracker.as_ref()
    }
}

impl std::fmt::Debug for AgentProcessManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentProcessManager")
            .field("status", &self.status())
            .field("pid", &self.pid())
            .field("protocol", &self.config.protocol)
            .finish_non_exhaustive()
    }
}
