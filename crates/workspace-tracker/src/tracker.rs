//! Background snapshot loop and per-facet subscriptions.

use crate::collect;
use crate::error::TrackerError;
use crate::git::GitCommandRunner;
use crate::types::{DiffSnapshot, FilesSnapshot, StatusSnapshot};
use mailbox_fanout::{SubscriberSet, Subscription, SubscriptionId};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use supervisor_config::TrackerConfig;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Cached value plus the subscribers that follow it.
///
/// Replacement and fanout happen under the cache lock so a new subscriber
/// sees either the old value followed by the update, or only the update.
struct Facet<T> {
    cached: Mutex<Option<T>>,
    subscribers: SubscriberSet<T>,
}

impl<T: Clone> Facet<T> {
    fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            cached: Mutex::new(None),
            subscribers: SubscriberSet::new(label, capacity),
        }
    }

    fn replace(&self, value: T) {
        let mut cached = self.cached.lock();
        self.subscribers.publish(&value);
        *cached = Some(value);
    }

    fn current(&self) -> Option<T> {
        self.cached.lock().clone()
    }

    fn subscribe(&self) -> Subscription<T> {
        let cached = self.cached.lock();
        self.subscribers.subscribe_with(cached.clone())
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }
}

/// Which facets a refresh updated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    pub status: bool,
    pub files: bool,
    pub diff: bool,
}

impl RefreshOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.status && self.files && self.diff
    }
}

struct LoopHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Periodically snapshots a git working directory and fans the results out.
pub struct WorkspaceTracker {
    working_dir: PathBuf,
    interval: Duration,
    git: GitCommandRunner,
    status: Facet<StatusSnapshot>,
    files: Facet<FilesSnapshot>,
    diff: Facet<DiffSnapshot>,
    running: Mutex<Option<LoopHandle>>,
}

impl WorkspaceTracker {
    pub fn new(working_dir: impl Into<PathBuf>, config: &TrackerConfig) -> Self {
        let capacity = config.mailbox_capacity;
        Self {
            working_dir: working_dir.into(),
            interval: Duration::from_millis(config.interval_ms.max(1)),
            git: GitCommandRunner::new(Duration::from_secs(config.command_timeout_secs.max(1))),
            status: Facet::new("workspace_status", capacity),
            files: Facet::new("workspace_files", capacity),
            diff: Facet::new("workspace_diff", capacity),
            running: Mutex::new(None),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start the background loop. The first refresh runs immediately.
    ///
    /// Returns `false` if the loop is already running.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let tracker = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(tracker.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    _ = tracker.refresh() => {}
                }
            }

            tracing::debug!(dir = %tracker.working_dir.display(), "Workspace tracker loop exited");
        });

        *running = Some(LoopHandle {
            shutdown: shutdown_tx,
            task,
        });
        tracing::info!(
            dir = %self.working_dir.display(),
            interval_ms = self.interval.as_millis() as u64,
            "Workspace tracker started"
        );
        true
    }

    /// Stop the loop and wait for it to exit. A no-op when not running.
    pub async fn stop(&self) {
        let handle = self.running.lock().take();
        let Some(handle) = handle else {
            return;
        };

        let _ = handle.shutdown.send(());
        if let Err(e) = handle.task.await {
            if !e.is_cancelled() {
                tracing::warn!(error = %e, "Workspace tracker loop panicked");
            }
        }
        tracing::info!(dir = %self.working_dir.display(), "Workspace tracker stopped");
    }

    /// Recompute every facet once. A failed facet keeps its previous value.
    pub async fn refresh(&self) -> RefreshOutcome {
        let dir = self.working_dir.as_path();
        let mut outcome = RefreshOutcome::default();

        match collect::status(&self.git, dir).await {
            Ok(snapshot) => {
                self.status.replace(snapshot);
                outcome.status = true;
            }
            Err(e) => log_facet_failure("status", &e),
        }

        match collect::files(&self.git, dir).await {
            Ok(snapshot) => {
                self.files.replace(snapshot);
                outcome.files = true;
            }
            Err(e) => log_facet_failure("files", &e),
        }

        match collect::diff(&self.git, dir).await {
            Ok(snapshot) => {
                self.diff.replace(snapshot);
                outcome.diff = true;
            }
            Err(e) => log_facet_failure("diff", &e),
        }

        outcome
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Follow status snapshots. The cached snapshot, if any, is delivered
    /// first.
    pub fn subscribe_status(&self) -> Subscription<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn unsubscribe_status(&self, id: SubscriptionId) {
        self.status.unsubscribe(id);
    }

    pub fn subscribe_files(&self) -> Subscription<FilesSnapshot> {
        self.files.subscribe()
    }

    pub fn unsubscribe_files(&self, id: SubscriptionId) {
        self.files.unsubscribe(id);
    }

    pub fn subscribe_diff(&self) -> Subscription<DiffSnapshot> {
        self.diff.subscribe()
    }

    pub fn unsubscribe_diff(&self, id: SubscriptionId) {
        self.diff.unsubscribe(id);
    }

    pub fn current_status(&self) -> Option<StatusSnapshot> {
        self.status.current()
    }

    pub fn current_files(&self) -> Option<FilesSnapshot> {
        self.files.current()
    }

    pub fn current_diff(&self) -> Option<DiffSnapshot> {
        self.diff.current()
    }
}

impl Drop for WorkspaceTracker {
    fn drop(&mut self) {
        if let Some(handle) = self.running.get_mut().take() {
            handle.task.abort();
        }
    }
}

impl std::fmt::Debug for WorkspaceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceTracker")
            .field("working_dir", &self.working_dir)
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

fn log_facet_failure(facet: &'static str, error: &TrackerError) {
    match error {
        TrackerError::NotARepository { .. } | TrackerError::GitNotInstalled => {
            tracing::debug!(facet, code = error.code(), error = %error, "Workspace facet unavailable");
        }
        _ => {
            tracing::warn!(facet, code = error.code(), error = %error, "Workspace facet refresh failed");
        }
    }
}
