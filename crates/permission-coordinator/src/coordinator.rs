//! Pending-request bookkeeping for agent permission prompts.

use crate::error::{PermissionError, PermissionResult};
use agent_protocol::{permission_handler, PermissionDecision, PermissionHandler, PermissionRequest};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use supervisor_config::AgentConfig;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Default time a request waits for a human decision.
pub const DEFAULT_PERMISSION_TIMEOUT: Duration = Duration::from_secs(300);

/// Default bound on the notification channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 64;

/// Disambiguates ids minted in the same millisecond.
static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Resolve every request immediately with the first allow option.
    pub auto_approve: bool,
    pub timeout: Duration,
    pub notification_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            auto_approve: false,
            timeout: DEFAULT_PERMISSION_TIMEOUT,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_agent_config(config: &AgentConfig) -> Self {
        Self {
            auto_approve: config.auto_approve,
            timeout: Duration::from_secs(config.permission_timeout_secs),
            notification_capacity: config.notification_channel_capacity,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }
}

/// Published to observers for every request that starts waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionNotification {
    pub id: String,
    pub request: PermissionRequest,
    pub created_at: DateTime<Utc>,
}

/// A request waiting for its decision.
struct PendingPermissionRequest {
    request: PermissionRequest,
    response: mpsc::Sender<PermissionDecision>,
    created_at: DateTime<Utc>,
}

type PendingMap = Mutex<HashMap<String, PendingPermissionRequest>>;

/// Removes the pending entry however the wait ends.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(self.id);
    }
}

/// Correlates permission requests from the agent with decisions from the
/// user.
pub struct PermissionCoordinator {
    config: CoordinatorConfig,
    pending: PendingMap,
    notifications: mpsc::Sender<PermissionNotification>,
    cancel: broadcast::Sender<()>,
}

impl PermissionCoordinator {
    /// Create a coordinator and the receiving end of its notifications.
    pub fn new(config: CoordinatorConfig) -> (Arc<Self>, mpsc::Receiver<PermissionNotification>) {
        let (notifications, notifications_rx) = mpsc::channel(config.notification_capacity.max(1));
        let (cancel, _) = broadcast::channel(1);
        let coordinator = Arc::new(Self {
            config,
            pending: Mutex::new(HashMap::new()),
            notifications,
            cancel,
        });
        (coordinator, notifications_rx)
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The callback handed to protocol adapters.
    pub fn handler(self: &Arc<Self>) -> PermissionHandler {
        let coordinator = Arc::clone(self);
        permission_handler(move |request| {
            let coordinator = Arc::clone(&coordinator);
            async move { coordinator.request_permission(request).await }
        })
    }

    /// Wait for a decision on `request`.
    ///
    /// Resolves with the user's decision, or `Cancelled` on timeout or
    /// [`cancel_all`](Self::cancel_all).
    pub async fn request_permission(&self, request: PermissionRequest) -> PermissionDecision {
        let id = correlation_id(&request);

        if self.config.auto_approve {
            return auto_decision(&id, &request);
        }

        let (response_tx, mut response_rx) = mpsc::channel(1);
        let mut cancel_rx = self.cancel.subscribe();
        let created_at = Utc::now();

        self.pending.lock().insert(
            id.clone(),
            PendingPermissionRequest {
                request: request.clone(),
                response: response_tx,
                created_at,
            },
        );
        let _guard = PendingGuard {
            pending: &self.pending,
            id: &id,
        };

        info!(
            id = %id,
            session_id = %request.session_id,
            tool_call_id = %request.tool_call_id,
            title = %request.title,
            "Permission requested"
        );
        self.publish(PermissionNotification {
            id: id.clone(),
            request,
            created_at,
        });

        tokio::select! {
            decision = response_rx.recv() => {
                let decision = decision.unwrap_or(PermissionDecision::Cancelled);
                debug!(id = %id, decision = ?decision, "Permission resolved");
                decision
            }
            _ = cancel_rx.recv() => {
                info!(id = %id, "Permission request cancelled");
                PermissionDecision::Cancelled
            }
            _ = tokio::time::sleep(self.config.timeout) => {
                warn!(
                    id = %id,
                    timeout_secs = self.config.timeout.as_secs(),
                    "Permission request timed out"
                );
                PermissionDecision::Cancelled
            }
        }
    }

    /// Deliver `decision` to the pending request `id`. Each id resolves at
    /// most once.
    pub fn respond(&self, id: &str, decision: PermissionDecision) -> PermissionResult<()> {
        let mut pending = self.pending.lock();
        let entry = pending
            .get(id)
            .ok_or_else(|| PermissionError::NotFound(id.to_string()))?;

        match entry.response.try_send(decision) {
            Ok(()) => {
                pending.remove(id);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(id = %id, "Permission response slot already full");
                Err(PermissionError::ResponseSlotFull(id.to_string()))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                pending.remove(id);
                Err(PermissionError::NotFound(id.to_string()))
            }
        }
    }

    /// Respond by option id, or cancel when `cancelled` is set or no option
    /// is given.
    pub fn respond_to_permission(
        &self,
        id: &str,
        option_id: Option<String>,
        cancelled: bool,
    ) -> PermissionResult<()> {
        let decision = match option_id {
            Some(option_id) if !cancelled => PermissionDecision::Selected { option_id },
            _ => PermissionDecision::Cancelled,
        };
        self.respond(id, decision)
    }

    /// Resolve every waiting request as `Cancelled`.
    pub fn cancel_all(&self) {
        let waiting = self.pending.lock().len();
        if waiting > 0 {
            info!(count = waiting, "Cancelling pending permission requests");
        }
        let _ = self.cancel.send(());
    }

    /// Snapshot of waiting requests, oldest first.
    pub fn pending(&self) -> Vec<PermissionNotification> {
        let mut waiting: Vec<_> = self
            .pending
            .lock()
            .iter()
            .map(|(id, entry)| PermissionNotification {
                id: id.clone(),
                request: entry.request.clone(),
                created_at: entry.created_at,
            })
            .collect();
        waiting.sort_by_key(|n| n.created_at);
        waiting
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    fn publish(&self, notification: PermissionNotification) {
        match self.notifications.try_send(notification) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(n)) => {
                warn!(id = %n.id, "Permission notification channel full, dropping notification");
            }
            Err(mpsc::error::TrySendError::Closed(n)) => {
                debug!(id = %n.id, "Permission notification receiver closed");
            }
        }
    }
}

impl std::fmt::Debug for PermissionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCoordinator")
            .field("auto_approve", &self.config.auto_approve)
            .field("timeout", &self.config.timeout)
            .field("pending", &self.pending_count())
            .finish()
    }
}

fn correlation_id(request: &PermissionRequest) -> String {
    let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}-{}",
        request.session_id,
        request.tool_call_id,
        Utc::now().timestamp_millis(),
        seq
    )
}

fn auto_decision(id: &str, request: &PermissionRequest) -> PermissionDecision {
    if let Some(option) = request.options.iter().find(|o| o.is_allow()) {
        debug!(id = %id, option_id = %option.option_id, "Auto-approving permission");
        return PermissionDecision::selected(option.option_id.clone());
    }
    match request.options.first() {
        Some(option) => {
            warn!(
                id = %id,
                option_id = %option.option_id,
                "No allow option offered, auto-selecting first option"
            );
            PermissionDecision::selected(option.option_id.clone())
        }
        None => {
            warn!(id = %id, "No options offered, cancelling permission");
            PermissionDecision::Cancelled
        }
    }
}
