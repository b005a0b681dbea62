//! Process lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Stopped,
    Starting,
    Running,
    /// Reserved; never entered.
    Paused,
    Stopping,
    Error,
}

impl ProcessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current status with change notification.
///
/// Written only by Start, Stop and the exit waiter.
#[derive(Debug)]
pub struct StatusCell {
    tx: watch::Sender<ProcessStatus>,
}

impl StatusCell {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ProcessStatus::Stopped);
        Self { tx }
    }

    pub fn get(&self) -> ProcessStatus {
        *self.tx.borrow()
    }

    pub fn set(&self, status: ProcessStatus) {
        let previous = self.tx.send_replace(status);
        if previous != status {
            tracing::debug!(from = %previous, to = %status, "Agent status changed");
        }
    }

    /// Move to `to` only if currently `from`.
    pub fn transition(&self, from: ProcessStatus, to: ProcessStatus) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                false
            }
        });
        if changed {
            tracing::debug!(from = %from, to = %to, "Agent status changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<ProcessStatus> {
        self.tx.subscribe()
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}
