//! The adapter capability and its factory.

use crate::acp::AcpAdapter;
use crate::error::ProtocolResult;
use crate::kind::ProtocolKind;
use crate::stream_json::StreamJsonAdapter;
use crate::transport::AdapterIo;
use crate::types::{PermissionHandler, SessionUpdate};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Default bound on the adapter's update channel.
pub const DEFAULT_UPDATE_CAPACITY: usize = 256;

/// Default time allowed for the session handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Construction options common to all variants.
#[derive(Debug, Clone)]
pub struct AdapterOptions {
    /// Working directory announced to the agent.
    pub working_dir: PathBuf,
    pub update_capacity: usize,
    pub handshake_timeout: Duration,
}

impl AdapterOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_update_capacity(mut self, capacity: usize) -> Self {
        self.update_capacity = capacity.max(1);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }
}

/// A running protocol session with the agent process.
#[async_trait]
pub trait ProtocolAdapter: Send + Sync {
    fn kind(&self) -> ProtocolKind;

    /// The stream of decoded updates. Returns `Some` only on the first call.
    fn take_updates(&self) -> Option<mpsc::Receiver<SessionUpdate>>;

    /// The agent-assigned session id, once known.
    fn session_id(&self) -> Option<String>;

    async fn send_prompt(&self, text: &str) -> ProtocolResult<()>;

    /// Shut down the agent's stdin. Idempotent.
    async fn close(&self) -> ProtocolResult<()>;
}

/// Build the adapter for `kind` over the given pipes.
///
/// Spawns the adapter's reader task, so it must be called from within a
/// tokio runtime.
pub fn create_adapter(
    kind: ProtocolKind,
    io: AdapterIo,
    options: AdapterOptions,
    handler: PermissionHandler,
) -> Arc<dyn ProtocolAdapter> {
    tracing::debug!(protocol = %kind, "Creating protocol adapter");
    match kind {
        ProtocolKind::Acp => Arc::new(AcpAdapter::spawn(io, options, handler)),
        ProtocolKind::StreamJson => Arc::new(StreamJsonAdapter::spawn(io, options, handler)),
    }
}
