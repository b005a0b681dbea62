//! Stdio plumbing shared by the adapters.

use crate::error::{ProtocolError, ProtocolResult};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// The agent's stdout (read side) and stdin (write side).
pub struct AdapterIo {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl AdapterIo {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            writer: Box::new(writer),
        }
    }
}

impl std::fmt::Debug for AdapterIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterIo").finish_non_exhaustive()
    }
}

/// Newline-delimited JSON writer. Once shut down every send fails with
/// [`ProtocolError::Closed`].
pub(crate) struct LineWriter {
    inner: Mutex<Option<BoxedWriter>>,
}

impl LineWriter {
    pub(crate) fn new(writer: BoxedWriter) -> Self {
        Self {
            inner: Mutex::new(Some(writer)),
        }
    }

    pub(crate) async fn send(&self, message: &Value) -> ProtocolResult<()> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');

        let mut guard = self.inner.lock().await;
        let writer = guard.as_mut().ok_or(ProtocolError::Closed)?;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Close the write side, delivering EOF to the agent.
    pub(crate) async fn shutdown(&self) {
        let writer = self.inner.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!(error = %e, "Error shutting down agent stdin");
            }
        }
    }
}

/// Truncate a line for log output.
pub(crate) fn preview(line: &str) -> &str {
    match line.char_indices().nth(80) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
