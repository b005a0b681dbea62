#![allow(dead_code)]

use agent_protocol::{AdapterIo, SessionUpdate, SessionUpdateKind};
use serde_json::Value;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};
use tokio::sync::mpsc;

/// The agent end of an in-memory stdio pair.
pub struct FakeAgent {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeAgent {
    /// Read the next JSON line written by the adapter. `None` on EOF.
    pub async fn recv(&mut self) -> Option<Value> {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for adapter output")
            .expect("read error")?;
        Some(serde_json::from_str(&line).expect("adapter wrote invalid JSON"))
    }

    pub async fn send(&mut self, value: Value) {
        self.send_raw(&value.to_string()).await;
    }

    pub async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    pub async fn hang_up(mut self) {
        self.writer.shutdown().await.unwrap();
    }
}

pub fn stdio_pair() -> (AdapterIo, FakeAgent) {
    let (client, agent) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client);
    let (agent_read, agent_write) = tokio::io::split(agent);
    (
        AdapterIo::new(client_read, client_write),
        FakeAgent {
            lines: BufReader::new(agent_read).lines(),
            writer: agent_write,
        },
    )
}

/// Wait for the next update of `kind`, skipping others.
pub async fn next_of_kind(
    updates: &mut mpsc::Receiver<SessionUpdate>,
    kind: SessionUpdateKind,
) -> SessionUpdate {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let update = updates.recv().await.expect("update channel closed");
            if update.kind == kind {
                return update;
            }
        }
    })
    .await
    .expect("timed out waiting for update")
}
