#![allow(dead_code)]

use agent_output_buffer::{OutputLine, OutputStream};
use agent_process_manager::{AgentProcessManager, ProcessStatus};
use std::path::Path;
use std::time::Duration;
use supervisor_config::AgentConfig;

pub fn shell_available() -> bool {
    Path::new("/bin/sh").exists()
}

/// An agent that runs `script` under `/bin/sh` speaking stream-json.
pub fn shell_agent(script: &str) -> AgentConfig {
    AgentConfig::new(
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()],
        std::env::temp_dir(),
    )
    .with_protocol("stream-json")
}

pub async fn wait_for_status(manager: &AgentProcessManager, status: ProcessStatus) {
    let mut rx = manager.watch_status();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == status))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {status}"))
        .expect("status channel closed");
}

/// Poll the output buffer until `count` stderr lines are present.
pub async fn wait_for_stderr(manager: &AgentProcessManager, count: usize) -> Vec<OutputLine> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let lines: Vec<OutputLine> = manager
                .output_buffer()
                .get_all()
                .into_iter()
                .filter(|l| l.stream == OutputStream::Stderr)
                .collect();
            if lines.len() >= count {
                return lines;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("timed out waiting for stderr output")
}
