mod common;

use agent_process_manager::{AgentProcessManager, ManagerError, ProcessStatus};
use common::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use supervisor_config::AgentConfig;

// =============================================================================
// Start failures
// =============================================================================

#[tokio::test]
async fn empty_command_fails_with_error_status() {
    let manager = AgentProcessManager::new(AgentConfig::new(vec![], std::env::temp_dir()), None);

    let err = manager.start().await.unwrap_err();
    assert!(matches!(err, ManagerError::NoCommand));
    assert_eq!(err.to_string(), "no agent command configured");
    assert_eq!(manager.status(), ProcessStatus::Error);
    assert_eq!(manager.exit_code(), -1);
    assert_eq!(
        manager.exit_error().as_deref(),
        Some("no agent command configured")
    );
}

#[tokio::test]
async fn unsupported_protocol_fails_before_spawn() {
    let config = shell_agent("exit 0").with_protocol("carrier-pigeon");
    let manager = AgentProcessManager::new(config, None);

    let err = manager.start().await.unwrap_err();
    assert_eq!(err.code(), "unsupported_protocol");
    assert_eq!(manager.status(), ProcessStatus::Error);
    assert!(manager.pid().is_none());

    manager.stop(Duration::from_millis(50)).await.unwrap();
    assert_eq!(manager.status(), ProcessStatus::Stopped);
}

#[tokio::test]
async fn missing_executable_is_spawn_error() {
    let config = AgentConfig::new(
        vec!["/definitely/not/an/agent".to_string()],
        std::env::temp_dir(),
    );
    let manager = AgentProcessManager::new(config, None);

    let err = manager.start().await.unwrap_err();
    assert_eq!(err.code(), "spawn_failed");
    assert_eq!(manager.status(), ProcessStatus::Error);
    assert!(manager.exit_error().is_some());
}

// =============================================================================
// Start / Stop
// =============================================================================

#[tokio::test]
async fn start_then_stop_settles_stopped() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("cat > /dev/null"), None);

    manager.start().await.unwrap();
    assert_eq!(manager.status(), ProcessStatus::Running);
    assert!(manager.pid().is_some());
    assert!(manager.adapter().is_some());

    let info = manager.process_info();
    assert_eq!(info.status, "running");
    assert_eq!(info.exit_code, "-1");
    assert_eq!(info.protocol, "stream-json");
    assert!(!info.pid.is_empty());
    assert!(!info.started_at.is_empty());

    manager.stop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(manager.status(), ProcessStatus::Stopped);
    assert_eq!(manager.exit_code(), 0);
    assert!(manager.exit_error().is_none());
}

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("cat > /dev/null"), None);

    manager.start().await.unwrap();
    let err = manager.start().await.unwrap_err();
    assert!(matches!(err, ManagerError::AlreadyRunning));
    assert_eq!(manager.status(), ProcessStatus::Running);

    manager.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn stop_is_idempotent() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("cat > /dev/null"), None);

    manager.stop(Duration::from_millis(10)).await.unwrap();
    manager.start().await.unwrap();
    manager.stop(Duration::from_secs(5)).await.unwrap();
    manager.stop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(manager.status(), ProcessStatus::Stopped);
}

#[tokio::test]
async fn restart_resets_exit_state() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("cat > /dev/null; exit 4"), None);

    manager.start().await.unwrap();
    manager.stop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(manager.exit_code(), 4);
    assert!(manager.exit_error().is_some());

    manager.start().await.unwrap();
    assert_eq!(manager.exit_code(), -1);
    assert!(manager.exit_error().is_none());
    manager.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn stop_kills_agent_ignoring_eof() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("exec sleep 5"), None);
    manager.start().await.unwrap();

    let started = Instant::now();
    manager.stop(Duration::from_millis(50)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(manager.status(), ProcessStatus::Stopped);
    assert!(elapsed < Duration::from_secs(2), "stop took {elapsed:?}");
    assert!(elapsed >= Duration::from_millis(50));
    assert_eq!(manager.exit_code(), -1);
    assert!(manager.exit_error().is_some());
}

#[tokio::test]
async fn stop_meets_deadline_while_prompt_write_is_blocked() {
    if !shell_available() {
        return;
    }
    let manager = Arc::new(AgentProcessManager::new(shell_agent("exec sleep 5"), None));
    manager.start().await.unwrap();

    // Far more than a pipe buffer, so the write parks until the agent dies.
    let writer = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.send_prompt(&"x".repeat(4 * 1024 * 1024)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(4), manager.stop(Duration::from_millis(50)))
        .await
        .expect("stop blocked behind the stdin write")
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(manager.status(), ProcessStatus::Stopped);
    assert!(elapsed < Duration::from_secs(3), "stop took {elapsed:?}");
    assert_eq!(manager.exit_code(), -1);

    let write = tokio::time::timeout(Duration::from_secs(2), writer)
        .await
        .expect("blocked write released after kill")
        .unwrap();
    assert!(write.is_err());
}

#[tokio::test]
async fn watch_status_reports_transitions() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("cat > /dev/null"), None);
    let mut status = manager.watch_status();
    assert_eq!(*status.borrow_and_update(), ProcessStatus::Stopped);

    manager.start().await.unwrap();
    assert!(status.has_changed().unwrap());
    assert_eq!(*status.borrow_and_update(), ProcessStatus::Running);

    manager.stop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(*status.borrow_and_update(), ProcessStatus::Stopped);
}

// =============================================================================
// Exit observation
// =============================================================================

#[tokio::test]
async fn unprompted_exit_moves_to_stopped() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("exit 3"), None);
    manager.start().await.unwrap();

    wait_for_status(&manager, ProcessStatus::Stopped).await;
    assert_eq!(manager.exit_code(), 3);
    assert!(manager.exit_error().unwrap().contains('3'));
    assert!(manager.pid().is_none());

    // A fresh start is allowed after the agent went away.
    manager.start().await.unwrap();
    wait_for_status(&manager, ProcessStatus::Stopped).await;
}

#[tokio::test]
async fn stderr_lines_land_in_output_buffer_in_order() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(shell_agent("echo hello >&2; echo world >&2"), None);
    manager.start().await.unwrap();

    let lines = wait_for_stderr(&manager, 2).await;
    let contents: Vec<&str> = lines.iter().map(|l| l.content.as_str()).collect();
    assert_eq!(contents, vec!["hello", "world"]);
    assert!(lines[0].timestamp <= lines[1].timestamp);

    manager.stop(Duration::from_secs(5)).await.unwrap();
}
