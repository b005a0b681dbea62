mod common;

use agent_output_buffer::OutputStream;
use agent_process_manager::{AgentProcessManager, ManagerError, ProcessStatus};
use agent_protocol::SessionUpdateKind;
use common::*;
use std::time::Duration;
use supervisor_config::TrackerConfig;

const INIT_LINE: &str = r#"{"type":"system","subtype":"init","session_id":"sess-42"}"#;
const PERMISSION_LINE: &str = r#"{"type":"control_request","request_id":"req-1","request":{"subtype":"can_use_tool","tool_name":"Bash","input":{"command":"ls"}}}"#;

#[tokio::test]
async fn updates_are_forwarded_and_recorded() {
    if !shell_available() {
        return;
    }
    let script = format!("printf '%s\\n' '{INIT_LINE}'; cat > /dev/null");
    let manager = AgentProcessManager::new(shell_agent(&script), None);
    let mut updates = manager.take_updates().unwrap();
    assert!(manager.take_updates().is_none());

    manager.start().await.unwrap();

    let update = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.kind, SessionUpdateKind::SessionStarted);
    assert_eq!(manager.session_id().as_deref(), Some("sess-42"));
    assert_eq!(manager.process_info().session_id, "sess-42");

    let stdout: Vec<_> = manager
        .output_buffer()
        .get_all()
        .into_iter()
        .filter(|l| l.stream == OutputStream::Stdout)
        .collect();
    assert_eq!(stdout.len(), 1);
    assert_eq!(stdout[0].content, INIT_LINE);

    manager.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn permission_round_trip_through_manager() {
    if !shell_available() {
        return;
    }
    let script = format!(
        "printf '%s\\n' '{PERMISSION_LINE}'; read reply; echo \"$reply\" >&2; cat > /dev/null"
    );
    let manager = AgentProcessManager::new(shell_agent(&script), None);
    let mut notifications = manager.take_permission_notifications().unwrap();

    manager.start().await.unwrap();

    let notification = tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(notification.request.title, "Bash");
    assert_eq!(manager.pending_permissions().len(), 1);

    manager
        .respond_to_permission(&notification.id, Some("allow".into()), false)
        .unwrap();
    let err = manager
        .respond_to_permission(&notification.id, Some("allow".into()), false)
        .unwrap_err();
    assert_eq!(err.code(), "permission_not_found");

    let reply = wait_for_stderr(&manager, 1).await;
    let reply: serde_json::Value = serde_json::from_str(&reply[0].content).unwrap();
    assert_eq!(reply["type"], "control_response");
    assert_eq!(reply["response"]["response"]["behavior"], "allow");
    assert_eq!(reply["response"]["response"]["updatedInput"]["command"], "ls");

    manager.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn stop_cancels_pending_permissions() {
    if !shell_available() {
        return;
    }
    let script = format!("printf '%s\\n' '{PERMISSION_LINE}'; cat > /dev/null");
    let manager = AgentProcessManager::new(shell_agent(&script), None);
    let mut notifications = manager.take_permission_notifications().unwrap();

    manager.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .unwrap()
        .unwrap();

    manager.stop(Duration::from_secs(5)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), async {
        while !manager.pending_permissions().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pending permissions cleared");
}

#[tokio::test]
async fn unprompted_exit_cancels_pending_permissions() {
    if !shell_available() {
        return;
    }
    let script = format!("printf '%s\\n' '{PERMISSION_LINE}'; sleep 0.3; exit 0");
    let manager = AgentProcessManager::new(shell_agent(&script), None);
    let mut notifications = manager.take_permission_notifications().unwrap();

    manager.start().await.unwrap();
    tokio::time::timeout(Duration::from_secs(5), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(manager.pending_permissions().len(), 1);

    wait_for_status(&manager, ProcessStatus::Stopped).await;
    tokio::time::timeout(Duration::from_secs(1), async {
        while !manager.pending_permissions().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("pending permissions cleared after agent exit");

    manager.stop(Duration::from_millis(50)).await.unwrap();
    assert!(manager.pending_permissions().is_empty());
}

#[tokio::test]
async fn auto_approve_answers_without_notification() {
    if !shell_available() {
        return;
    }
    let script = format!(
        "printf '%s\\n' '{PERMISSION_LINE}'; read reply; echo \"$reply\" >&2; cat > /dev/null"
    );
    let manager =
        AgentProcessManager::new(shell_agent(&script).with_auto_approve(true), None);
    let mut notifications = manager.take_permission_notifications().unwrap();

    manager.start().await.unwrap();
    let reply = wait_for_stderr(&manager, 1).await;
    assert!(reply[0].content.contains("\"behavior\":\"allow\""));
    assert!(notifications.try_recv().is_err());

    manager.stop(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn send_prompt_reaches_agent_stdin() {
    if !shell_available() {
        return;
    }
    let manager = AgentProcessManager::new(
        shell_agent("read prompt; echo \"$prompt\" >&2; cat > /dev/null"),
        None,
    );

    let err = manager.send_prompt("too early").await.unwrap_err();
    assert!(matches!(err, ManagerError::NotRunning));

    manager.start().await.unwrap();
    manager.send_prompt("hi").await.unwrap();

    let lines = wait_for_stderr(&manager, 1).await;
    let prompt: serde_json::Value = serde_json::from_str(&lines[0].content).unwrap();
    assert_eq!(prompt["type"], "user");
    assert_eq!(prompt["message"]["content"][0]["text"], "hi");

    manager.stop(Duration::from_secs(5)).await.unwrap();
    assert_eq!(manager.status(), ProcessStatus::Stopped);
}

#[tokio::test]
async fn tracker_follows_manager_lifecycle() {
    if !shell_available() {
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let mut config = shell_agent("cat > /dev/null");
    config.working_dir = dir.path().to_path_buf();
    let tracker_config = TrackerConfig {
        interval_ms: 50,
        ..TrackerConfig::default()
    };
    let manager = AgentProcessManager::new(config, Some(tracker_config));
    let tracker = manager.workspace_tracker().unwrap().clone();
    assert!(!tracker.is_running());

    manager.start().await.unwrap();
    assert!(tracker.is_running());

    manager.stop(Duration::from_secs(5)).await.unwrap();
    assert!(!tracker.is_running());
}

#[tokio::test]
async fn disabled_tracker_is_not_attached() {
    let config = shell_agent("cat > /dev/null");
    let tracker_config = TrackerConfig {
        enabled: false,
        ..TrackerConfig::default()
    };
    let manager = AgentProcessManager::new(config, Some(tracker_config));
    assert!(manager.workspace_tracker().is_none());
}
