//! Short-lived `git` subprocesses.

use crate::error::{TrackerError, TrackerResult};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Locates and executes the git CLI with a per-command timeout.
#[derive(Debug, Clone)]
pub struct GitCommandRunner {
    executable: String,
    timeout: Duration,
}

impl GitCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            executable: resolve_git_executable(),
            timeout,
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Run git in `working_dir` and return its raw stdout.
    ///
    /// Output is returned untrimmed: porcelain records start with a
    /// significant space.
    pub async fn run(&self, args: &[&str], working_dir: &Path) -> TrackerResult<String> {
        let command_repr = format!("git {}", args.join(" "));

        let mut cmd = Command::new(&self.executable);
        cmd.args(args);
        cmd.current_dir(working_dir);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);
        apply_non_interactive_env(&mut cmd);

        let output = match timeout(self.timeout, cmd.output()).await {
            Err(_) => {
                return Err(TrackerError::Timeout {
                    command: command_repr,
                    timeout_secs: self.timeout.as_secs(),
                });
            }
            Ok(Err(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(TrackerError::GitNotInstalled);
            }
            Ok(Err(err)) => return Err(TrackerError::Io(err)),
            Ok(Ok(output)) => output,
        };

        if output.status.success() {
            return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failed_command(
            command_repr,
            output.status.code(),
            stderr,
        ))
    }
}

fn apply_non_interactive_env(cmd: &mut Command) {
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd.env("GIT_OPTIONAL_LOCKS", "0");
    cmd.env("GIT_PAGER", "cat");
    cmd.env("PAGER", "cat");
    cmd.env("NO_COLOR", "1");
    cmd.env("LC_ALL", "C");
}

fn resolve_git_executable() -> String {
    if let Ok(path) = std::env::var("GIT_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    for candidate in ["/opt/homebrew/bin/git", "/usr/local/bin/git", "/usr/bin/git"] {
        if Path::new(candidate).exists() {
            return candidate.to_string();
        }
    }

    "git".to_string()
}

fn classify_failed_command(command: String, exit_code: Option<i32>, stderr: String) -> TrackerError {
    if stderr.to_ascii_lowercase().contains("not a git repository") {
        return TrackerError::NotARepository { message: stderr };
    }
    TrackerError::CommandFailed {
        command,
        exit_code,
        stderr,
    }
}
