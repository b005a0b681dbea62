//! Configuration management for the supervisor.

use crate::{CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default protocol tag spoken with the agent.
pub const DEFAULT_PROTOCOL: &str = "acp";

/// How long a permission request waits for an external decision.
pub const DEFAULT_PERMISSION_TIMEOUT_SECS: u64 = 300;

/// Workspace refresh interval.
pub const DEFAULT_TRACKER_INTERVAL_MS: u64 = 2_000;

/// Number of output lines retained per agent run.
pub const DEFAULT_OUTPUT_BUFFER_CAPACITY: usize = 1_000;

/// Main supervisor configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// The supervised agent.
    pub agent: AgentConfig,
    /// Workspace observation.
    pub tracker: TrackerConfig,
}

/// How to launch and talk to the agent subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Executable followed by its arguments.
    pub command: Vec<String>,
    /// Working directory of the agent (and of the workspace tracker).
    pub working_dir: PathBuf,
    /// Extra environment variables passed to the agent.
    pub env: HashMap<String, String>,
    /// Protocol tag: "acp" or "stream-json".
    pub protocol: String,
    /// Answer every permission request without asking.
    pub auto_approve: bool,
    pub permission_timeout_secs: u64,
    /// Capacity of the session update channel handed to callers.
    pub update_channel_capacity: usize,
    /// Capacity of the permission notification channel.
    pub notification_channel_capacity: usize,
    pub output_buffer_capacity: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            working_dir: PathBuf::from("."),
            env: HashMap::new(),
            protocol: DEFAULT_PROTOCOL.to_string(),
            auto_approve: false,
            permission_timeout_secs: DEFAULT_PERMISSION_TIMEOUT_SECS,
            update_channel_capacity: 256,
            notification_channel_capacity: 64,
            output_buffer_capacity: DEFAULT_OUTPUT_BUFFER_CAPACITY,
        }
    }
}

impl AgentConfig {
    /// Create a configuration for the given command line and directory.
    pub fn new(command: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            working_dir: working_dir.into(),
            ..Default::default()
        }
    }

    /// Set the protocol tag.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    /// Enable or disable auto-approval.
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.auto_approve = auto_approve;
        self
    }

    /// Add an environment variable for the agent process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Workspace tracker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub enabled: bool,
    pub interval_ms: u64,
    /// Upper bound for each git invocation.
    pub command_timeout_secs: u64,
    /// Capacity of each subscriber mailbox.
    pub mailbox_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_TRACKER_INTERVAL_MS,
            command_timeout_secs: 10,
            mailbox_capacity: 16,
        }
    }
}

impl Config {
    /// Create a Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.normalize();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.normalize();
        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&content)?;
        config.normalize();
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Only the log level can be overridden at runtime.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("SUPERVISOR_LOG_LEVEL") {
            if !log_level.trim().is_empty() {
                self.log_level = log_level.trim().to_string();
            }
        }
    }

    fn normalize(&mut self) {
        if self.log_level.trim().is_empty() {
            self.log_level = DEFAULT_LOG_LEVEL.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert!(!config.log_level.is_empty());
        assert!(config.agent.command.is_empty());
        assert_eq!(config.agent.protocol, DEFAULT_PROTOCOL);
        assert_eq!(
            config.agent.permission_timeout_secs,
            DEFAULT_PERMISSION_TIMEOUT_SECS
        );
        assert!(config.tracker.enabled);
        assert_eq!(config.tracker.interval_ms, DEFAULT_TRACKER_INTERVAL_MS);
    }

    #[test]
    fn test_config_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "agent": {
                "command": ["claude", "--verbose"],
                "protocol": "stream-json"
            },
            "tracker": { "interval_ms": 500 }
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.agent.command, vec!["claude", "--verbose"]);
        assert_eq!(config.agent.protocol, "stream-json");
        assert_eq!(config.agent.output_buffer_capacity, DEFAULT_OUTPUT_BUFFER_CAPACITY);
        assert_eq!(config.tracker.interval_ms, 500);
        assert!(config.tracker.enabled);
    }

    #[test]
    fn test_empty_log_level_normalized() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, r#"{ "log_level": "" }"#).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.agent = AgentConfig::new(vec!["agent".into()], "/work")
            .with_protocol("stream-json")
            .with_auto_approve(true)
            .with_env("FOO", "bar");
        config.save(&paths).unwrap();

        let loaded = Config::load(&paths).unwrap();
        assert_eq!(loaded.agent.command, vec!["agent"]);
        assert_eq!(loaded.agent.working_dir, PathBuf::from("/work"));
        assert!(loaded.agent.auto_approve);
        assert_eq!(loaded.agent.env.get("FOO").map(String::as_str), Some("bar"));
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.agent.protocol, DEFAULT_PROTOCOL);
    }

    #[test]
    fn test_invalid_json_is_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");
        std::fs::write(&config_path, "{ not json").unwrap();

        assert!(matches!(
            Config::load_from_file(&config_path),
            Err(crate::CoreError::Json(_))
        ));
    }
}
