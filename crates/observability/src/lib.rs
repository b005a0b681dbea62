//! # Observability
//!
//! Tracing setup shared by every supervisor component.
//!
//! Components call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Logs are written as JSONL to a central
//! file (`~/.agent-supervisor/logs/supervisor.jsonl` by default) so they can
//! be followed with `tail -f … | jq`, with an optional compact stderr layer
//! for foreground runs.
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "supervisor".into(),
//!     default_level: "debug".into(),
//!     also_stderr: true,
//!     ..Default::default()
//! });
//! tracing::info!("ready");
//! ```

mod writer;

pub use writer::CentralLogWriter;

use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, logged once at initialization.
    pub service_name: String,

    /// Default filter directive (e.g. "info", "agent_process_manager=debug").
    /// Overridden by `RUST_LOG` when set.
    pub default_level: String,

    /// Optional custom log file path.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Default location of the central log file.
pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".agent-supervisor")
        .join("logs")
        .join("supervisor.jsonl")
}

/// Initialize with default settings for the given service.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the global subscriber.
///
/// If the log file cannot be opened the file layer is skipped and logs go to
/// stderr only. Calling this more than once is harmless; later calls leave
/// the first subscriber in place.
pub fn init_with_config(config: LogConfig) {
    let log_path = config.log_path.clone().unwrap_or_else(default_log_path);

    let file_layer = match CentralLogWriter::open(&log_path) {
        Ok(writer) => Some(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(false)
                .with_target(true)
                .with_writer(writer)
                .with_filter(env_filter(&config.default_level)),
        ),
        Err(e) => {
            eprintln!(
                "observability: failed to open log file {}: {}",
                log_path.display(),
                e
            );
            None
        }
    };
    let file_enabled = file_layer.is_some();

    let stderr_layer = (config.also_stderr || !file_enabled).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&config.default_level))
    });

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::info!(
            service = %config.service_name,
            pid = std::process::id(),
            log_path = %log_path.display(),
            file_enabled,
            "observability initialized"
        );
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};
