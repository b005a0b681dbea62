//! Logging initialization for the supervisor.

use crate::Paths;

/// Initialize the logging system.
///
/// Structured JSONL goes to `~/.agent-supervisor/logs/supervisor.jsonl`, the
/// level comes from `RUST_LOG` or `level`, and a compact copy is written to
/// stderr for foreground runs.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("Supervisor started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("supervisor", level);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    let log_path = Paths::new().ok().map(|paths| paths.log_file());

    observability::init_with_config(observability::LogConfig {
        service_name: service_name.into(),
        default_level: level.into(),
        log_path,
        also_stderr: true,
    });
}
