//! Configuration, paths and logging bootstrap for the agent supervisor.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    AgentConfig, Config, TrackerConfig, DEFAULT_LOG_LEVEL, DEFAULT_OUTPUT_BUFFER_CAPACITY,
    DEFAULT_PERMISSION_TIMEOUT_SECS, DEFAULT_PROTOCOL, DEFAULT_TRACKER_INTERVAL_MS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service};
pub use paths::Paths;
