//! Supervision of a single coding-agent subprocess.
//!
//! [`AgentProcessManager`] spawns the configured agent command, speaks the
//! configured protocol to it, routes permission requests through a
//! [`PermissionCoordinator`](permission_coordinator::PermissionCoordinator),
//! captures output into an [`OutputBuffer`](agent_output_buffer::OutputBuffer)
//! and optionally tracks the agent's working directory.
//!
//! ```text
//!  start() ──► spawn child ──► create_adapter(stdout, stdin, handler)
//!                 │                         │
//!                 │ stderr                  │ SessionUpdate
//!                 ▼                         ▼
//!           stderr reader            update forwarder ──► take_updates()
//!                 │                         │
//!                 └──────► OutputBuffer ◄───┘
//!
//!  exit waiter owns the Child: records exit, honours kill requests
//! ```

mod error;
mod info;
mod manager;
mod status;
mod tasks;

pub use error::{ManagerError, ManagerResult};
pub use info::ProcessInfo;
pub use manager::AgentProcessManager;
pub use status::{ProcessStatus, StatusCell};
