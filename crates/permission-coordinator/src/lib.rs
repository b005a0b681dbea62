//! Permission coordination between the agent and a human.
//!
//! Adapters call the [`PermissionHandler`](agent_protocol::PermissionHandler)
//! returned by [`PermissionCoordinator::handler`]. Each call registers a
//! pending request, publishes a [`PermissionNotification`] and waits for
//! [`PermissionCoordinator::respond`], a timeout, or
//! [`PermissionCoordinator::cancel_all`].

mod coordinator;
mod error;

pub use coordinator::{
    CoordinatorConfig, PermissionCoordinator, PermissionNotification,
    DEFAULT_NOTIFICATION_CAPACITY, DEFAULT_PERMISSION_TIMEOUT,
};
pub use error::{PermissionError, PermissionResult};
