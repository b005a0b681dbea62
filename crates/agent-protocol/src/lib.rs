//! Protocol adapters for talking to a coding agent over stdio.
//!
//! Two wire protocols are supported, selected by [`ProtocolKind`]:
//!
//! - `acp`: JSON-RPC 2.0 Agent Client Protocol
//! - `stream-json`: Claude CLI stream-json events
//!
//! Both variants implement [`ProtocolAdapter`]. [`create_adapter`] builds
//! one over an [`AdapterIo`] pair and a [`PermissionHandler`] that is
//! invoked for every agent permission request.

mod acp;
mod adapter;
mod error;
mod kind;
mod stream_json;
mod transport;
mod types;

pub use acp::AcpAdapter;
pub use adapter::{
    create_adapter, AdapterOptions, ProtocolAdapter, DEFAULT_HANDSHAKE_TIMEOUT,
    DEFAULT_UPDATE_CAPACITY,
};
pub use error::{ProtocolError, ProtocolResult};
pub use kind::ProtocolKind;
pub use stream_json::{parse_stdout_line, StreamJsonAdapter, ALLOW_OPTION_ID, DENY_OPTION_ID};
pub use transport::{AdapterIo, BoxedReader, BoxedWriter};
pub use types::{
    permission_handler, PermissionDecision, PermissionFuture, PermissionHandler,
    PermissionOption, PermissionOptionKind, PermissionRequest, SessionUpdate, SessionUpdateKind,
};
