//! Bounded history of agent output with live tailing.
//!
//! The process manager appends every stderr line (and every raw protocol
//! line from stdout) to an [`OutputBuffer`]. Callers read history with
//! [`OutputBuffer::get_all`] / [`OutputBuffer::get_last`] and follow new
//! output through [`OutputBuffer::subscribe`].

mod buffer;
mod line;

pub use buffer::{OutputBuffer, DEFAULT_SUBSCRIBER_CAPACITY};
pub use line::{OutputLine, OutputStream};
pub use mailbox_fanout::{Subscription, SubscriptionId};
