//! Bounded subscriber mailboxes with best-effort fanout.
//!
//! A [`SubscriberSet`] holds one bounded `mpsc` sender per subscriber, keyed
//! by [`SubscriptionId`]. Publishing never blocks: a full mailbox misses the
//! value, a mailbox whose receiver was dropped is pruned. Unsubscribing drops
//! the only sender, which closes the mailbox exactly once.
//!
//! # Design Principles
//!
//! - Each set has its own lock; fanout for one set never waits on another
//! - A slow subscriber only affects itself
//! - New subscribers can be primed with the current value atomically

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Identity of one subscriber within a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// The receiving half of a mailbox.
#[derive(Debug)]
pub struct Subscription<T> {
    id: SubscriptionId,
    receiver: mpsc::Receiver<T>,
}

impl<T> Subscription<T> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next value. Returns `None` once the mailbox is closed
    /// and drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    /// Take a value if one is immediately available.
    pub fn try_recv(&mut self) -> Option<T> {
        self.receiver.try_recv().ok()
    }

    /// Whether the mailbox has been closed and fully drained.
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed() && self.receiver.is_empty()
    }
}

/// Outcome of one [`SubscriberSet::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    /// Mailboxes that were full and missed this value.
    pub dropped: usize,
    /// Mailboxes pruned because their receiver was gone.
    pub pruned: usize,
}

/// A set of bounded subscriber mailboxes for values of type `T`.
pub struct SubscriberSet<T> {
    label: &'static str,
    capacity: usize,
    next_id: AtomicU64,
    mailboxes: Mutex<HashMap<SubscriptionId, mpsc::Sender<T>>>,
}

impl<T: Clone> SubscriberSet<T> {
    /// Create an empty set whose mailboxes hold up to `capacity` values.
    ///
    /// `label` names the set in log lines.
    pub fn new(label: &'static str, capacity: usize) -> Self {
        Self {
            label,
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            mailboxes: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new mailbox.
    pub fn subscribe(&self) -> Subscription<T> {
        self.subscribe_with(None)
    }

    /// Register a new mailbox and deliver `initial` into it before any
    /// published value can reach it.
    pub fn subscribe_with(&self, initial: Option<T>) -> Subscription<T> {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));

        let mut mailboxes = self.mailboxes.lock();
        if let Some(value) = initial {
            // Fresh mailbox with capacity >= 1: cannot be full.
            let _ = sender.try_send(value);
        }
        mailboxes.insert(id, sender);
        drop(mailboxes);

        debug!(set = self.label, subscription = %id, "Subscriber registered");
        Subscription { id, receiver }
    }

    /// Deregister a mailbox, closing it. Returns `false` if the id was
    /// unknown (already unsubscribed).
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.mailboxes.lock().remove(&id).is_some();
        if removed {
            debug!(set = self.label, subscription = %id, "Subscriber removed");
        }
        removed
    }

    /// Deliver `value` to every mailbox without waiting.
    pub fn publish(&self, value: &T) -> FanoutReport {
        let mut report = FanoutReport::default();
        let mut mailboxes = self.mailboxes.lock();

        mailboxes.retain(|id, sender| match sender.try_send(value.clone()) {
            Ok(()) => {
                report.delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                report.dropped += 1;
                debug!(set = self.label, subscription = %id, "Mailbox full, dropping value");
                true
            }
            Err(TrySendError::Closed(_)) => {
                report.pruned += 1;
                false
            }
        });

        report
    }

    /// Number of registered mailboxes.
    pub fn len(&self) -> usize {
        self.mailboxes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> fmt::Debug for SubscriberSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("subscribers", &self.mailboxes.lock().len())
            .finish()
    }
}
