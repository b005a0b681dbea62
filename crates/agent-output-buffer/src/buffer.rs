//! Fixed-capacity output history with live subscribers.

use crate::line::{OutputLine, OutputStream};
use mailbox_fanout::{SubscriberSet, Subscription, SubscriptionId};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Mailbox capacity for live tail subscribers.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// Retains the most recent `capacity` output lines, evicting oldest first,
/// and forwards every appended line to live subscribers.
pub struct OutputBuffer {
    capacity: usize,
    lines: Mutex<VecDeque<OutputLine>>,
    subscribers: SubscriberSet<OutputLine>,
}

impl OutputBuffer {
    /// Create a buffer holding up to `capacity` lines (at least one).
    pub fn new(capacity: usize) -> Self {
        Self::with_subscriber_capacity(capacity, DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_subscriber_capacity(capacity: usize, subscriber_capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: Mutex::new(VecDeque::with_capacity(capacity)),
            subscribers: SubscriberSet::new("output", subscriber_capacity),
        }
    }

    /// Append one line, evicting the oldest if full, then fan it out.
    ///
    /// Fanout happens under the ring lock so subscribers see lines in
    /// retention order.
    pub fn append(&self, line: OutputLine) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        let stream = line.stream;
        let report = self.subscribers.publish(&line);
        lines.push_back(line);
        drop(lines);

        if report.dropped > 0 {
            tracing::trace!(
                dropped = report.dropped,
                stream = %stream,
                "Output subscriber mailboxes full"
            );
        }
    }

    /// Append text read from the given stream.
    pub fn push(&self, stream: OutputStream, content: impl Into<String>) {
        self.append(OutputLine::new(stream, content));
    }

    /// All retained lines, oldest first.
    pub fn get_all(&self) -> Vec<OutputLine> {
        self.lines.lock().iter().cloned().collect()
    }

    /// The newest `n` lines, oldest first. `n` is clamped to the number of
    /// retained lines.
    pub fn get_last(&self, n: usize) -> Vec<OutputLine> {
        let lines = self.lines.lock();
        let skip = lines.len().saturating_sub(n);
        lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all retained lines. Subscribers stay registered.
    pub fn clear(&self) {
        self.lines.lock().clear();
    }

    /// Follow lines appended from now on.
    pub fn subscribe(&self) -> Subscription<OutputLine> {
        self.subscribers.subscribe()
    }

    /// Stop following. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.unsubscribe(id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(1_000)
    }
}

impl std::fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
