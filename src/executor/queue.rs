//! Bounded FIFO work queue
//!
//! Thin wrapper over a bounded crossbeam channel. Producers either fail fast
//! or wait a short, fixed bound when the queue is full; consumers poll with a
//! timeout so they can notice lifecycle changes.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};

/// What `enqueue` does when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueuePolicy {
    /// Report `Full` immediately
    FailFast,
    /// Wait up to the given bound, then report `Full`
    Block(Duration),
}

impl EnqueuePolicy {
    /// Zero means fail fast
    pub fn from_timeout(timeout: Duration) -> Self {
        if timeout.is_zero() {
            EnqueuePolicy::FailFast
        } else {
            EnqueuePolicy::Block(timeout)
        }
    }
}

/// The queue had no room; the item is handed back.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueFull<T>(pub T);

impl<T> QueueFull<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Fixed-capacity multi-producer, multi-consumer FIFO
#[derive(Debug)]
pub struct BoundedWorkQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    policy: EnqueuePolicy,
}

impl<T> Clone for BoundedWorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
            capacity: self.capacity,
            policy: self.policy,
        }
    }
}

impl<T> BoundedWorkQueue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize, policy: EnqueuePolicy) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            capacity,
            policy,
        }
    }

    /// Add an item at the tail
    pub fn enqueue(&self, item: T) -> Result<(), QueueFull<T>> {
        // Both channel ends live in the queue, so it can never be disconnected.
        match self.policy {
            EnqueuePolicy::FailFast => self.tx.try_send(item).map_err(|e| match e {
                TrySendError::Full(item) | TrySendError::Disconnected(item) => QueueFull(item),
            }),
            EnqueuePolicy::Block(bound) => self.tx.send_timeout(item, bound).map_err(|e| match e {
                SendTimeoutError::Timeout(item) | SendTimeoutError::Disconnected(item) => {
                    QueueFull(item)
                }
            }),
        }
    }

    /// Take the head item, waiting at most `timeout`
    pub fn dequeue(&self, timeout: Duration) -> Option<T> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Take the head item if one is ready
    pub fn try_dequeue(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn policy(&self) -> EnqueuePolicy {
        self.policy
    }
}
