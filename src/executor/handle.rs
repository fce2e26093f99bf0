//! Write-once result handles
//!
//! A [`ResultHandle`] is created when work is submitted and resolved exactly
//! once by whoever finishes (or refuses) that work. Observers may block on it
//! from plain threads or await it from async code; every observer sees the
//! same terminal outcome.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::error::TaskError;

/// Observable state of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Not resolved yet
    Pending,
    /// Resolved with a value
    Fulfilled,
    /// Resolved with an error
    Failed,
}

enum Outcome<T> {
    Pending,
    Fulfilled(T),
    Failed(TaskError),
}

struct Slot<T> {
    outcome: Mutex<Outcome<T>>,
    ready: Condvar,
    notify: Notify,
}

/// Single-assignment future shared between a task and its observers
pub struct ResultHandle<T> {
    slot: Arc<Slot<T>>,
}

impl<T> Clone for ResultHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> fmt::Debug for ResultHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultHandle")
            .field("state", &self.state())
            .finish()
    }
}

impl<T> Default for ResultHandle<T> {
    fn default() -> Self {
        Self::pending()
    }
}

impl<T> ResultHandle<T> {
    /// Create an unresolved handle
    pub fn pending() -> Self {
        Self {
            slot: Arc::new(Slot {
                outcome: Mutex::new(Outcome::Pending),
                ready: Condvar::new(),
                notify: Notify::new(),
            }),
        }
    }

    /// Create a handle that is already failed
    pub fn rejected(err: TaskError) -> Self {
        let handle = Self::pending();
        handle.reject(err);
        handle
    }

    /// Resolve with a value. Returns false if the handle was already resolved.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Outcome::Fulfilled(value))
    }

    /// Resolve with an error. Returns false if the handle was already resolved.
    pub fn reject(&self, err: TaskError) -> bool {
        self.settle(Outcome::Failed(err))
    }

    fn settle(&self, outcome: Outcome<T>) -> bool {
        {
            let mut current = self.slot.outcome.lock();
            if !matches!(*current, Outcome::Pending) {
                return false;
            }
            *current = outcome;
        }
        self.slot.ready.notify_all();
        self.slot.notify.notify_waiters();
        true
    }

    /// Current state without blocking
    pub fn state(&self) -> HandleState {
        match *self.slot.outcome.lock() {
            Outcome::Pending => HandleState::Pending,
            Outcome::Fulfilled(_) => HandleState::Fulfilled,
            Outcome::Failed(_) => HandleState::Failed,
        }
    }

    /// True once the handle holds a value or an error
    pub fn is_resolved(&self) -> bool {
        self.state() != HandleState::Pending
    }
}

impl<T: Clone> ResultHandle<T> {
    /// Peek at the outcome without blocking
    pub fn try_get(&self) -> Option<Result<T, TaskError>> {
        read(&self.slot.outcome.lock())
    }

    /// Block the calling thread until the handle resolves
    pub fn wait(&self) -> Result<T, TaskError> {
        let mut outcome = self.slot.outcome.lock();
        loop {
            if let Some(result) = read(&outcome) {
                return result;
            }
            self.slot.ready.wait(&mut outcome);
        }
    }

    /// Block for at most `timeout`.
    ///
    /// On expiry returns [`TaskError::Timeout`]; the handle is left untouched
    /// and may still be waited on again. A timeout too large to express as a
    /// deadline waits without bound.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            return self.wait();
        };
        let mut outcome = self.slot.outcome.lock();
        loop {
            if let Some(result) = read(&outcome) {
                return result;
            }
            if self.slot.ready.wait_until(&mut outcome, deadline).timed_out() {
                return read(&outcome).unwrap_or(Err(TaskError::Timeout(timeout)));
            }
        }
    }

    /// Suspend the calling async task until the handle resolves.
    ///
    /// Never parks a runtime thread; the resolving worker wakes the task.
    pub async fn wait_async(&self) -> Result<T, TaskError> {
        loop {
            let notified = self.slot.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a resolution in between is not missed.
            notified.as_mut().enable();

            if let Some(result) = self.try_get() {
                return result;
            }
            notified.await;
        }
    }
}

fn read<T: Clone>(outcome: &Outcome<T>) -> Option<Result<T, TaskError>> {
    match outcome {
        Outcome::Pending => None,
        Outcome::Fulfilled(value) => Some(Ok(value.clone())),
        Outcome::Failed(err) => Some(Err(err.clone())),
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
