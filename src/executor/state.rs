//! Executor lifecycle and execution counters
//!
//! Tracks the Running → Draining → Stopped transition shared by both
//! executors, the number of live worker threads, and lock-free statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ─────────────────────────────────────────────────────────────────
// Lifecycle
// ─────────────────────────────────────────────────────────────────

/// Executor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Accepting submissions
    Running,
    /// Refusing submissions, finishing accepted work
    Draining,
    /// Workers have exited or were abandoned
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "running"),
            LifecycleState::Draining => write!(f, "draining"),
            LifecycleState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Shared lifecycle of an executor and its worker threads
pub(crate) struct Lifecycle {
    /// Submitters hold the read side while admitting; shutdown takes the
    /// write side, so no admission can straddle the transition.
    state: RwLock<LifecycleState>,
    live_workers: Mutex<usize>,
    workers_changed: Condvar,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: RwLock::new(LifecycleState::Running),
            live_workers: Mutex::new(0),
            workers_changed: Condvar::new(),
        }
    }

    pub(crate) fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    /// Run `admit` only while Running; returns None otherwise
    pub(crate) fn admit<R>(&self, admit: impl FnOnce() -> R) -> Option<R> {
        let state = self.state.read();
        if *state != LifecycleState::Running {
            return None;
        }
        Some(admit())
    }

    /// Move Running → Draining. Returns false if already past Running.
    pub(crate) fn begin_drain(&self) -> bool {
        let mut state = self.state.write();
        if *state == LifecycleState::Running {
            *state = LifecycleState::Draining;
            true
        } else {
            false
        }
    }

    fn mark_stopped(&self) {
        *self.state.write() = LifecycleState::Stopped;
    }

    /// Register a worker before its thread is spawned.
    ///
    /// The guard moves into the thread; dropping it (or failing to spawn)
    /// unregisters the worker.
    pub(crate) fn worker_started(self: &Arc<Self>) -> WorkerExitGuard {
        *self.live_workers.lock() += 1;
        WorkerExitGuard {
            lifecycle: self.clone(),
        }
    }

    fn worker_exited(&self) {
        let mut live = self.live_workers.lock();
        *live = live.saturating_sub(1);
        if *live == 0 && self.state() != LifecycleState::Running {
            self.mark_stopped();
        }
        self.workers_changed.notify_all();
    }

    pub(crate) fn live_workers(&self) -> usize {
        *self.live_workers.lock()
    }

    /// Wait until every worker has exited, at most `timeout`.
    ///
    /// The state is Stopped afterwards either way; returns false if workers
    /// were abandoned. A timeout too large to express as a deadline waits
    /// without bound.
    pub(crate) fn wait_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut live = self.live_workers.lock();
        while *live > 0 {
            match deadline {
                Some(deadline) => {
                    if self.workers_changed.wait_until(&mut live, deadline).timed_out() {
                        break;
                    }
                }
                None => self.workers_changed.wait(&mut live),
            }
        }
        let clean = *live == 0;
        drop(live);
        self.mark_stopped();
        clean
    }
}

/// Decrements the live-worker count when a worker thread ends, even by unwinding
pub(crate) struct WorkerExitGuard {
    lifecycle: Arc<Lifecycle>,
}

impl Drop for WorkerExitGuard {
    fn drop(&mut self) {
        self.lifecycle.worker_exited();
    }
}

/// Join workers that finished; detach the rest
pub(crate) fn reap_workers(handles: Vec<JoinHandle<()>>, executor: &str) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("unnamed").to_string();
        if handle.is_finished() {
            if handle.join().is_err() {
                warn!(executor, worker = %name, "Worker thread terminated by panic");
            } else {
                debug!(executor, worker = %name, "Worker joined");
            }
        } else {
            warn!(executor, worker = %name, "Worker still busy after shutdown timeout, abandoning");
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Counters
// ─────────────────────────────────────────────────────────────────

/// Monotonic counters updated by submitters and workers
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) submitted: AtomicU64,
    pub(crate) rejected: AtomicU64,
    pub(crate) completed: AtomicU64,
    pub(crate) failed: AtomicU64,
    pub(crate) panicked: AtomicU64,
    pub(crate) batches: AtomicU64,
    pub(crate) failed_batches: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time statistics of a [`SingleTaskExecutor`](super::SingleTaskExecutor)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub state: LifecycleState,
    pub workers: usize,
    pub queued: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub panicked: u64,
}

impl ExecutorStats {
    /// Tasks that reached a worker and finished, successfully or not
    pub fn finished(&self) -> u64 {
        self.completed + self.failed + self.panicked
    }
}

/// Point-in-time statistics of a [`BatchExecutor`](super::BatchExecutor)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStats {
    pub state: LifecycleState,
    pub outstanding: usize,
    pub queued: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub items_completed: u64,
    pub items_failed: u64,
}

impl BatchStats {
    /// Mean number of items per dispatched batch
    pub fn mean_batch_size(&self) -> f64 {
        if self.batches == 0 {
            return 0.0;
        }
        (self.items_completed + self.items_failed) as f64 / self.batches as f64
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_lifecycle_transitions() {
        let lifecycle = Arc::new(Lifecycle::new());
        assert_eq!(lifecycle.state(), LifecycleState::Running);
        assert_eq!(lifecycle.admit(|| 1), Some(1));

        assert!(lifecycle.begin_drain());
        assert!(!lifecycle.begin_drain());
        assert_eq!(lifecycle.state(), LifecycleState::Draining);
        assert_eq!(lifecycle.admit(|| 1), None);

        // No workers were ever registered
        assert!(lifecycle.wait_stopped(Duration::from_millis(10)));
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
    }

    #[test]
    fn test_last_worker_exit_stops_draining_executor() {
        let lifecycle = Arc::new(Lifecycle::new());

        let workers: Vec<_> = (0..3)
            .map(|_| {
                let guard = lifecycle.worker_started();
                thread::spawn(move || {
                    let _guard = guard;
                    thread::sleep(Duration::from_millis(20));
                })
            })
            .collect();

        assert_eq!(lifecycle.live_workers(), 3);
        lifecycle.begin_drain();
        assert!(lifecycle.wait_stopped(Duration::from_secs(2)));
        assert_eq!(lifecycle.live_workers(), 0);
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);

        for w in workers {
            w.join().unwrap();
        }
    }

    #[test]
    fn test_wait_stopped_times_out_on_stuck_worker() {
        let lifecycle = Arc::new(Lifecycle::new());
        let (tx, rx) = std::sync::mpsc::channel::<()>();

        let guard = lifecycle.worker_started();
        let t = thread::spawn(move || {
            let _guard = guard;
            let _ = rx.recv();
        });

        lifecycle.begin_drain();
        assert!(!lifecycle.wait_stopped(Duration::from_millis(30)));
        // Abandoned, but considered stopped regardless
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);

        tx.send(()).unwrap();
        t.join().unwrap();
    }

    #[test]
    fn test_wait_stopped_with_unbounded_timeout() {
        let lifecycle = Arc::new(Lifecycle::new());
        let guard = lifecycle.worker_started();
        let t = thread::spawn(move || {
            let _guard = guard;
            thread::sleep(Duration::from_millis(20));
        });

        lifecycle.begin_drain();
        assert!(lifecycle.wait_stopped(Duration::MAX));
        assert_eq!(lifecycle.state(), LifecycleState::Stopped);
        t.join().unwrap();
    }

    #[test]
    fn test_worker_guard_runs_on_unwind() {
        let lifecycle = Arc::new(Lifecycle::new());
        let guard = lifecycle.worker_started();

        let result = thread::spawn(move || {
            let _guard = guard;
            panic!("worker bug");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(lifecycle.live_workers(), 0);
    }

    #[test]
    fn test_mean_batch_size() {
        let stats = BatchStats {
            state: LifecycleState::Running,
            outstanding: 0,
            queued: 0,
            submitted: 10,
            rejected: 0,
            batches: 4,
            failed_batches: 1,
            items_completed: 7,
            items_failed: 3,
        };
        assert!((stats.mean_batch_size() - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = ExecutorStats {
            state: LifecycleState::Draining,
            workers: 2,
            queued: 1,
            submitted: 5,
            rejected: 1,
            completed: 2,
            failed: 1,
            panicked: 0,
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"state\":\"draining\""));
        assert_eq!(stats.finished(), 3);
    }
}
