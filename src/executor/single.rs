//! Single-task executor
//!
//! Runs independent callables on a fixed pool of worker threads fed by a
//! [`BoundedWorkQueue`]. A full queue never blocks the caller for long: the
//! returned handle is pre-failed with [`TaskError::QueueFull`] instead.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result, TaskError};

use super::handle::ResultHandle;
use super::queue::{BoundedWorkQueue, EnqueuePolicy};
use super::state::{reap_workers, Counters, ExecutorStats, Lifecycle, LifecycleState};
use super::task::{Task, TaskOutcome};

// ─────────────────────────────────────────────────────────────────
// Executor Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the single-task executor
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Number of worker threads (0 = one per CPU)
    pub max_workers: usize,

    /// Maximum queued tasks
    pub queue_capacity: usize,

    /// How long `submit` may wait for queue space (zero = fail fast)
    pub enqueue_timeout: Duration,

    /// Worker dequeue poll interval
    pub poll_interval: Duration,

    /// Bound on `shutdown(true)`
    pub shutdown_timeout: Duration,

    /// Worker thread name prefix
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_capacity: 100,
            enqueue_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(5),
            thread_name: "emosense-task".to_string(),
        }
    }
}

impl ExecutorConfig {
    /// Set the number of worker threads
    pub fn with_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Set the queue capacity
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Set the enqueue timeout (zero = fail fast)
    pub fn with_enqueue_timeout(mut self, enqueue_timeout: Duration) -> Self {
        self.enqueue_timeout = enqueue_timeout;
        self
    }

    /// Set the shutdown join bound
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Worker count after resolving 0 to the CPU count
    pub fn effective_workers(&self) -> usize {
        if self.max_workers == 0 {
            num_cpus::get()
        } else {
            self.max_workers
        }
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::config_field_invalid("queue_capacity", "must be at least 1"));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::config_field_invalid("poll_interval", "must be non-zero"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Single Task Executor
// ─────────────────────────────────────────────────────────────────

struct Shared {
    queue: BoundedWorkQueue<Task>,
    lifecycle: Arc<Lifecycle>,
    counters: Counters,
    poll_interval: Duration,
}

/// Runs submitted callables one at a time per worker thread
pub struct SingleTaskExecutor {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: Duration,
    name: String,
}

impl SingleTaskExecutor {
    /// Create the executor and start its workers
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let workers = config.effective_workers();

        let shared = Arc::new(Shared {
            queue: BoundedWorkQueue::new(
                config.queue_capacity,
                EnqueuePolicy::from_timeout(config.enqueue_timeout),
            ),
            lifecycle: Arc::new(Lifecycle::new()),
            counters: Counters::default(),
            poll_interval: config.poll_interval,
        });

        let executor = Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(workers)),
            shutdown_timeout: config.shutdown_timeout,
            name: config.thread_name.clone(),
        };

        for id in 0..workers {
            let name = format!("{}-{}", config.thread_name, id);
            let shared = executor.shared.clone();
            let guard = shared.lifecycle.worker_started();

            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let _guard = guard;
                    worker_loop(&shared);
                })
                .map_err(|source| Error::WorkerSpawn { name, source })?;

            executor.workers.lock().push(handle);
        }

        info!(
            executor = %executor.name,
            workers,
            queue_capacity = config.queue_capacity,
            "Task executor started"
        );

        Ok(executor)
    }

    /// Submit a callable for background execution.
    ///
    /// Fails with [`TaskError::ShuttingDown`] once shutdown has begun. A full
    /// queue yields a handle already failed with [`TaskError::QueueFull`].
    pub fn submit<T, F>(&self, f: F) -> std::result::Result<ResultHandle<T>, TaskError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let handle = ResultHandle::pending();
        let task = Task::new(f, handle.clone());
        let task_id = task.id;

        let admitted = self
            .shared
            .lifecycle
            .admit(|| self.shared.queue.enqueue(task));

        match admitted {
            None => {
                debug!(executor = %self.name, "Rejected submission during shutdown");
                Err(TaskError::ShuttingDown)
            }
            Some(Ok(())) => {
                Counters::bump(&self.shared.counters.submitted);
                trace!(executor = %self.name, task_id = %task_id, "Task queued");
                Ok(handle)
            }
            Some(Err(_full)) => {
                Counters::bump(&self.shared.counters.rejected);
                let capacity = self.shared.queue.capacity();
                warn!(executor = %self.name, task_id = %task_id, capacity, "Task queue full");
                handle.reject(TaskError::QueueFull { capacity });
                Ok(handle)
            }
        }
    }

    /// Submit and suspend the calling async task until the result is ready
    pub async fn submit_and_await<T, F>(&self, f: F) -> std::result::Result<T, TaskError>
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Clone + Send + 'static,
    {
        let handle = self.submit(f)?;
        handle.wait_async().await
    }

    /// Stop accepting work.
    ///
    /// With `wait`, blocks until queued work is drained and the workers have
    /// exited, bounded by the shutdown timeout; after that the executor is
    /// Stopped and still-queued handles stay pending.
    pub fn shutdown(&self, wait: bool) {
        if self.shared.lifecycle.begin_drain() {
            info!(
                executor = %self.name,
                queued = self.shared.queue.len(),
                "Task executor draining"
            );
        }

        if !wait {
            return;
        }

        let clean = self.shared.lifecycle.wait_stopped(self.shutdown_timeout);
        let handles = std::mem::take(&mut *self.workers.lock());
        reap_workers(handles, &self.name);

        if clean {
            info!(executor = %self.name, "Task executor stopped");
        } else {
            warn!(
                executor = %self.name,
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                abandoned = self.shared.queue.len(),
                "Task executor shutdown timed out"
            );
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    /// Number of tasks waiting for a worker
    pub fn queue_len(&self) -> usize {
        self.shared.queue.len()
    }

    /// Snapshot of execution statistics
    pub fn stats(&self) -> ExecutorStats {
        let c = &self.shared.counters;
        ExecutorStats {
            state: self.state(),
            workers: self.shared.lifecycle.live_workers(),
            queued: self.queue_len(),
            submitted: Counters::get(&c.submitted),
            rejected: Counters::get(&c.rejected),
            completed: Counters::get(&c.completed),
            failed: Counters::get(&c.failed),
            panicked: Counters::get(&c.panicked),
        }
    }
}

impl Drop for SingleTaskExecutor {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

// ─────────────────────────────────────────────────────────────────
// Worker Loop
// ─────────────────────────────────────────────────────────────────

fn worker_loop(shared: &Shared) {
    let worker = thread::current().name().unwrap_or("task-worker").to_string();
    debug!(worker = %worker, "Worker started");

    loop {
        match shared.queue.dequeue(shared.poll_interval) {
            Some(task) => run_task(shared, task, &worker),
            None => {
                // Nothing new can arrive once draining, so empty means done.
                if !shared.lifecycle.is_running() && shared.queue.is_empty() {
                    break;
                }
            }
        }
    }

    debug!(worker = %worker, "Worker exiting");
}

fn run_task(shared: &Shared, task: Task, worker: &str) {
    let task_id = task.id;
    let waited = task.enqueued_at.elapsed();

    match task.execute() {
        TaskOutcome::Completed => {
            Counters::bump(&shared.counters.completed);
            trace!(worker, task_id = %task_id, waited_ms = waited.as_millis() as u64, "Task completed");
        }
        TaskOutcome::Failed => {
            Counters::bump(&shared.counters.failed);
            debug!(worker, task_id = %task_id, "Task returned an error");
        }
        TaskOutcome::Panicked => {
            Counters::bump(&shared.counters.panicked);
            error!(worker, task_id = %task_id, "Task panicked");
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
