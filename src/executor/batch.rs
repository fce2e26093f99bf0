//! Batching executor
//!
//! Items are submitted one at a time but processed in groups: a dedicated
//! worker accumulates up to `batch_size` items (or whatever arrived within
//! `fill_timeout` of the first one) and hands their arguments to a single
//! group function call. Each item keeps its own [`ResultHandle`].
//!
//! Admission is bounded by an outstanding-item counter rather than queue
//! depth. A slot is held from admission until the whole batch containing the
//! item has finished, so a slow group function throttles submitters even
//! while the queue itself is empty.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result, TaskError};

use super::handle::ResultHandle;
use super::state::{reap_workers, BatchStats, Counters, Lifecycle, LifecycleState};
use super::task::{panic_message, TaskId};

/// Upper bound on the up-front allocation for a forming batch
const MAX_PREALLOCATED_ITEMS: usize = 256;

/// Group function: ordered arguments in, equal-length ordered results out
pub type BatchFn<A, R> = Arc<dyn Fn(Vec<A>) -> anyhow::Result<Vec<R>> + Send + Sync + 'static>;

/// Wrap a closure as a [`BatchFn`]
pub fn batch_fn<A, R, F>(f: F) -> BatchFn<A, R>
where
    F: Fn(Vec<A>) -> anyhow::Result<Vec<R>> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ─────────────────────────────────────────────────────────────────
// Batch Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the batching executor
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Maximum items per group call
    pub batch_size: usize,

    /// How long to wait for a batch to fill after its first item
    pub fill_timeout: Duration,

    /// Admission cap on items not yet accounted for by a finished batch
    pub max_outstanding: usize,

    /// Bound on `shutdown(true)`
    pub shutdown_timeout: Duration,

    /// Worker thread name
    pub thread_name: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 8,
            fill_timeout: Duration::from_millis(100),
            max_outstanding: 100,
            shutdown_timeout: Duration::from_secs(5),
            thread_name: "emosense-batch".to_string(),
        }
    }
}

impl BatchConfig {
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_fill_timeout(mut self, fill_timeout: Duration) -> Self {
        self.fill_timeout = fill_timeout;
        self
    }

    pub fn with_max_outstanding(mut self, max_outstanding: usize) -> Self {
        self.max_outstanding = max_outstanding;
        self
    }

    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::config_field_invalid("batch_size", "must be at least 1"));
        }
        if self.max_outstanding == 0 {
            return Err(Error::config_field_invalid("max_outstanding", "must be at least 1"));
        }
        if self.fill_timeout.is_zero() {
            return Err(Error::config_field_invalid("fill_timeout", "must be non-zero"));
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Batch Executor
// ─────────────────────────────────────────────────────────────────

struct BatchItem<A, R> {
    id: TaskId,
    arg: A,
    func: BatchFn<A, R>,
    handle: ResultHandle<R>,
}

struct Shared<A, R> {
    tx: Sender<BatchItem<A, R>>,
    rx: Receiver<BatchItem<A, R>>,
    /// Admission lock: every check, increment and decrement happens here
    outstanding: Mutex<usize>,
    lifecycle: Arc<Lifecycle>,
    counters: Counters,
    batch_size: usize,
    fill_timeout: Duration,
    max_outstanding: usize,
}

/// Groups individually submitted items into batched function calls
pub struct BatchExecutor<A, R> {
    shared: Arc<Shared<A, R>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
    name: String,
}

impl<A, R> BatchExecutor<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    /// Create the executor and start its batch worker
    pub fn new(config: BatchConfig) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared {
            tx,
            rx,
            outstanding: Mutex::new(0),
            lifecycle: Arc::new(Lifecycle::new()),
            counters: Counters::default(),
            batch_size: config.batch_size,
            fill_timeout: config.fill_timeout,
            max_outstanding: config.max_outstanding,
        });

        let guard = shared.lifecycle.worker_started();
        let worker_shared = shared.clone();
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let _guard = guard;
                batch_loop(&worker_shared);
            })
            .map_err(|source| Error::WorkerSpawn {
                name: config.thread_name.clone(),
                source,
            })?;

        info!(
            executor = %config.thread_name,
            batch_size = config.batch_size,
            fill_timeout_ms = config.fill_timeout.as_millis() as u64,
            max_outstanding = config.max_outstanding,
            "Batch executor started"
        );

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            shutdown_timeout: config.shutdown_timeout,
            name: config.thread_name,
        })
    }

    /// Submit a single item for batched processing.
    ///
    /// Fails with [`TaskError::ShuttingDown`] once shutdown has begun. When
    /// the outstanding cap is reached the handle comes back already failed
    /// with [`TaskError::BatchQueueFull`]; this never blocks.
    pub fn submit_one(
        &self,
        func: &BatchFn<A, R>,
        arg: A,
    ) -> std::result::Result<ResultHandle<R>, TaskError> {
        let shared = &self.shared;
        let handle = ResultHandle::pending();
        let item = BatchItem {
            id: TaskId::next(),
            arg,
            func: func.clone(),
            handle: handle.clone(),
        };
        let item_id = item.id;

        let admitted = shared.lifecycle.admit(|| {
            let mut outstanding = shared.outstanding.lock();
            if *outstanding >= shared.max_outstanding {
                return false;
            }
            // Sent under the admission lock so per-submitter order is kept
            // and the counter never runs ahead of the queue.
            if shared.tx.send(item).is_err() {
                return false;
            }
            *outstanding += 1;
            true
        });

        match admitted {
            None => Err(TaskError::ShuttingDown),
            Some(true) => {
                Counters::bump(&shared.counters.submitted);
                trace!(executor = %self.name, item_id = %item_id, "Batch item queued");
                Ok(handle)
            }
            Some(false) => {
                Counters::bump(&shared.counters.rejected);
                debug!(
                    executor = %self.name,
                    item_id = %item_id,
                    max_outstanding = shared.max_outstanding,
                    "Batch queue full"
                );
                handle.reject(TaskError::BatchQueueFull {
                    max_outstanding: shared.max_outstanding,
                });
                Ok(handle)
            }
        }
    }

    /// Submit every argument in order; handles line up with `args`.
    ///
    /// Admission is per item, so later items may be rejected with
    /// [`TaskError::BatchQueueFull`] while earlier ones were accepted.
    pub fn submit_batch(
        &self,
        func: &BatchFn<A, R>,
        args: impl IntoIterator<Item = A>,
    ) -> std::result::Result<Vec<ResultHandle<R>>, TaskError> {
        args.into_iter()
            .map(|arg| self.submit_one(func, arg))
            .collect()
    }

    /// Submit a batch and await every item.
    ///
    /// The outer error is a refused submission; each inner result is that
    /// item's own outcome.
    pub async fn submit_batch_and_await(
        &self,
        func: &BatchFn<A, R>,
        args: impl IntoIterator<Item = A>,
    ) -> std::result::Result<Vec<std::result::Result<R, TaskError>>, TaskError>
    where
        R: Clone,
    {
        let handles = self.submit_batch(func, args)?;
        Ok(join_all(handles.iter().map(|h| h.wait_async())).await)
    }
}

impl<A, R> BatchExecutor<A, R> {
    /// Stop accepting items.
    ///
    /// The worker finishes the batch it is forming, fails whatever is still
    /// queued with [`TaskError::ShuttingDown`] and exits. With `wait`, blocks
    /// for that at most the shutdown timeout.
    pub fn shutdown(&self, wait: bool) {
        if self.shared.lifecycle.begin_drain() {
            info!(
                executor = %self.name,
                outstanding = *self.shared.outstanding.lock(),
                "Batch executor draining"
            );
        }

        if !wait {
            return;
        }

        let clean = self.shared.lifecycle.wait_stopped(self.shutdown_timeout);
        let handles: Vec<_> = self.worker.lock().take().into_iter().collect();
        reap_workers(handles, &self.name);

        if clean {
            info!(executor = %self.name, "Batch executor stopped");
        } else {
            warn!(
                executor = %self.name,
                timeout_ms = self.shutdown_timeout.as_millis() as u64,
                "Batch executor shutdown timed out"
            );
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.state()
    }

    /// Items admitted but not yet accounted for by a finished batch
    pub fn outstanding(&self) -> usize {
        *self.shared.outstanding.lock()
    }

    /// Items waiting to be pulled into a batch
    pub fn queue_len(&self) -> usize {
        self.shared.rx.len()
    }

    /// Snapshot of batching statistics
    pub fn stats(&self) -> BatchStats {
        let c = &self.shared.counters;
        BatchStats {
            state: self.state(),
            outstanding: self.outstanding(),
            queued: self.queue_len(),
            submitted: Counters::get(&c.submitted),
            rejected: Counters::get(&c.rejected),
            batches: Counters::get(&c.batches),
            failed_batches: Counters::get(&c.failed_batches),
            items_completed: Counters::get(&c.completed),
            items_failed: Counters::get(&c.failed),
        }
    }
}

impl<A, R> Drop for BatchExecutor<A, R> {
    fn drop(&mut self) {
        self.shutdown(false);
    }
}

// ─────────────────────────────────────────────────────────────────
// Batch Worker
// ─────────────────────────────────────────────────────────────────

fn batch_loop<A, R>(shared: &Shared<A, R>) {
    debug!("Batch worker started");

    while shared.lifecycle.is_running() {
        let first = match shared.rx.recv_timeout(shared.fill_timeout) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let batch = fill_batch(shared, first);
        let size = batch.len();
        let handles: Vec<ResultHandle<R>> = batch.iter().map(|item| item.handle.clone()).collect();

        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| dispatch(shared, batch))) {
            let message = panic_message(payload.as_ref());
            error!(size, error = %message, "Batch worker fault, failing batch");
            let failure = TaskError::batch_failed(size, anyhow!("batch worker fault: {}", message));
            for handle in &handles {
                handle.reject(failure.clone());
            }
            release_slots(shared, size);
        }
    }

    reject_leftovers(shared);
    debug!("Batch worker exiting");
}

/// Accumulate items after `first` until the batch is full or the fill
/// deadline passes
fn fill_batch<A, R>(shared: &Shared<A, R>, first: BatchItem<A, R>) -> Vec<BatchItem<A, R>> {
    let mut batch = Vec::with_capacity(shared.batch_size.min(MAX_PREALLOCATED_ITEMS));
    batch.push(first);

    // No representable deadline: wait for the batch to fill
    let deadline = Instant::now().checked_add(shared.fill_timeout);
    while batch.len() < shared.batch_size {
        let next = match deadline {
            Some(deadline) => shared.rx.recv_deadline(deadline).ok(),
            None => shared.rx.recv().ok(),
        };
        match next {
            Some(item) => batch.push(item),
            None => break,
        }
    }
    batch
}

/// Run one formed batch and release its outstanding slots
fn dispatch<A, R>(shared: &Shared<A, R>, batch: Vec<BatchItem<A, R>>) {
    let size = batch.len();

    for (func, items) in partition_by_fn(batch) {
        run_group(shared, &func, items);
    }

    release_slots(shared, size);
}

fn release_slots<A, R>(shared: &Shared<A, R>, n: usize) {
    let mut outstanding = shared.outstanding.lock();
    *outstanding = outstanding.saturating_sub(n);
}

/// Split a batch into runs sharing the same group function, in first-seen order
fn partition_by_fn<A, R>(batch: Vec<BatchItem<A, R>>) -> Vec<(BatchFn<A, R>, Vec<BatchItem<A, R>>)> {
    let mut groups: Vec<(BatchFn<A, R>, Vec<BatchItem<A, R>>)> = Vec::new();
    for item in batch {
        let key = Arc::as_ptr(&item.func) as *const ();
        match groups
            .iter_mut()
            .find(|(func, _)| Arc::as_ptr(func) as *const () == key)
        {
            Some((_, items)) => items.push(item),
            None => groups.push((item.func.clone(), vec![item])),
        }
    }
    groups
}

fn run_group<A, R>(shared: &Shared<A, R>, func: &BatchFn<A, R>, items: Vec<BatchItem<A, R>>) {
    let size = items.len();
    let first_id = items.first().map(|item| item.id);
    let (args, handles): (Vec<A>, Vec<ResultHandle<R>>) =
        items.into_iter().map(|item| (item.arg, item.handle)).unzip();

    let started = Instant::now();
    let outcome = match catch_unwind(AssertUnwindSafe(|| func(args))) {
        Ok(Ok(results)) if results.len() == size => Ok(results),
        Ok(Ok(results)) => Err(anyhow!(
            "group function returned {} results for {} items",
            results.len(),
            size
        )),
        Ok(Err(err)) => Err(err),
        Err(payload) => Err(anyhow!(
            "group function panicked: {}",
            panic_message(payload.as_ref())
        )),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    Counters::bump(&shared.counters.batches);
    match outcome {
        Ok(results) => {
            for (handle, result) in handles.iter().zip(results) {
                handle.resolve(result);
            }
            Counters::add(&shared.counters.completed, size);
            debug!(size, elapsed_ms, first_item = ?first_id, "Batch completed");
        }
        Err(err) => {
            let failure = TaskError::batch_failed(size, err);
            for handle in &handles {
                handle.reject(failure.clone());
            }
            Counters::bump(&shared.counters.failed_batches);
            Counters::add(&shared.counters.failed, size);
            error!(size, elapsed_ms, error = %failure, "Batch failed");
        }
    }
}

/// Fail items that were admitted but never made it into a batch
fn reject_leftovers<A, R>(shared: &Shared<A, R>) {
    let mut rejected = 0usize;
    while let Ok(item) = shared.rx.try_recv() {
        item.handle.reject(TaskError::ShuttingDown);
        rejected += 1;
    }

    if rejected > 0 {
        release_slots(shared, rejected);
        warn!(rejected, "Rejected queued batch items on shutdown");
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
