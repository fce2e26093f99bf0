//! Executor integration tests
//!
//! Exercise both executors through the public API: isolation, admission
//! caps, batch-wide failure, positional results and shutdown behaviour.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use common::{eventually, WAIT};
use emosense_runtime::benchmark::{score_batch, synthetic_logits, FrameScore};
use emosense_runtime::{
    batch_fn, BatchConfig, BatchExecutor, BatchFn, ExecutorConfig, HandleState, LifecycleState,
    ResultHandle, SingleTaskExecutor, TaskError,
};

fn square(x: i64) -> anyhow::Result<i64> {
    Ok(x * x)
}

// ─────────────────────────────────────────────────────────────────
// Single-Task Executor
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_squares_map_to_their_inputs() {
    let executor = SingleTaskExecutor::new(
        ExecutorConfig::default()
            .with_workers(2)
            .with_queue_capacity(100),
    )
    .unwrap();

    let handles: Vec<ResultHandle<i64>> = (0..5)
        .map(|x| executor.submit(move || square(x)).unwrap())
        .collect();
    let results: Vec<i64> = handles.iter().map(|h| h.wait_timeout(WAIT).unwrap()).collect();

    assert_eq!(results, vec![0, 1, 4, 9, 16]);
    executor.shutdown(true);
}

#[test]
fn test_failing_task_does_not_affect_others() {
    let executor = SingleTaskExecutor::new(ExecutorConfig::default().with_workers(1)).unwrap();

    let bad = executor
        .submit(|| -> anyhow::Result<i64> { anyhow::bail!("face crop empty") })
        .unwrap();
    let panicky = executor
        .submit(|| -> anyhow::Result<i64> { panic!("landmark index out of bounds") })
        .unwrap();
    let good = executor.submit(|| square(12)).unwrap();

    assert!(matches!(bad.wait_timeout(WAIT), Err(TaskError::Failed(_))));
    assert!(matches!(panicky.wait_timeout(WAIT), Err(TaskError::Panicked(_))));
    assert_eq!(good.wait_timeout(WAIT).unwrap(), 144);

    // Counters are bumped just after the handle resolves
    assert!(eventually(WAIT, || executor.stats().finished() == 3));
    let stats = executor.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.panicked, 1);
    assert_eq!(stats.completed, 1);
    executor.shutdown(true);
}

#[test]
fn test_submit_after_shutdown_fails() {
    let executor = SingleTaskExecutor::new(ExecutorConfig::default()).unwrap();
    executor.shutdown(true);

    assert_eq!(executor.state(), LifecycleState::Stopped);
    assert!(matches!(
        executor.submit(|| square(2)),
        Err(TaskError::ShuttingDown)
    ));
}

#[test]
fn test_queue_full_is_distinguishable() {
    let executor = SingleTaskExecutor::new(
        ExecutorConfig::default()
            .with_workers(1)
            .with_queue_capacity(2)
            .with_enqueue_timeout(Duration::ZERO),
    )
    .unwrap();

    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock();

    let handles: Vec<ResultHandle<i64>> = (0..10)
        .map(|x| {
            let gate = gate.clone();
            executor
                .submit(move || {
                    let _open = gate.lock();
                    square(x)
                })
                .unwrap()
        })
        .collect();

    let rejected: Vec<_> = handles
        .iter()
        .filter_map(|h| h.try_get())
        .filter_map(|r| r.err())
        .collect();
    // One in the worker, two queued; the rest bounce
    assert!(rejected.len() >= 7);
    assert!(rejected.iter().all(|e| e.is_admission_rejection()));

    drop(held);
    let finished = handles
        .iter()
        .filter(|h| h.wait_timeout(WAIT).is_ok())
        .count();
    assert_eq!(finished + rejected.len(), 10);
    executor.shutdown(true);
}

#[tokio::test]
async fn test_submit_and_await_does_not_block_runtime() {
    let executor = Arc::new(SingleTaskExecutor::new(ExecutorConfig::default()).unwrap());

    let slow = {
        let executor = executor.clone();
        tokio::spawn(async move {
            executor
                .submit_and_await(|| {
                    thread::sleep(Duration::from_millis(100));
                    square(3)
                })
                .await
        })
    };
    let fast = executor.submit_and_await(|| square(4)).await.unwrap();

    assert_eq!(fast, 16);
    assert_eq!(slow.await.unwrap().unwrap(), 9);
    executor.shutdown(true);
}

// ─────────────────────────────────────────────────────────────────
// Batch Executor
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_admission_cap_n_plus_one() {
    const N: usize = 6;
    let executor = BatchExecutor::new(
        BatchConfig::default()
            .with_batch_size(N * 2)
            .with_fill_timeout(Duration::from_millis(300))
            .with_max_outstanding(N),
    )
    .unwrap();
    let double: BatchFn<i64, i64> = batch_fn(|xs: Vec<i64>| Ok(xs.iter().map(|x| x * 2).collect()));

    let handles = executor.submit_batch(&double, 0..(N as i64 + 1)).unwrap();
    let full = handles
        .iter()
        .filter(|h| matches!(h.try_get(), Some(Err(TaskError::BatchQueueFull { .. }))))
        .count();

    assert_eq!(full, 1);
    assert_eq!(executor.outstanding(), N);
    executor.shutdown(true);
}

#[test]
fn test_batch_wide_failure() {
    let executor = BatchExecutor::new(
        BatchConfig::default()
            .with_batch_size(3)
            .with_fill_timeout(Duration::from_millis(200)),
    )
    .unwrap();
    let broken: BatchFn<i64, i64> = batch_fn(|xs: Vec<i64>| {
        if xs.contains(&13) {
            anyhow::bail!("unlucky frame in batch");
        }
        Ok(xs)
    });

    let handles = executor.submit_batch(&broken, vec![1, 13, 2]).unwrap();
    let errors: Vec<TaskError> = handles
        .iter()
        .map(|h| h.wait_timeout(WAIT).unwrap_err())
        .collect();

    for err in &errors {
        match err {
            TaskError::BatchFailed { size, cause } => {
                assert_eq!(*size, 3);
                assert_eq!(cause.to_string(), "unlucky frame in batch");
            }
            other => panic!("expected batch failure, got {:?}", other),
        }
    }
    assert!(handles.iter().all(|h| h.state() == HandleState::Failed));
    executor.shutdown(true);
}

#[test]
fn test_positional_results_with_real_workload() {
    let executor = BatchExecutor::new(BatchConfig::default()).unwrap();
    let scorer: BatchFn<_, FrameScore> = batch_fn(score_batch);

    let frames: Vec<_> = (0..20).map(synthetic_logits).collect();
    let expected = score_batch(frames.clone()).unwrap();

    let handles = executor.submit_batch(&scorer, frames).unwrap();
    let scores: Vec<FrameScore> = handles.iter().map(|h| h.wait_timeout(WAIT).unwrap()).collect();

    assert_eq!(scores, expected);
    executor.shutdown(true);
}

#[test]
fn test_partial_batch_after_fill_timeout() {
    let sizes = Arc::new(Mutex::new(Vec::new()));
    let recorded = sizes.clone();
    let executor = BatchExecutor::new(
        BatchConfig::default()
            .with_batch_size(4)
            .with_fill_timeout(Duration::from_millis(100)),
    )
    .unwrap();
    let func = batch_fn(move |xs: Vec<i64>| {
        recorded.lock().push(xs.len());
        Ok(xs)
    });

    let handles = executor.submit_batch(&func, vec![1, 2, 3]).unwrap();
    thread::sleep(Duration::from_millis(250));

    assert!(handles.iter().all(|h| h.is_resolved()));
    assert_eq!(*sizes.lock(), vec![3]);
    executor.shutdown(true);
}

#[test]
fn test_concurrent_submitters_never_exceed_cap() {
    const CAP: usize = 16;
    let executor = Arc::new(
        BatchExecutor::new(
            BatchConfig::default()
                .with_batch_size(4)
                .with_fill_timeout(Duration::from_millis(5))
                .with_max_outstanding(CAP),
        )
        .unwrap(),
    );
    let processed = Arc::new(AtomicUsize::new(0));
    let func = {
        let processed = processed.clone();
        batch_fn(move |xs: Vec<usize>| {
            thread::sleep(Duration::from_millis(2));
            processed.fetch_add(xs.len(), Ordering::SeqCst);
            Ok(xs)
        })
    };

    let submitters: Vec<_> = (0..4)
        .map(|_| {
            let executor = executor.clone();
            let func = func.clone();
            thread::spawn(move || {
                let mut accepted = Vec::new();
                for i in 0..50 {
                    let handle = executor.submit_one(&func, i).unwrap();
                    assert!(executor.outstanding() <= CAP);
                    if !matches!(handle.try_get(), Some(Err(TaskError::BatchQueueFull { .. }))) {
                        accepted.push((i, handle));
                    }
                }
                accepted
            })
        })
        .collect();

    let mut accepted = 0;
    for submitter in submitters {
        for (i, handle) in submitter.join().unwrap() {
            assert_eq!(handle.wait_timeout(WAIT).unwrap(), i);
            accepted += 1;
        }
    }

    assert!(eventually(WAIT, || executor.outstanding() == 0));
    assert_eq!(processed.load(Ordering::SeqCst), accepted);
    executor.shutdown(true);
}

#[test]
fn test_batch_shutdown_rejects_new_work() {
    let executor: BatchExecutor<i64, i64> = BatchExecutor::new(BatchConfig::default()).unwrap();
    let identity: BatchFn<i64, i64> = batch_fn(|xs: Vec<i64>| Ok(xs));

    executor.shutdown(true);
    assert_eq!(executor.state(), LifecycleState::Stopped);
    assert!(matches!(
        executor.submit_one(&identity, 1),
        Err(TaskError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_submit_batch_and_await() {
    let executor = BatchExecutor::new(BatchConfig::default().with_batch_size(2)).unwrap();
    let square_all = batch_fn(|xs: Vec<i64>| xs.into_iter().map(square).collect());

    let results = executor
        .submit_batch_and_await(&square_all, vec![2, 3, 4])
        .await
        .unwrap();
    let values: Vec<i64> = results.into_iter().map(|r| r.unwrap()).collect();

    assert_eq!(values, vec![4, 9, 16]);
    executor.shutdown(true);
}
