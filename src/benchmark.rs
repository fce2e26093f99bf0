//! Executor benchmarking
//!
//! Scores synthetic face crops (softmax over emotion logits) through both
//! executors. Producers react to admission rejections the way a capture loop
//! would: wait for the oldest in-flight frame, then retry. The report shows
//! throughput, batching efficiency and how often backpressure kicked in.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result, TaskError};
use crate::executor::{
    batch_fn, BatchConfig, BatchExecutor, BatchFn, ExecutorConfig, ResultHandle, SingleTaskExecutor,
};
use crate::version::BuildInfo;

/// Emotion classes produced by the classifier head
pub const EMOTION_LABELS: [&str; 8] = [
    "neutral", "happy", "sad", "surprise", "anger", "disgust", "fear", "contempt",
];

/// Raw classifier output for one face
pub type Logits = [f32; EMOTION_LABELS.len()];

/// Minimum probability for a secondary emotion to be reported
const SECONDARY_THRESHOLD: f32 = 0.3;

// ─────────────────────────────────────────────────────────────────
// Workload
// ─────────────────────────────────────────────────────────────────

/// Scored emotions for one face
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameScore {
    /// Most probable label
    pub dominant: &'static str,
    pub confidence: f32,
    /// Labels at or above the reporting threshold, most probable first
    pub above_threshold: Vec<(&'static str, f32)>,
}

/// Deterministic pseudo-logits for frame `index`
pub fn synthetic_logits(index: u64) -> Logits {
    let mut logits = [0.0f32; EMOTION_LABELS.len()];
    let mut state = index.wrapping_mul(0x9E37_79B9_7F4A_7C15) ^ 0xD1B5_4A32_D192_ED03;
    for logit in logits.iter_mut() {
        // xorshift64
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        *logit = ((state >> 40) as f32 / (1u64 << 24) as f32) * 8.0 - 4.0;
    }
    logits
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

/// Score one face
pub fn score_frame(logits: &Logits) -> anyhow::Result<FrameScore> {
    if logits.iter().any(|x| !x.is_finite()) {
        anyhow::bail!("classifier produced non-finite logits");
    }

    let probs = softmax(logits);
    let mut ranked: Vec<(&'static str, f32)> = EMOTION_LABELS.iter().copied().zip(probs).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let (dominant, confidence) = ranked[0];
    let above_threshold = ranked
        .into_iter()
        .take_while(|(_, p)| *p >= SECONDARY_THRESHOLD)
        .collect();

    Ok(FrameScore {
        dominant,
        confidence,
        above_threshold,
    })
}

/// Score a batch of faces in one call
pub fn score_batch(frames: Vec<Logits>) -> anyhow::Result<Vec<FrameScore>> {
    frames.iter().map(score_frame).collect()
}

// ─────────────────────────────────────────────────────────────────
// Benchmark Results
// ─────────────────────────────────────────────────────────────────

/// Complete benchmark results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkResults {
    /// When the benchmark was run
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Runtime version that produced the results
    pub version: String,

    pub iterations: u32,

    pub items_per_iteration: usize,

    /// Single-task executor results, summed over iterations
    pub single: ExecutorRun,

    /// Batch executor results, summed over iterations
    pub batch: BatchRun,

    /// Dominant emotion histogram from the single-task run
    pub dominant_counts: BTreeMap<String, u64>,

    /// Duration of the full benchmark
    pub duration_secs: f64,
}

/// Single-task executor benchmark results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorRun {
    pub workers: usize,
    pub queue_capacity: usize,
    pub completed: u64,
    pub failed: u64,
    /// Submissions refused with QueueFull and retried
    pub rejected: u64,
    pub duration_secs: f64,
    pub frames_per_second: f64,
}

/// Batch executor benchmark results
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRun {
    pub batch_size: usize,
    pub max_outstanding: usize,
    pub completed: u64,
    pub failed: u64,
    /// Submissions refused with BatchQueueFull and retried
    pub rejected: u64,
    pub batches: u64,
    pub mean_batch_size: f64,
    pub duration_secs: f64,
    pub frames_per_second: f64,
}

// ─────────────────────────────────────────────────────────────────
// Benchmark Runner
// ─────────────────────────────────────────────────────────────────

/// Runs the executor benchmarks
pub struct BenchmarkRunner {
    iterations: u32,
    items: usize,
    executor: ExecutorConfig,
    batch: BatchConfig,
    results_path: Option<PathBuf>,
}

impl BenchmarkRunner {
    /// Create a runner using default executor settings
    pub fn new(iterations: u32, items: usize) -> Self {
        Self {
            iterations: iterations.max(1),
            items,
            executor: ExecutorConfig::default(),
            batch: BatchConfig::default(),
            results_path: None,
        }
    }

    /// Use the given executor configurations
    pub fn with_configs(mut self, executor: ExecutorConfig, batch: BatchConfig) -> Self {
        self.executor = executor;
        self.batch = batch;
        self
    }

    /// Set the path to store benchmark results
    pub fn with_results_path(mut self, path: PathBuf) -> Self {
        self.results_path = Some(path);
        self
    }

    /// Run all benchmarks
    pub fn run(&self) -> Result<BenchmarkResults> {
        info!(
            iterations = self.iterations,
            items = self.items,
            "Starting executor benchmarks"
        );
        let start = Instant::now();
        let build = BuildInfo::current();
        if !build.is_release() {
            warn!(profile = %build.profile, "Benchmarking a non-release build");
        }

        let frames: Vec<Logits> = (0..self.items as u64).map(synthetic_logits).collect();

        let mut single = ExecutorRun {
            workers: self.executor.effective_workers(),
            queue_capacity: self.executor.queue_capacity,
            ..Default::default()
        };
        let mut batch = BatchRun {
            batch_size: self.batch.batch_size,
            max_outstanding: self.batch.max_outstanding,
            ..Default::default()
        };
        let mut dominant_counts = BTreeMap::new();

        for iteration in 0..self.iterations {
            let scores = self.run_single(&frames, &mut single)?;
            for score in &scores {
                *dominant_counts.entry(score.dominant.to_string()).or_insert(0) += 1;
            }
            self.run_batch(&frames, &mut batch)?;
            debug!(iteration, "Benchmark iteration complete");
        }

        single.frames_per_second = rate(single.completed, single.duration_secs);
        batch.frames_per_second = rate(batch.completed, batch.duration_secs);
        if batch.batches > 0 {
            batch.mean_batch_size = (batch.completed + batch.failed) as f64 / batch.batches as f64;
        }

        let results = BenchmarkResults {
            timestamp: chrono::Utc::now(),
            version: build.full_version(),
            iterations: self.iterations,
            items_per_iteration: self.items,
            single,
            batch,
            dominant_counts,
            duration_secs: start.elapsed().as_secs_f64(),
        };

        info!(
            single_fps = results.single.frames_per_second,
            batch_fps = results.batch.frames_per_second,
            mean_batch_size = results.batch.mean_batch_size,
            duration_secs = results.duration_secs,
            "Benchmark complete"
        );

        if let Some(ref path) = self.results_path {
            save_results(&results, path)?;
        }

        Ok(results)
    }

    fn run_single(&self, frames: &[Logits], run: &mut ExecutorRun) -> Result<Vec<FrameScore>> {
        let executor = SingleTaskExecutor::new(self.executor.clone())?;
        let start = Instant::now();
        let mut pending: VecDeque<ResultHandle<FrameScore>> = VecDeque::new();
        let mut scores = Vec::with_capacity(frames.len());

        for &logits in frames {
            loop {
                let handle = executor.submit(move || score_frame(&logits))?;
                if let Some(Err(TaskError::QueueFull { .. })) = handle.try_get() {
                    run.rejected += 1;
                    backpressure(&mut pending, &mut scores, &mut run.failed);
                    continue;
                }
                pending.push_back(handle);
                break;
            }
        }
        while !pending.is_empty() {
            backpressure(&mut pending, &mut scores, &mut run.failed);
        }

        executor.shutdown(true);
        run.completed += scores.len() as u64;
        run.duration_secs += start.elapsed().as_secs_f64();
        Ok(scores)
    }

    fn run_batch(&self, frames: &[Logits], run: &mut BatchRun) -> Result<()> {
        let executor = BatchExecutor::new(self.batch.clone())?;
        let func: BatchFn<Logits, FrameScore> = batch_fn(score_batch);
        let start = Instant::now();
        let mut pending: VecDeque<ResultHandle<FrameScore>> = VecDeque::new();
        let mut scores = Vec::with_capacity(frames.len());

        for &logits in frames {
            loop {
                let handle = executor.submit_one(&func, logits)?;
                if let Some(Err(TaskError::BatchQueueFull { .. })) = handle.try_get() {
                    run.rejected += 1;
                    backpressure(&mut pending, &mut scores, &mut run.failed);
                    continue;
                }
                pending.push_back(handle);
                break;
            }
        }
        while !pending.is_empty() {
            backpressure(&mut pending, &mut scores, &mut run.failed);
        }

        executor.shutdown(true);
        run.batches += executor.stats().batches;
        run.completed += scores.len() as u64;
        run.duration_secs += start.elapsed().as_secs_f64();
        Ok(())
    }
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new(3, 1000)
    }
}

/// Wait for the oldest in-flight frame and collect its score
fn backpressure(
    pending: &mut VecDeque<ResultHandle<FrameScore>>,
    scores: &mut Vec<FrameScore>,
    failed: &mut u64,
) {
    let Some(oldest) = pending.pop_front() else {
        std::thread::yield_now();
        return;
    };
    match oldest.wait() {
        Ok(score) => scores.push(score),
        Err(err) => {
            *failed += 1;
            warn!(error = %err, "Frame scoring failed");
        }
    }
}

fn rate(count: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}

/// Save benchmark results as JSON
pub fn save_results(results: &BenchmarkResults, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| Error::IoWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(path, json).map_err(|source| Error::IoWrite {
        path: path.to_path_buf(),
        source,
    })?;

    info!(path = %path.display(), "Benchmark results saved");
    Ok(())
}

/// Load previously saved benchmark results
pub fn load_results(path: &Path) -> Result<BenchmarkResults> {
    let content = std::fs::read_to_string(path).map_err(|source| Error::IoRead {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
