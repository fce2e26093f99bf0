//! EmoSense runtime
//!
//! Asynchronous task execution for an emotion-sensing pipeline: a
//! single-task executor with bounded backpressure and a batching executor
//! that groups per-face work into batched classifier calls under an
//! outstanding-item cap, both resolving per-item [`ResultHandle`]s.
//!
//! ```no_run
//! use emosense_runtime::{ExecutorConfig, SingleTaskExecutor};
//!
//! # fn main() -> emosense_runtime::Result<()> {
//! let executor = SingleTaskExecutor::new(ExecutorConfig::default().with_workers(2))?;
//! let handles: Vec<_> = (0..5)
//!     .map(|x| executor.submit(move || Ok(x * x)))
//!     .collect::<Result<_, _>>()?;
//!
//! let squares: Vec<i32> = handles.iter().map(|h| h.wait()).collect::<Result<_, _>>()?;
//! assert_eq!(squares, vec![0, 1, 4, 9, 16]);
//! executor.shutdown(true);
//! # Ok(())
//! # }
//! ```

pub mod benchmark;
pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod version;

pub use config::RuntimeConfig;
pub use error::{Error, ErrorCode, Result, TaskError};
pub use executor::{
    batch_fn, BatchConfig, BatchExecutor, BatchFn, BatchStats, ExecutorConfig, ExecutorStats,
    HandleState, LifecycleState, ResultHandle, SingleTaskExecutor,
};
