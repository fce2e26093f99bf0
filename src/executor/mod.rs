//! Task execution module
//!
//! Two executors share one lifecycle model and one result type:
//! - [`SingleTaskExecutor`]: independent callables on a worker pool with a
//!   bounded queue
//! - [`BatchExecutor`]: per-item submissions grouped into batched calls under
//!   an outstanding-item cap
//! - [`ResultHandle`]: write-once outcome, waitable from threads or async code

mod batch;
mod handle;
mod queue;
mod single;
mod state;
mod task;

pub use batch::{batch_fn, BatchConfig, BatchExecutor, BatchFn};
pub use handle::{HandleState, ResultHandle};
pub use queue::{BoundedWorkQueue, EnqueuePolicy, QueueFull};
pub use single::{ExecutorConfig, SingleTaskExecutor};
pub use state::{BatchStats, ExecutorStats, LifecycleState};
pub use task::{TaskId, TaskOutcome};
