//! Task representation and execution.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crate::error::TaskError;

use super::handle::ResultHandle;

/// Global task ID counter
static TASK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a submitted task or batch item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(TASK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// How a task ended, as seen by the worker that ran it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    Panicked,
}

/// Type-erased unit of work.
///
/// The boxed closure runs the user callable and resolves the handle it was
/// created with, so the queue and workers never see the result type.
pub(crate) struct Task {
    pub(crate) id: TaskId,
    run: Box<dyn FnOnce() -> TaskOutcome + Send + 'static>,
    pub(crate) enqueued_at: Instant,
}

impl Task {
    /// Bind a callable to the handle it resolves
    pub(crate) fn new<T, F>(f: F, handle: ResultHandle<T>) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let run = move || match catch_unwind(AssertUnwindSafe(f)) {
            Ok(Ok(value)) => {
                handle.resolve(value);
                TaskOutcome::Completed
            }
            Ok(Err(err)) => {
                handle.reject(TaskError::failed(err));
                TaskOutcome::Failed
            }
            Err(payload) => {
                handle.reject(TaskError::Panicked(panic_message(payload.as_ref())));
                TaskOutcome::Panicked
            }
        };

        Task {
            id: TaskId::next(),
            run: Box::new(run),
            enqueued_at: Instant::now(),
        }
    }

    /// Execute the task, resolving its handle
    pub(crate) fn execute(self) -> TaskOutcome {
        (self.run)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("enqueued_at", &self.enqueued_at)
            .finish()
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_ids_increase() {
        let a = TaskId::next();
        let b = TaskId::next();
        assert!(b.as_u64() > a.as_u64());
        assert!(a.to_string().starts_with("task-"));
    }

    #[test]
    fn test_execute_success() {
        let handle = ResultHandle::pending();
        let task = Task::new(|| Ok(3 * 3), handle.clone());

        assert_eq!(task.execute(), TaskOutcome::Completed);
        assert_eq!(handle.wait().unwrap(), 9);
    }

    #[test]
    fn test_execute_error() {
        let handle: ResultHandle<i32> = ResultHandle::pending();
        let task = Task::new(|| Err(anyhow::anyhow!("no face found")), handle.clone());

        assert_eq!(task.execute(), TaskOutcome::Failed);
        let err = handle.wait().unwrap_err();
        assert!(err.to_string().contains("no face found"));
    }

    #[test]
    fn test_execute_panic_is_captured() {
        let handle: ResultHandle<i32> = ResultHandle::pending();
        let task = Task::new(|| panic!("tensor shape mismatch"), handle.clone());

        assert_eq!(task.execute(), TaskOutcome::Panicked);
        match handle.wait() {
            Err(TaskError::Panicked(msg)) => assert_eq!(msg, "tensor shape mismatch"),
            other => panic!("expected panic error, got {:?}", other),
        }
    }

    #[test]
    fn test_panic_message_formats() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");

        let payload: Box<dyn Any + Send> = Box::new(17u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }
}
