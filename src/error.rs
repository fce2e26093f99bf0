//! Error types for the EmoSense runtime
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - A cloneable [`TaskError`] delivered through result handles
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,

    // Execution errors (5xx)
    ExecutionFailed = 500,
    ExecutionTimeout = 501,
    ExecutorShuttingDown = 502,
    ExecutionPanicked = 503,
    BatchFailed = 504,

    // Resource errors (7xx)
    QueueFull = 710,
    BatchQueueFull = 711,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            500..=599 => 50, // Execution errors
            700..=799 => 70, // Resource errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────
// Task Errors
// ─────────────────────────────────────────────────────────────────

/// Failure delivered through a result handle.
///
/// Cloneable so that every observer of a handle, and every handle in a failed
/// batch, sees the same error.
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// Submission arrived after shutdown began
    #[error("executor is shutting down")]
    ShuttingDown,

    /// The single-task queue had no room
    #[error("task queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The batch executor's outstanding-item cap was reached
    #[error("batch queue full ({max_outstanding} items outstanding)")]
    BatchQueueFull { max_outstanding: usize },

    /// The task's callable returned an error
    #[error("task failed: {0}")]
    Failed(Arc<anyhow::Error>),

    /// The task's callable panicked
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The group callable failed for the whole batch
    #[error("batch of {size} failed: {cause}")]
    BatchFailed {
        size: usize,
        cause: Arc<anyhow::Error>,
    },

    /// A waiter gave up; the task itself is unaffected
    #[error("timed out after {0:?} waiting for result")]
    Timeout(Duration),
}

impl TaskError {
    /// Wrap a callable's error
    pub fn failed(err: anyhow::Error) -> Self {
        TaskError::Failed(Arc::new(err))
    }

    /// Wrap a group callable's error
    pub fn batch_failed(size: usize, err: anyhow::Error) -> Self {
        TaskError::BatchFailed {
            size,
            cause: Arc::new(err),
        }
    }

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            TaskError::ShuttingDown => ErrorCode::ExecutorShuttingDown,
            TaskError::QueueFull { .. } => ErrorCode::QueueFull,
            TaskError::BatchQueueFull { .. } => ErrorCode::BatchQueueFull,
            TaskError::Failed(_) => ErrorCode::ExecutionFailed,
            TaskError::Panicked(_) => ErrorCode::ExecutionPanicked,
            TaskError::BatchFailed { .. } => ErrorCode::BatchFailed,
            TaskError::Timeout(_) => ErrorCode::ExecutionTimeout,
        }
    }

    /// True if the item was refused before it ever reached a worker
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self,
            TaskError::ShuttingDown | TaskError::QueueFull { .. } | TaskError::BatchQueueFull { .. }
        )
    }

    /// Check if resubmitting later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TaskError::QueueFull { .. } | TaskError::BatchQueueFull { .. } | TaskError::Timeout(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Runtime Errors
// ─────────────────────────────────────────────────────────────────

/// Main error type for the runtime
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────

    /// A submitted task or batch did not succeed
    #[error(transparent)]
    Task(#[from] TaskError),

    /// Worker thread could not be started
    #[error("Failed to spawn worker thread {name}: {source}")]
    WorkerSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Json(_) => ErrorCode::IoWrite,

            Error::Task(e) => e.code(),
            Error::WorkerSpawn { .. } => ErrorCode::InternalError,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Task(e) => e.is_retryable(),
            Error::Io(_) | Error::IoRead { .. } | Error::IoWrite { .. } => true,
            _ => false,
        }
    }

    /// Check if the error is fatal (process should exit)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::ConfigValidation { .. }
                | Error::Config(_)
                | Error::WorkerSpawn { .. }
                | Error::Internal(_)
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'emosense-runtime config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'emosense-runtime config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values. Run 'emosense-runtime config show' to see the defaults."
            ),
            Error::Task(TaskError::QueueFull { .. }) => Some(
                "Raise 'executor.queue_capacity' or 'executor.enqueue_timeout_ms', or submit work more slowly."
            ),
            Error::Task(TaskError::BatchQueueFull { .. }) => Some(
                "Raise 'batch.max_outstanding' or make the group function faster."
            ),
            Error::WorkerSpawn { .. } => Some(
                "The system refused to create a thread. Lower 'executor.max_workers'."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        let code = self.code();
        format!("[{}] {}", code.as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors (for ergonomic error creation)
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
