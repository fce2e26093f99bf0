//! Configuration system for the EmoSense runtime
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. Environment variables (EMOSENSE_* prefix)
//! 2. Configuration file (TOML, located via `--config` or the search path)
//! 3. Default values

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::executor::{BatchConfig, ExecutorConfig};

/// Upper bound on `executor.max_workers`
pub const MAX_WORKERS_LIMIT: usize = 1024;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Single-task executor settings
    pub executor: ExecutorSettings,

    /// Batch executor settings
    pub batch: BatchSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Single-task executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// Worker threads (0 = one per CPU)
    pub max_workers: usize,

    /// Maximum queued tasks
    pub queue_capacity: usize,

    /// How long a submit may wait for queue space in milliseconds (0 = fail fast)
    pub enqueue_timeout_ms: u64,

    /// Worker poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Shutdown join timeout in milliseconds
    pub shutdown_timeout_ms: u64,
}

/// Batch executor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSettings {
    /// Maximum items per group call
    pub batch_size: usize,

    /// Wait for a batch to fill in milliseconds
    pub fill_timeout_ms: u64,

    /// Admission cap on items not yet accounted for by a finished batch
    pub max_outstanding: usize,

    /// Shutdown join timeout in milliseconds
    pub shutdown_timeout_ms: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Maximum log file size in MB before rotation
    pub max_file_size_mb: u64,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_workers: 4,
            queue_capacity: 100,
            enqueue_timeout_ms: 10,
            poll_interval_ms: 100,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 8,
            fill_timeout_ms: 100,
            max_outstanding: 100,
            shutdown_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_file_size_mb: 100,
            max_files: 5,
            json_format: false,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        config.apply_env_overrides();
        config.expand_paths();
        config.validate()?;

        Ok(config)
    }

    /// Parse a single TOML file without env overrides or validation
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::IoRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("emosense.toml"),
            PathBuf::from("config.toml"),
            dirs::config_dir()
                .map(|p| p.join("emosense").join("runtime.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".emosense").join("runtime.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/emosense/runtime.toml"),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        // Executor settings
        env_parse("EMOSENSE_MAX_WORKERS", &mut self.executor.max_workers);
        env_parse("EMOSENSE_QUEUE_CAPACITY", &mut self.executor.queue_capacity);
        env_parse("EMOSENSE_ENQUEUE_TIMEOUT_MS", &mut self.executor.enqueue_timeout_ms);
        env_parse("EMOSENSE_POLL_INTERVAL_MS", &mut self.executor.poll_interval_ms);
        env_parse("EMOSENSE_SHUTDOWN_TIMEOUT_MS", &mut self.executor.shutdown_timeout_ms);

        // Batch settings
        env_parse("EMOSENSE_BATCH_SIZE", &mut self.batch.batch_size);
        env_parse("EMOSENSE_FILL_TIMEOUT_MS", &mut self.batch.fill_timeout_ms);
        env_parse("EMOSENSE_MAX_OUTSTANDING", &mut self.batch.max_outstanding);
        env_parse("EMOSENSE_BATCH_SHUTDOWN_TIMEOUT_MS", &mut self.batch.shutdown_timeout_ms);

        // Logging settings
        if let Ok(val) = std::env::var("EMOSENSE_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("EMOSENSE_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("EMOSENSE_LOG_JSON") {
            self.logging.json_format = val.to_lowercase() == "true" || val == "1";
        }
    }

    fn expand_paths(&mut self) {
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let executor = &self.executor;
        if executor.max_workers > MAX_WORKERS_LIMIT {
            return Err(Error::config_field_invalid(
                "executor.max_workers",
                format!("max_workers must be at most {}", MAX_WORKERS_LIMIT),
            ));
        }
        if executor.queue_capacity == 0 {
            return Err(Error::config_field_invalid(
                "executor.queue_capacity",
                "queue_capacity must be at least 1",
            ));
        }
        if executor.poll_interval_ms == 0 {
            return Err(Error::config_field_invalid(
                "executor.poll_interval_ms",
                "poll_interval_ms must be greater than 0",
            ));
        }
        if executor.shutdown_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "executor.shutdown_timeout_ms",
                "shutdown_timeout_ms must be greater than 0",
            ));
        }

        let batch = &self.batch;
        if batch.batch_size == 0 {
            return Err(Error::config_field_invalid(
                "batch.batch_size",
                "batch_size must be at least 1",
            ));
        }
        if batch.fill_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "batch.fill_timeout_ms",
                "fill_timeout_ms must be greater than 0",
            ));
        }
        if batch.max_outstanding == 0 {
            return Err(Error::config_field_invalid(
                "batch.max_outstanding",
                "max_outstanding must be at least 1",
            ));
        }
        if batch.shutdown_timeout_ms == 0 {
            return Err(Error::config_field_invalid(
                "batch.shutdown_timeout_ms",
                "shutdown_timeout_ms must be greater than 0",
            ));
        }
        if batch.max_outstanding < batch.batch_size {
            warn!(
                batch_size = batch.batch_size,
                max_outstanding = batch.max_outstanding,
                "max_outstanding is below batch_size; batches will never fill"
            );
        }

        if !VALID_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    VALID_LEVELS.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Runtime options for the single-task executor
    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_workers: self.executor.max_workers,
            queue_capacity: self.executor.queue_capacity,
            enqueue_timeout: Duration::from_millis(self.executor.enqueue_timeout_ms),
            poll_interval: Duration::from_millis(self.executor.poll_interval_ms),
            shutdown_timeout: Duration::from_millis(self.executor.shutdown_timeout_ms),
            ..ExecutorConfig::default()
        }
    }

    /// Runtime options for the batch executor
    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch.batch_size,
            fill_timeout: Duration::from_millis(self.batch.fill_timeout_ms),
            max_outstanding: self.batch.max_outstanding,
            shutdown_timeout: Duration::from_millis(self.batch.shutdown_timeout_ms),
            ..BatchConfig::default()
        }
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Overwrite `target` when the variable is set and parses
fn env_parse<T: FromStr>(var: &str, target: &mut T) {
    if let Ok(val) = std::env::var(var) {
        match val.parse() {
            Ok(n) => *target = n,
            Err(_) => warn!(var, value = %val, "Ignoring unparsable environment override"),
        }
    }
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location written by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".emosense")
        .join("runtime.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|source| Error::IoWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|source| Error::IoWrite {
        path: config_path.clone(),
        source,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# EmoSense Runtime Configuration

[executor]
# Worker threads for independent tasks (0 = one per CPU)
max_workers = 4

# Maximum queued tasks before submissions are rejected
queue_capacity = 100

# How long a submit may wait for queue space in milliseconds (0 = fail fast)
enqueue_timeout_ms = 10

# Worker poll interval in milliseconds
poll_interval_ms = 100

# Shutdown join timeout in milliseconds
shutdown_timeout_ms = 5000

[batch]
# Maximum items per group call
batch_size = 8

# Wait for a batch to fill in milliseconds
fill_timeout_ms = 100

# Items admitted but not yet finished before submissions are rejected
max_outstanding = 100

# Shutdown join timeout in milliseconds
shutdown_timeout_ms = 5000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.emosense/logs/runtime.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
