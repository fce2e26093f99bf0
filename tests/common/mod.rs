//! Common test utilities and fixtures

#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tempfile::TempDir;

/// Generous bound for waiting on handles in tests
pub const WAIT: Duration = Duration::from_secs(5);

/// Command for the emosense-runtime binary
pub fn runtime_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::Command::cargo_bin("emosense-runtime").unwrap();
    // Keep the environment from leaking into config resolution
    for var in [
        "EMOSENSE_CONFIG",
        "EMOSENSE_MAX_WORKERS",
        "EMOSENSE_QUEUE_CAPACITY",
        "EMOSENSE_ENQUEUE_TIMEOUT_MS",
        "EMOSENSE_POLL_INTERVAL_MS",
        "EMOSENSE_SHUTDOWN_TIMEOUT_MS",
        "EMOSENSE_BATCH_SIZE",
        "EMOSENSE_FILL_TIMEOUT_MS",
        "EMOSENSE_MAX_OUTSTANDING",
        "EMOSENSE_BATCH_SHUTDOWN_TIMEOUT_MS",
        "EMOSENSE_LOG_LEVEL",
        "EMOSENSE_LOG_FILE",
        "EMOSENSE_LOG_JSON",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// A config file in a private temp directory
pub struct ConfigFixture {
    pub temp_dir: TempDir,
    pub config_path: PathBuf,
}

impl ConfigFixture {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("runtime.toml");
        Self {
            temp_dir,
            config_path,
        }
    }

    pub fn with_content(content: &str) -> Self {
        let fixture = Self::new();
        fixture.write_config(content);
        fixture
    }

    pub fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    pub fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

/// Poll `condition` until it holds or `timeout` expires
pub fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}
