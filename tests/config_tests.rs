//! Configuration system tests
//!
//! Tests configuration loading, validation, and conversion into executor
//! options through both the public API and the CLI

mod common;

use std::time::Duration;

use predicates::prelude::*;

use common::{runtime_cmd, ConfigFixture};
use emosense_runtime::{Error, RuntimeConfig};

fn validate_cmd(fixture: &ConfigFixture) -> assert_cmd::assert::Assert {
    runtime_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_config_uses_defaults() {
    let fixture = ConfigFixture::with_content("");
    let config = RuntimeConfig::load(Some(fixture.path())).unwrap();

    assert_eq!(config.executor.max_workers, 4);
    assert_eq!(config.executor.queue_capacity, 100);
    assert_eq!(config.batch.batch_size, 8);
    assert_eq!(config.batch.fill_timeout_ms, 100);
    assert_eq!(config.batch.max_outstanding, 100);

    validate_cmd(&fixture).success();
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::with_content(
        r#"
[executor]
max_workers = 8
queue_capacity = 256
enqueue_timeout_ms = 0
poll_interval_ms = 50
shutdown_timeout_ms = 2000

[batch]
batch_size = 16
fill_timeout_ms = 25
max_outstanding = 512
shutdown_timeout_ms = 3000

[logging]
level = "debug"
max_file_size_mb = 50
max_files = 3
json_format = true
"#,
    );

    let config = RuntimeConfig::load(Some(fixture.path())).unwrap();

    let executor = config.executor_config();
    assert_eq!(executor.max_workers, 8);
    assert_eq!(executor.queue_capacity, 256);
    assert_eq!(executor.enqueue_timeout, Duration::ZERO);
    assert_eq!(executor.poll_interval, Duration::from_millis(50));
    assert_eq!(executor.shutdown_timeout, Duration::from_secs(2));

    let batch = config.batch_config();
    assert_eq!(batch.batch_size, 16);
    assert_eq!(batch.fill_timeout, Duration::from_millis(25));
    assert_eq!(batch.max_outstanding, 512);
    assert_eq!(batch.shutdown_timeout, Duration::from_secs(3));

    assert!(config.logging.json_format);
    validate_cmd(&fixture).success();
}

#[test]
fn test_max_workers_zero_is_valid() {
    let fixture = ConfigFixture::with_content("[executor]\nmax_workers = 0\n");
    let config = RuntimeConfig::load(Some(fixture.path())).unwrap();

    assert!(config.executor_config().effective_workers() >= 1);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_zero_queue_capacity() {
    let fixture = ConfigFixture::with_content("[executor]\nqueue_capacity = 0\n");

    match RuntimeConfig::load(Some(fixture.path())) {
        Err(Error::ConfigValidation { field, .. }) => {
            assert_eq!(field.as_deref(), Some("executor.queue_capacity"))
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    validate_cmd(&fixture)
        .failure()
        .code(10)
        .stderr(predicate::str::contains("queue_capacity"));
}

#[test]
fn test_zero_fill_timeout() {
    let fixture = ConfigFixture::with_content("[batch]\nfill_timeout_ms = 0\n");
    validate_cmd(&fixture)
        .failure()
        .stderr(predicate::str::contains("fill_timeout_ms"));
}

#[test]
fn test_zero_max_outstanding() {
    let fixture = ConfigFixture::with_content("[batch]\nmax_outstanding = 0\n");
    validate_cmd(&fixture).failure().code(10);
}

#[test]
fn test_too_many_workers() {
    let fixture = ConfigFixture::with_content("[executor]\nmax_workers = 4096\n");
    validate_cmd(&fixture)
        .failure()
        .stderr(predicate::str::contains("max_workers"));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::with_content("[logging]\nlevel = \"verbose\"\n");
    validate_cmd(&fixture)
        .failure()
        .stderr(predicate::str::contains("Invalid log level"));
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::with_content("[batch\nbatch_size = ");

    assert!(matches!(
        RuntimeConfig::load(Some(fixture.path())),
        Err(Error::ConfigParse { .. })
    ));
    validate_cmd(&fixture)
        .failure()
        .code(10)
        .stderr(predicate::str::contains("parse"));
}

#[test]
fn test_wrong_value_type() {
    let fixture = ConfigFixture::with_content("[batch]\nbatch_size = \"eight\"\n");
    validate_cmd(&fixture).failure().code(10);
}

// ─────────────────────────────────────────────────────────────────
// Environment Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::with_content("[batch]\nbatch_size = 4\nmax_outstanding = 40\n");

    runtime_cmd()
        .env("EMOSENSE_BATCH_SIZE", "32")
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("batch_size = 32"))
        .stdout(predicate::str::contains("max_outstanding = 40"));
}

#[test]
fn test_env_override_can_invalidate() {
    let fixture = ConfigFixture::with_content("");

    runtime_cmd()
        .env("EMOSENSE_QUEUE_CAPACITY", "0")
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("queue_capacity"));
}
