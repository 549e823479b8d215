//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides
//! through the CLI and the library API.

use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use nsworker::config::WorkerConfig;
use tempfile::TempDir;

/// Test fixture for configuration testing
struct ConfigFixture {
    _temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nsworker.toml");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }
}

fn nsworker_cmd() -> Command {
    let mut cmd = Command::cargo_bin("nsworker").unwrap();
    for var in [
        "NSWORKER_CONFIG",
        "NSWORKER_PORT",
        "NSWORKER_LOCK_TIMEOUT_MS",
        "NSWORKER_LOG_LEVEL",
        "NSWORKER_URI_FILE",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_empty_sections_are_valid() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server]\n\n[client]\n\n[group]\n\n[logging]\n");

    nsworker_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .success();
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[server]
bind_host = "0.0.0.0"
port = 7400
advertise_host = "pool-node-3"
count = 4
uri_file = "/tmp/nsworker/pool.uri"
lock_timeout_ms = 5000
debug = true
timing = true

[client]
connect_timeout_ms = 1000
call_timeout_ms = 20000

[group]
join_poll_interval_ms = 25
join_timeout_ms = 60000
benchmark_cycles = 50000

[logging]
level = "debug"
file = "/tmp/nsworker/nsworker.log"
max_file_size_mb = 50
max_files = 3
json_format = true
"#,
    );

    let config = WorkerConfig::from_file(&fixture.config_path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.server.count, 4);
    assert_eq!(config.server.advertise_host.as_deref(), Some("pool-node-3"));
    assert_eq!(config.group.join_timeout_ms, Some(60000));

    let join = config.group.join_options();
    assert_eq!(join.poll_interval.as_millis(), 25);
    assert_eq!(config.client.connect_options().call_timeout.as_secs(), 20);
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_zero_count_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server]\ncount = 0\n");

    nsworker_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .code(10)
        .stderr(predicates::str::contains("server.count"));
}

#[test]
fn test_zero_lock_timeout_rejected() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server]\nlock_timeout_ms = 0\n");

    nsworker_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure();
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[logging]\nlevel = \"loud\"\n");

    nsworker_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .stderr(predicates::str::contains("Invalid log level"));
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server\nport = 1\n");

    nsworker_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .stderr(predicates::str::contains("parse"));
}

// ─────────────────────────────────────────────────────────────────
// Config Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_init_force_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server]\ncount = 9\n");

    nsworker_cmd()
        .args(["config", "init", "--path", fixture.path(), "--force"])
        .assert()
        .success();

    let content = fs::read_to_string(fixture.path()).unwrap();
    assert!(content.contains("count = 1"));
    assert!(!content.contains("count = 9"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Variable Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server]\nport = 7000\nlock_timeout_ms = 1000\n");

    nsworker_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("NSWORKER_PORT", "7100")
        .env("NSWORKER_LOCK_TIMEOUT_MS", "2500")
        .assert()
        .success()
        .stdout(predicates::str::contains("port = 7100"))
        .stdout(predicates::str::contains("lock_timeout_ms = 2500"));
}

#[test]
fn test_env_invalid_log_level_fails_validation() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[logging]\nlevel = \"info\"\n");

    nsworker_cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .env("NSWORKER_LOG_LEVEL", "shouting")
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Path Expansion Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_tilde_expansion() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[server]\nuri_file = \"~/nsworker/pool.uri\"\n");

    let output = nsworker_cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("pool.uri"));
    assert!(!stdout.contains("uri_file = \"~"));
}
