//! Configuration system for nsworker
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (NSWORKER_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::client::ConnectOptions;
use crate::error::{Error, Result};
use crate::group::JoinOptions;
use crate::server::EngineSettings;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker engine and listener settings
    pub server: ServerSettings,

    /// Client-side connection settings
    pub client: ClientSettings,

    /// Worker group and multi-run settings
    pub group: GroupSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Worker engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind listeners on
    pub bind_host: String,

    /// First listen port (0 = auto-assign; with several engines, ports count up from here)
    pub port: u16,

    /// Host written into endpoints (defaults to the bind host, or the hostname for 0.0.0.0)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_host: Option<String>,

    /// Number of engines to start
    pub count: usize,

    /// File that endpoints are appended to on startup
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri_file: Option<String>,

    /// Worker lock acquisition timeout in milliseconds
    pub lock_timeout_ms: u64,

    /// Log every handled call
    pub debug: bool,

    /// Log the duration of every handled call
    pub timing: bool,
}

/// Client connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// TCP connect timeout in milliseconds
    pub connect_timeout_ms: u64,

    /// Per-call response timeout in milliseconds
    pub call_timeout_ms: u64,
}

/// Worker group settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupSettings {
    /// Poll interval of a parallel join in milliseconds
    pub join_poll_interval_ms: u64,

    /// Join timeout in milliseconds (unset = wait forever)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join_timeout_ms: Option<u64>,

    /// Default benchmark workload size
    pub benchmark_cycles: u64,
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

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 0, // Auto-assign
            advertise_host: None,
            count: 1,
            uri_file: None,
            lock_timeout_ms: 30_000,
            debug: false,
            timing: false,
        }
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            call_timeout_ms: 60_000,
        }
    }
}

impl Default for GroupSettings {
    fn default() -> Self {
        Self {
            join_poll_interval_ms: 10,
            join_timeout_ms: None,
            benchmark_cycles: 10_000,
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

impl ServerSettings {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            debug: self.debug,
            timing: self.timing,
        }
    }
}

impl ClientSettings {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            call_timeout: Duration::from_millis(self.call_timeout_ms),
        }
    }
}

impl GroupSettings {
    pub fn join_options(&self) -> JoinOptions {
        JoinOptions {
            timeout: self.join_timeout_ms.map(Duration::from_millis),
            poll_interval: Duration::from_millis(self.join_poll_interval_ms),
        }
    }
}

impl WorkerConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        let config_file = Self::find_config_file(config_path)?;
        if let Some(path) = config_file {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration file without applying overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        // Search in standard locations
        let search_paths = [
            // Current directory
            PathBuf::from("nsworker.toml"),
            // User config directory
            dirs::config_dir()
                .map(|p| p.join("nsworker").join("config.toml"))
                .unwrap_or_default(),
            // Home directory
            dirs::home_dir()
                .map(|p| p.join(".nsworker").join("config.toml"))
                .unwrap_or_default(),
            // System config (Linux)
            PathBuf::from("/etc/nsworker/config.toml"),
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
        // Server settings
        if let Ok(val) = std::env::var("NSWORKER_BIND_HOST") {
            self.server.bind_host = val;
        }
        if let Ok(val) = std::env::var("NSWORKER_PORT") {
            if let Ok(n) = val.parse() {
                self.server.port = n;
            }
        }
        if let Ok(val) = std::env::var("NSWORKER_ADVERTISE_HOST") {
            self.server.advertise_host = Some(val);
        }
        if let Ok(val) = std::env::var("NSWORKER_URI_FILE") {
            self.server.uri_file = Some(val);
        }
        if let Ok(val) = std::env::var("NSWORKER_LOCK_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.server.lock_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("NSWORKER_DEBUG") {
            self.server.debug = env_flag(&val);
        }
        if let Ok(val) = std::env::var("NSWORKER_TIMING") {
            self.server.timing = env_flag(&val);
        }

        // Client settings
        if let Ok(val) = std::env::var("NSWORKER_CONNECT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.client.connect_timeout_ms = n;
            }
        }
        if let Ok(val) = std::env::var("NSWORKER_CALL_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.client.call_timeout_ms = n;
            }
        }

        // Group settings
        if let Ok(val) = std::env::var("NSWORKER_JOIN_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                self.group.join_timeout_ms = Some(n);
            }
        }
        if let Ok(val) = std::env::var("NSWORKER_BENCHMARK_CYCLES") {
            if let Ok(n) = val.parse() {
                self.group.benchmark_cycles = n;
            }
        }

        // Logging settings
        if let Ok(val) = std::env::var("NSWORKER_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("NSWORKER_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("NSWORKER_LOG_JSON") {
            self.logging.json_format = env_flag(&val);
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref file) = self.server.uri_file {
            self.server.uri_file = Some(expand_path(file));
        }
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.bind_host.is_empty() {
            return Err(Error::Config("server.bind_host cannot be empty".to_string()));
        }
        if self.server.count == 0 {
            return Err(Error::Config("server.count must be at least 1".to_string()));
        }
        if self.server.lock_timeout_ms == 0 {
            return Err(Error::Config(
                "server.lock_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.client.connect_timeout_ms == 0 || self.client.call_timeout_ms == 0 {
            return Err(Error::Config(
                "client timeouts must be greater than 0".to_string(),
            ));
        }
        if self.group.join_poll_interval_ms == 0 {
            return Err(Error::Config(
                "group.join_poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// URI file as a path, if configured
    pub fn uri_file(&self) -> Option<PathBuf> {
        self.server.uri_file.as_ref().map(PathBuf::from)
    }
}

fn env_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// Expand ~ and environment variables in paths
pub fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or(std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Default location written by `config init`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".nsworker")
        .join("config.toml")
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(default_config_path);

    // Check if file exists
    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    // Create parent directories
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
pub fn generate_default_config() -> String {
    r#"# nsworker configuration

[server]
# Address to bind listeners on
bind_host = "127.0.0.1"

# First listen port (0 = auto-assign)
port = 0

# Host written into endpoints (defaults to bind_host)
# advertise_host = "10.0.0.5"

# Number of engines to start
count = 1

# File that endpoints are appended to on startup
# uri_file = "~/.nsworker/workers.uri"

# Worker lock acquisition timeout in milliseconds
lock_timeout_ms = 30000

# Log every handled call / log call durations
debug = false
timing = false

[client]
# TCP connect timeout in milliseconds
connect_timeout_ms = 5000

# Per-call response timeout in milliseconds
call_timeout_ms = 60000

[group]
# Poll interval of a parallel join in milliseconds
join_poll_interval_ms = 10

# Join timeout in milliseconds (unset = wait forever)
# join_timeout_ms = 60000

# Default benchmark workload size
benchmark_cycles = 10000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.nsworker/logs/nsworker.log"

# Maximum log file size in MB before rotation
max_file_size_mb = 100

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config() {
        let config = WorkerConfig::default();
        assert_eq!(config.server.lock_timeout_ms, 30_000);
        assert_eq!(config.group.join_poll_interval_ms, 10);
        assert_eq!(config.group.benchmark_cycles, 10_000);
        assert_eq!(config.logging.level, "info");
        assert!(config.group.join_timeout_ms.is_none());
    }

    #[test]
    fn test_env_override() {
        env::set_var("NSWORKER_LOCK_TIMEOUT_MS", "1500");
        env::set_var("NSWORKER_TIMING", "1");
        env::set_var("NSWORKER_JOIN_TIMEOUT_MS", "250");

        let mut config = WorkerConfig::default();
        config.apply_env_overrides();

        assert_eq!(config.server.lock_timeout_ms, 1500);
        assert!(config.server.timing);
        assert_eq!(config.group.join_timeout_ms, Some(250));

        env::remove_var("NSWORKER_LOCK_TIMEOUT_MS");
        env::remove_var("NSWORKER_TIMING");
        env::remove_var("NSWORKER_JOIN_TIMEOUT_MS");
    }

    #[test]
    fn test_validation() {
        assert!(WorkerConfig::default().validate().is_ok());

        let mut config = WorkerConfig::default();
        config.server.count = 0;
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = WorkerConfig::default();
        config.group.join_poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_options() {
        let mut config = WorkerConfig::default();
        config.group.join_timeout_ms = Some(300);

        let join = config.group.join_options();
        assert_eq!(join.timeout, Some(Duration::from_millis(300)));
        assert_eq!(join.poll_interval, Duration::from_millis(10));

        let engine = config.server.engine_settings();
        assert_eq!(engine.lock_timeout, Duration::from_secs(30));

        let connect = config.client.connect_options();
        assert_eq!(connect.call_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_generated_default_parses() {
        let parsed: WorkerConfig = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(parsed.server.count, 1);
        assert_eq!(parsed.client.connect_timeout_ms, 5000);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_explicit_missing_file() {
        let err = WorkerConfig::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_parse_config_file() {
        let config_str = r#"
[server]
port = 7400
count = 4
uri_file = "/tmp/pool.uri"

[group]
join_timeout_ms = 2000
"#;

        let config: WorkerConfig = toml::from_str(config_str).unwrap();
        assert_eq!(config.server.port, 7400);
        assert_eq!(config.server.count, 4);
        assert_eq!(config.uri_file(), Some(PathBuf::from("/tmp/pool.uri")));
        assert_eq!(config.group.join_timeout_ms, Some(2000));
        assert_eq!(config.client.call_timeout_ms, 60_000);
    }
}
