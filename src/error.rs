//! Error types for nsworker
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - A compact wire-level kind (`ErrorKind`) shared by client and worker
//! - User-friendly messages with suggestions
//! - Exit codes for CLI

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for nsworker operations
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

    // Connection errors (3xx)
    WorkerUnreachable = 300,
    InvalidEndpoint = 301,

    // Protocol errors (4xx)
    ProtocolMalformed = 401,

    // Namespace errors (5xx)
    NameNotFound = 500,
    ExecutionFailed = 501,
    LockTimeout = 502,
    OperationFailed = 503,

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
            300..=399 => 30, // Connection errors
            400..=499 => 40, // Protocol errors
            500..=599 => 50, // Namespace errors
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

/// Error classification carried over the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    WorkerUnreachable,
    LockTimeout,
    NameNotFound,
    Execution,
    Operation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::WorkerUnreachable => "worker unreachable",
            ErrorKind::LockTimeout => "lock timeout",
            ErrorKind::NameNotFound => "name not found",
            ErrorKind::Execution => "execution error",
            ErrorKind::Operation => "operation error",
        };
        f.write_str(name)
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Worker Errors
    // ─────────────────────────────────────────────────────────────

    /// The worker could not be reached at the transport level
    #[error("Worker {endpoint} unreachable: {message}")]
    WorkerUnreachable { endpoint: String, message: String },

    /// The worker lock was not acquired in time
    #[error("Worker lock not acquired within {timeout_ms}ms")]
    LockTimeout { timeout_ms: u64 },

    /// Namespace lookup miss
    #[error("Name not found: {name}")]
    NameNotFound { name: String },

    /// A code fragment failed to run
    #[error("Execution error: {message}")]
    Execution { message: String },

    /// Any other failed remote call
    #[error("Operation failed: {0}")]
    Operation(String),

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO / Protocol Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed endpoint string
    #[error("Invalid endpoint '{endpoint}': {message}")]
    InvalidEndpoint { endpoint: String, message: String },

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

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Malformed protocol message
    #[error("Protocol error: {0}")]
    Protocol(String),

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
            Error::WorkerUnreachable { .. } => ErrorCode::WorkerUnreachable,
            Error::LockTimeout { .. } => ErrorCode::LockTimeout,
            Error::NameNotFound { .. } => ErrorCode::NameNotFound,
            Error::Execution { .. } => ErrorCode::ExecutionFailed,
            Error::Operation(_) => ErrorCode::OperationFailed,

            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::InvalidEndpoint { .. } => ErrorCode::InvalidEndpoint,
            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Json(_) => ErrorCode::ProtocolMalformed,
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Protocol(_) => ErrorCode::ProtocolMalformed,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Collapse into one of the five kinds understood on both sides of the wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::WorkerUnreachable { .. } => ErrorKind::WorkerUnreachable,
            Error::LockTimeout { .. } => ErrorKind::LockTimeout,
            Error::NameNotFound { .. } => ErrorKind::NameNotFound,
            Error::Execution { .. } => ErrorKind::Execution,
            _ => ErrorKind::Operation,
        }
    }

    /// Check if the failure happened at the transport level
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Error::WorkerUnreachable { .. })
    }

    /// Check if the error is fatal for the CLI
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::ConfigParse { .. }
                | Error::Config(_)
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
                "Run 'nsworker config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'nsworker config validate' to see details."
            ),
            Error::WorkerUnreachable { .. } => Some(
                "Check that the worker is running and the endpoint in the URI file is current."
            ),
            Error::LockTimeout { .. } => Some(
                "The worker is busy with another call. Raise 'lock_timeout_ms' or wait for it to finish."
            ),
            Error::InvalidEndpoint { .. } => Some(
                "Endpoints look like nsw://host:port/worker-id, one per line in the URI file."
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
    /// Create a worker unreachable error
    pub fn unreachable(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::WorkerUnreachable {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a name not found error
    pub fn name_not_found(name: impl Into<String>) -> Self {
        Error::NameNotFound { name: name.into() }
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Error::Execution {
            message: message.into(),
        }
    }

    /// Create an operation error
    pub fn operation(message: impl Into<String>) -> Self {
        Error::Operation(message.into())
    }

    /// Create an invalid endpoint error
    pub fn invalid_endpoint(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidEndpoint {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Rebuild an error received from a worker
    pub fn from_remote(kind: ErrorKind, message: String, endpoint: &str) -> Self {
        match kind {
            ErrorKind::WorkerUnreachable => Error::unreachable(endpoint, message),
            ErrorKind::LockTimeout => Error::LockTimeout {
                timeout_ms: parse_timeout_ms(&message),
            },
            ErrorKind::NameNotFound => Error::NameNotFound {
                name: message
                    .strip_prefix("Name not found: ")
                    .unwrap_or(&message)
                    .to_string(),
            },
            ErrorKind::Execution => Error::Execution {
                message: message
                    .strip_prefix("Execution error: ")
                    .unwrap_or(&message)
                    .to_string(),
            },
            ErrorKind::Operation => Error::Operation(
                message
                    .strip_prefix("Operation failed: ")
                    .unwrap_or(&message)
                    .to_string(),
            ),
        }
    }
}

/// Recover the timeout from a rendered `LockTimeout` message
fn parse_timeout_ms(message: &str) -> u64 {
    message
        .split_whitespace()
        .find_map(|word| word.strip_suffix("ms").and_then(|n| n.parse().ok()))
        .unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
