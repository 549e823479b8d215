//! Logging setup for workers and the pool CLI
//!
//! Everything goes through `tracing`. The console gets compact or JSON
//! lines, and `[logging] file` adds a rolling log file next to it. Script
//! `print` output is logged on the [`SCRIPT_TARGET`] target and stays
//! visible at the default level so worker operators see it.

use std::path::Path;
use std::str::FromStr;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LoggingSettings;
use crate::error::{Error, Result};

/// Target of script `print` output
pub const SCRIPT_TARGET: &str = "nsworker::script";

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync>;

/// Keeps the file writer flushing; hold it until the process exits
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber for `serve`, `ping`, `exec` and friends.
///
/// `RUST_LOG`, when set, replaces the computed filter entirely.
pub fn init_logging(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<LogGuard> {
    let level = effective_level(settings, verbose, quiet)?;
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => crate_filter(level, quiet)?,
    };

    let console = output_layer(std::io::stderr, settings.json_format, true);
    let (file, guard) = match settings.file.as_deref() {
        Some(path) => {
            let appender = file_appender(Path::new(path), settings)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(output_layer(writer, settings.json_format, false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))?;

    tracing::debug!(%level, file = ?settings.file, json = settings.json_format, "Logging ready");
    Ok(LogGuard { _file: guard })
}

/// Console-only logging at a fixed level, for short-lived commands
pub fn init_simple(level: Level) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(from_env) => from_env,
        Err(_) => crate_filter(level, false)?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// `-q` wins over `-v`; each `-v` steps past the configured level
fn effective_level(settings: &LoggingSettings, verbose: u8, quiet: bool) -> Result<Level> {
    if quiet {
        return Ok(Level::ERROR);
    }
    let configured = Level::from_str(&settings.level)
        .map_err(|_| Error::Config(format!("Invalid log level: {}", settings.level)))?;
    Ok(match verbose {
        0 => configured,
        1 => configured.max(Level::DEBUG),
        _ => Level::TRACE,
    })
}

/// Dependencies stay at warn; our targets follow `level`, and script
/// output never drops below info unless quiet
fn crate_filter(level: Level, quiet: bool) -> Result<EnvFilter> {
    let script = if quiet { Level::ERROR } else { level.max(Level::INFO) };
    let directives = format!("warn,nsworker={},{}={}", level, SCRIPT_TARGET, script).to_lowercase();
    EnvFilter::builder()
        .parse(&directives)
        .map_err(|e| Error::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn output_layer<S, W>(writer: W, json: bool, ansi: bool) -> BoxedLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer().with_writer(writer).with_target(true);
    if json {
        Box::new(
            layer
                .json()
                .with_thread_names(true)
                .with_span_events(FmtSpan::CLOSE),
        )
    } else if ansi {
        Box::new(layer.compact())
    } else {
        Box::new(layer.with_ansi(false).with_thread_names(true))
    }
}

/// Rolling appender for the configured log path.
///
/// Rotation is time-based; a small `max_file_size_mb` picks hourly files.
fn file_appender(path: &Path, settings: &LoggingSettings) -> Result<RollingFileAppender> {
    let directory = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(directory).map_err(|e| Error::IoWrite {
        path: directory.to_path_buf(),
        source: e,
    })?;

    let prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("nsworker");
    let rotation = if settings.max_file_size_mb < 10 {
        Rotation::HOURLY
    } else {
        Rotation::DAILY
    };

    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(settings.max_files.max(1) as usize)
        .build(directory)
        .map_err(|e| Error::Config(format!("Cannot open log file {}: {}", path.display(), e)))
}
