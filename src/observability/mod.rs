//! Logging setup.
//!
//! Library code only emits `tracing` events and spans plus `metrics`
//! counters. Binaries call [`init_logging`] once to install a subscriber;
//! no metrics exporter is installed here.

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable, compact lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name; anything but `json` is pretty.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directives.
    pub filter: String,
    /// Append to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            filter: "warn".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Reads `STRATA_LOG`, `RUST_LOG`, `STRATA_LOG_FORMAT` and `STRATA_LOG_FILE`.
    ///
    /// `verbose` raises the default level to `debug` when neither filter
    /// variable is set.
    #[must_use]
    pub fn from_env(verbose: bool) -> Self {
        Self::from_lookup(verbose, |key| std::env::var(key).ok())
    }

    fn from_lookup(verbose: bool, env: impl Fn(&str) -> Option<String>) -> Self {
        let set = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let default_filter = if verbose { "strata=debug" } else { "warn" };
        Self {
            format: set("STRATA_LOG_FORMAT").map_or(LogFormat::Pretty, |v| LogFormat::parse(&v)),
            filter: set("STRATA_LOG")
                .or_else(|| set("RUST_LOG"))
                .unwrap_or_else(|| default_filter.to_string()),
            file: set("STRATA_LOG_FILE").map(PathBuf::from),
        }
    }
}

/// Installs the global subscriber.
///
/// Logs go to stderr (or the configured file) so stdout stays free for
/// command output.
///
/// # Errors
///
/// Returns an error if the filter is invalid, the log file cannot be
/// opened, or a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| Error::operation("parse_log_filter", e))?;

    let installed = match (&config.file, config.format) {
        (Some(path), LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(open_log_file(path)?)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        (Some(path), LogFormat::Pretty) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_ansi(false)
                    .with_writer(open_log_file(path)?)
                    .with_target(true),
            )
            .try_init(),
        (None, LogFormat::Json) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(io::stderr)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        (None, LogFormat::Pretty) => tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(io::stderr)
                    .with_target(true),
            )
            .try_init(),
    };
    installed.map_err(|e| Error::operation("logging_init", e))
}

/// Shared append-only log file.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?
            .flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::operation("create_log_dir", e))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::operation("open_log_file", format!("{}: {e}", path.display())))?;
    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}
