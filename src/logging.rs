//! Diagnostic Logging
//!
//! Human-facing logs through `tracing`, to stderr and optionally to a
//! size-rotated `app.log`. The audit trail is a separate file written by
//! [`crate::audit::FileAuditSink`] and is never affected by the level set
//! here.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::audit::RotatingFile;

/// File name of the general log inside the log directory
pub const APP_LOG_FILE: &str = "app.log";

/// Log format configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable plain text format
    #[default]
    Plain,
    /// JSON structured format
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid log format: {}", s)),
        }
    }
}

/// Log level configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Logging configuration (`[logging]` in the config file)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: LogLevel,

    /// Log format (plain, json)
    pub format: LogFormat,

    /// Include file and line number in logs
    pub file_and_line: bool,

    /// Directory for `app.log` (stderr only if not set)
    pub dir: Option<PathBuf>,

    /// Rotate `app.log` once it would exceed this size
    pub max_bytes: u64,

    /// Rotated files to keep (`app.log.1` ...)
    pub backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Plain,
            file_and_line: false,
            dir: None,
            max_bytes: 2 * 1024 * 1024,
            backups: 3,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging config with custom level
    pub fn with_level(level: LogLevel) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Path of the general log file, if file logging is enabled.
    pub fn file_path(&self) -> Option<PathBuf> {
        self.dir.as_deref().map(|dir| dir.join(APP_LOG_FILE))
    }

    /// Install the global subscriber.
    ///
    /// `RUST_LOG` takes precedence over the configured level. The returned
    /// guard flushes the file writer on drop and must be held for the life
    /// of the process.
    pub fn init(&self) -> Result<Option<WorkerGuard>> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.level.to_string()));

        let mut layers = vec![self.layer(std::io::stderr, true)];
        let mut guard = None;

        if let Some(path) = self.file_path() {
            let file = open_log(&path, self.max_bytes, self.backups)?;
            let (writer, file_guard) = tracing_appender::non_blocking(file);
            layers.push(self.layer(writer, false));
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()
            .context("Failed to install tracing subscriber")?;

        tracing::info!(
            "Logging initialized: level={}, format={:?}, file={:?}",
            self.level,
            self.format,
            self.file_path()
        );

        Ok(guard)
    }

    fn layer<W>(&self, writer: W, ansi: bool) -> Box<dyn Layer<Registry> + Send + Sync>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let layer = fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(true)
            .with_file(self.file_and_line)
            .with_line_number(self.file_and_line);

        match self.format {
            LogFormat::Plain => layer.boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }
}

fn open_log(path: &Path, max_bytes: u64, backups: usize) -> Result<RotatingFile> {
    RotatingFile::open(path, max_bytes, backups)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

/// Run `f` under a scoped stderr subscriber that shows warnings and errors.
///
/// Configuration is loaded before the configured subscriber exists; this
/// keeps what it reports (ignored `DECKGUARD_*` overrides) from being lost.
pub fn with_bootstrap_logging<T>(f: impl FnOnce() -> T) -> T {
    with_bootstrap_writer(std::io::stderr, f)
}

fn with_bootstrap_writer<W, T>(writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let subscriber = fmt::fmt()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_bootstrap_logging_keeps_warnings() {
        let captured = Captured::default();
        let writer = captured.clone();
        let value = with_bootstrap_writer(move || writer.clone(), || {
            tracing::info!("loaded defaults");
            tracing::warn!("Ignoring DECKGUARD_TIMEOUT_SECS=\"soon\"");
            7
        });

        assert_eq!(value, 7);
        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("Ignoring DECKGUARD_TIMEOUT_SECS"), "{}", text);
        assert!(!text.contains("loaded defaults"), "{}", text);
    }

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
    }

    #[test]
    fn test_log_level_parse_and_display() {
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_log_level_into_tracing() {
        let level: tracing::Level = LogLevel::Error.into();
        assert_eq!(level, tracing::Level::ERROR);
    }

    #[test]
    fn test_log_format_parse() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Plain);
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_logging_config_default() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Plain);
        assert_eq!(config.max_bytes, 2 * 1024 * 1024);
        assert_eq!(config.backups, 3);
        assert!(config.file_path().is_none());
    }

    #[test]
    fn test_file_path_under_dir() {
        let config = LoggingConfig {
            dir: Some(PathBuf::from("/var/log/deckguard")),
            ..LoggingConfig::with_level(LogLevel::Debug)
        };
        assert_eq!(config.file_path(), Some(PathBuf::from("/var/log/deckguard/app.log")));
    }

    #[test]
    fn test_open_log_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join(APP_LOG_FILE);
        open_log(&path, 1024, 1).unwrap();
        assert!(path.exists());
    }
}
