//! Console and file logging.
//!
//! `log` records from the library are bridged into a `tracing` subscriber
//! that writes to stdout and, when a log directory is configured, to a
//! daily-rotated file. Files older than the retention window are removed
//! at startup.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Base name of the rotated log files.
pub const LOG_FILE_NAME: &str = "hdhomerun-preview.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Failed to prepare log directory {path:?}: {source}")]
    Directory { path: PathBuf, source: io::Error },

    #[error("Failed to install log subscriber: {0}")]
    Install(String),
}

/// Where and how much to log.
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Directory for log files; console only when `None`.
    pub log_dir: Option<PathBuf>,
    pub retention_days: u64,
    /// Default filter directive, e.g. `info`.
    pub level: String,
    /// Force `debug` regardless of `level`.
    pub verbose: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_dir: None,
            retention_days: 7,
            level: "info".to_string(),
            verbose: false,
        }
    }
}

impl LoggingOptions {
    /// Filter directive used when `RUST_LOG` is unset.
    fn default_directive(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.level
        }
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the life of the program.
pub fn init_logging(options: &LoggingOptions) -> Result<Option<WorkerGuard>, LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directive()));

    let console = fmt::layer()
        .with_writer(io::stdout)
        .with_target(false)
        .with_timer(LocalTimeTimer);

    let (file, guard) = match &options.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;
            clean_old_logs(dir, options.retention_days).map_err(|source| LoggingError::Directory {
                path: dir.clone(),
                source,
            })?;

            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_thread_ids(true)
                .with_ansi(false)
                .with_timer(LocalTimeTimer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file);

    tracing::subscriber::set_global_default(subscriber).map_err(|e| LoggingError::Install(e.to_string()))?;
    tracing_log::LogTracer::init().map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(guard)
}

/// Remove rotated log files last modified more than `retention_days` ago.
fn clean_old_logs(log_dir: &Path, retention_days: u64) -> io::Result<usize> {
    let cutoff = Local::now() - chrono::Duration::days(retention_days as i64);
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_NAME));
        if !is_log || !path.is_file() {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };
        let modified: chrono::DateTime<Local> = modified.into();
        if modified < cutoff {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }

    Ok(removed)
}

/// Local time stamps.
#[derive(Debug, Clone, Copy)]
struct LocalTimeTimer;

impl fmt::time::FormatTime for LocalTimeTimer {
    fn format_time(&self, w: &mut fmt::format::Writer) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hdhomerun-preview-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_verbose_overrides_level() {
        let mut options = LoggingOptions {
            level: "warn".to_string(),
            ..LoggingOptions::default()
        };
        assert_eq!(options.default_directive(), "warn");
        options.verbose = true;
        assert_eq!(options.default_directive(), "debug");
    }

    #[test]
    fn test_clean_keeps_recent_and_foreign_files() {
        let dir = scratch_dir("clean");
        fs::write(dir.join(format!("{}.2026-10-18", LOG_FILE_NAME)), b"recent").unwrap();
        fs::write(dir.join("notes.txt"), b"keep").unwrap();

        assert_eq!(clean_old_logs(&dir, 7).unwrap(), 0);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 2);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_dir_is_an_error() {
        let dir = std::env::temp_dir().join("hdhomerun-preview-does-not-exist-4f1c");
        assert!(clean_old_logs(&dir, 7).is_err());
    }
}
