//! Logging infrastructure for spoilerscope
//!
//! The CLIs log to `~/.local/state/spoilerscope/spoilerscope.log.<date>`, never
//! to stdout, so JSON output stays machine readable. Analysis code logs with
//! structured fields (`candidate`, `reveal`, `scene`, `anchor`, `tier`).

use crate::config::{Config, LoggingConfig};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_PREFIX: &str = "spoilerscope.log";

/// Initialize logging into the XDG state directory.
///
/// The level comes from `RUST_LOG` when set, else from `config.level`.
pub fn init(config: &LoggingConfig) -> Result<LoggingGuard> {
    init_in(&Config::state_dir(), config)
}

/// Initialize logging into `log_dir` with daily rotation, keeping at most
/// `config.max_files` files.
pub fn init_in(log_dir: &Path, config: &LoggingConfig) -> Result<LoggingGuard> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_PREFIX)
        .max_log_files(config.max_files.max(1))
        .build(log_dir)
        .map_err(|e| Error::Config(format!("failed to create log appender: {e}")))?;
    let (writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true),
        )
        .try_init()
        .is_ok();

    // Only the first subscriber in a process wins; later calls still get a guard.
    if installed {
        tracing::info!(log_dir = %log_dir.display(), level = %config.level, "Logging initialized");
    }

    Ok(LoggingGuard {
        log_dir: log_dir.to_path_buf(),
        installed,
        _guard: guard,
    })
}

/// Initialize logging for tests (captured by the test harness)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Keeps the background log writer alive; pending lines are flushed on drop.
pub struct LoggingGuard {
    log_dir: PathBuf,
    installed: bool,
    _guard: WorkerGuard,
}

impl LoggingGuard {
    /// Directory the log files rotate in.
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Whether this call installed the global subscriber.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Returns the log file prefix path; rotated files append a date.
pub fn log_file_path() -> PathBuf {
    Config::log_path()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path() {
        assert!(log_file_path().ends_with("spoilerscope.log"));
    }

    #[test]
    fn test_init_in_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("state/spoilerscope");
        let guard = init_in(&log_dir, &LoggingConfig::default()).unwrap();
        assert!(log_dir.is_dir());
        assert_eq!(guard.log_dir(), log_dir.as_path());
    }
}
