//! Tracing subscriber setup.
//!
//! Logs go to stderr (stdout is reserved for command output) and, when
//! enabled, to a daily file under [`crate::app_dirs::logs_dir`] through a
//! non-blocking writer.

use crate::config::LoggingConfig;
use crate::error::{IntegraError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Log files kept in the log directory, including the current one.
pub const MAX_LOG_FILES: usize = 10;

/// Daily `integra.YYYY-MM-DD.log` appender in `log_dir`.
///
/// Rolls over at midnight UTC; older files beyond [`MAX_LOG_FILES`] are
/// removed on each rollover and on open.
pub fn file_appender(log_dir: &Path) -> std::result::Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("integra")
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(log_dir)
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over [`LoggingConfig::level`]. The returned
/// guard must be held for the life of the process so buffered file output
/// is flushed on exit.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(config: &LoggingConfig, log_dir: &Path) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let (file_layer, guard) = if config.file {
        match file_appender(log_dir) {
            Ok(appender) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);
                let layer = tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("integra: file logging disabled ({}): {e}", log_dir.display());
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| IntegraError::Config(format!("cannot install tracing subscriber: {e}")))?;

    Ok(guard)
}
