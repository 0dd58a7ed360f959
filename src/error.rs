//! Error types for the integra crate.

use crate::update::checker::CheckError;
use crate::update::downloader::{DownloadError, UpdateError};
use crate::update::installer::InstallError;
use crate::update::version::ParseVersionError;

/// Top-level error type for the application and its update subsystem.
#[derive(Debug, thiserror::Error)]
pub enum IntegraError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed version string.
    #[error(transparent)]
    Version(#[from] ParseVersionError),

    /// Release index query failed.
    #[error("update check failed: {0}")]
    Check(#[from] CheckError),

    /// Artifact download or extraction failed.
    #[error("update download failed: {0}")]
    Download(#[from] DownloadError),

    /// Executable replacement failed.
    #[error("update install failed: {0}")]
    Install(#[from] InstallError),

    /// A download is already running.
    #[error(transparent)]
    Busy(#[from] UpdateError),

    /// Self-update lifecycle error (state file, worker tasks).
    #[error("update error: {0}")]
    Update(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, IntegraError>;
