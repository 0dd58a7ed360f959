//! Event payloads sent from update workers to the control thread.
//!
//! Workers never touch coordinator state; they report through these values
//! over `tokio::sync::mpsc` channels and the owner of the coordinator reacts.

use super::checker::CheckError;
use super::release::UpdateInfo;
use std::path::PathBuf;

/// Result of one update check, as republished by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckEvent {
    /// A newer, non-skipped release is available.
    UpdateAvailable(UpdateInfo),
    /// Already up to date, or the newer release was skipped.
    NoUpdate,
    /// The check could not complete.
    CheckFailed(CheckError),
}

/// Lifecycle of one download/install session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// Bytes received so far.
    Progress {
        /// Never exceeds `total_bytes` when that is known.
        bytes_downloaded: u64,
        /// `Content-Length` of the artifact, if the server sent one.
        total_bytes: Option<u64>,
    },

    /// Download finished; unpacking the artifact.
    ExtractionStarted,

    /// Extraction finished; backing up and handing off to the swap script.
    InstallationStarted,

    /// The swap script is running; the application should exit.
    Completed {
        /// Path of the launched script.
        script: PathBuf,
    },

    /// The session stopped.
    Failed {
        /// Human-readable error description.
        message: String,
    },
}

impl DownloadEvent {
    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}
