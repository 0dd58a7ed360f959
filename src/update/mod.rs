//! Self-update subsystem.
//!
//! Checks the release index for a newer version, downloads and unpacks the
//! platform artifact in the background, and swaps the executable through a
//! detached script with backup/restore. [`UpdateCoordinator`] is the entry
//! point for the control thread.

pub mod checker;
pub mod coordinator;
pub mod downloader;
pub mod events;
pub mod installer;
pub mod platform;
pub mod release;
pub mod state;
pub mod version;

pub use checker::{CheckError, CheckOutcome, ReleaseChecker};
pub use coordinator::{UpdateContext, UpdateCoordinator};
pub use downloader::{DownloadError, DownloadTask, UpdateDownloader, UpdateError};
pub use events::{CheckEvent, DownloadEvent};
pub use installer::{InstallError, InstallReport, Installer};
pub use platform::{Platform, PosixReplace, SelfReplace, SwapPlan, WindowsReplace};
pub use release::{Release, ReleaseAsset, UpdateInfo};
pub use state::UpdateState;
pub use version::{ParseVersionError, Version};
