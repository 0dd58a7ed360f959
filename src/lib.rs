//! Integra Client Manager: self-update subsystem.
//!
//! The client manager ships as a single desktop executable. This crate holds
//! everything needed to keep that executable current:
//!
//! - **Release discovery**: queries the GitHub "latest release" endpoint and
//!   compares its tag against the running version
//! - **Background download**: streams the platform artifact with progress
//!   events, then unpacks it
//! - **Executable replacement**: backs up the running binary and hands the
//!   swap to a detached script that restores the backup on failure
//!
//! Workers run on Tokio tasks and report through channels; the
//! [`update::UpdateCoordinator`] is owned by a single control thread.

pub mod app_dirs;
pub mod config;
pub mod error;
pub mod logging;
pub mod update;

pub use config::IntegraConfig;
pub use error::{IntegraError, Result};
pub use update::{CheckEvent, DownloadEvent, UpdateContext, UpdateCoordinator, Version};
