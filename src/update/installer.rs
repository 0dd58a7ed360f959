//! Executable replacement.
//!
//! The running process never writes to its own executable. The installer
//! finds the new binary, backs up the current one, and hands a [`SwapPlan`]
//! to the platform's [`SelfReplace`] strategy, which writes a script that
//! performs the copy after this process exits and restores the backup if
//! the copy does not succeed.

use super::platform::{SelfReplace, SwapPlan};
use crate::config::{SwapConfig, UpdateConfig};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Errors from preparing an executable swap.
#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("no executable named like {product:?} found in {}", dir.display())]
    ExecutableNotFound { dir: PathBuf, product: String },

    #[error("updating is not supported when running from a build directory ({})", exe.display())]
    DevelopmentModeUnsupported { exe: PathBuf },

    #[error("cannot back up {}: {source}", exe.display())]
    Backup {
        exe: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write install script {}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot launch install script {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("backup {} does not match the current executable", backup.display())]
    CopyVerificationFailed { backup: PathBuf },
}

/// What [`Installer::install`] set in motion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub new_binary: PathBuf,
    pub backup: PathBuf,
    pub script: PathBuf,
}

/// Whether `exe` sits in a Cargo output directory rather than an install.
///
/// Matches `target/{debug,release}`, optionally with a target triple before
/// the profile and a trailing `deps`.
pub fn is_development_build(exe: &Path) -> bool {
    let names: Vec<String> = exe
        .ancestors()
        .skip(1)
        .take(4)
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        })
        .collect();

    let profile_at = usize::from(names.first().is_some_and(|n| n == "deps"));
    let is_profile = names
        .get(profile_at)
        .is_some_and(|n| n == "debug" || n == "release");
    let target_at = |i: usize| names.get(i).is_some_and(|n| n == "target");

    is_profile && (target_at(profile_at + 1) || target_at(profile_at + 2))
}

/// `<exe>.backup` next to the executable.
pub fn backup_path(exe: &Path) -> PathBuf {
    let mut name = OsString::from(exe.as_os_str());
    name.push(".backup");
    PathBuf::from(name)
}

/// Prepares and launches the deferred executable swap.
pub struct Installer {
    replacer: Arc<dyn SelfReplace>,
    product_name: String,
    swap: SwapConfig,
}

impl Installer {
    pub fn new(replacer: Arc<dyn SelfReplace>, config: &UpdateConfig) -> Self {
        Self {
            replacer,
            product_name: config.product_name.clone(),
            swap: config.swap.clone(),
        }
    }

    /// Back up `current_exe` and launch the script that swaps in the binary
    /// found under `extracted_dir`.
    ///
    /// On success the caller should exit promptly so the script can replace
    /// the executable.
    ///
    /// # Errors
    ///
    /// See [`InstallError`]. No file outside the backup and the script is
    /// touched before the script starts.
    pub fn install(
        &self,
        extracted_dir: &Path,
        current_exe: &Path,
    ) -> Result<InstallReport, InstallError> {
        let new_binary = self
            .replacer
            .locate_new_binary(extracted_dir, &self.product_name)
            .ok_or_else(|| InstallError::ExecutableNotFound {
                dir: extracted_dir.to_path_buf(),
                product: self.product_name.clone(),
            })?;
        tracing::info!(new_binary = %new_binary.display(), "found updated executable");

        if is_development_build(current_exe) {
            return Err(InstallError::DevelopmentModeUnsupported {
                exe: current_exe.to_path_buf(),
            });
        }

        let backup = backup_path(current_exe);
        self.replacer
            .backup_current(current_exe, &backup)
            .map_err(|source| InstallError::Backup {
                exe: current_exe.to_path_buf(),
                source,
            })?;
        verify_copy(current_exe, &backup)?;
        tracing::info!(backup = %backup.display(), "current executable backed up");

        let app_dir = current_exe.parent().unwrap_or_else(|| Path::new("."));
        let plan = SwapPlan {
            new_binary,
            target: current_exe.to_path_buf(),
            backup,
            script_path: app_dir.join(self.replacer.script_file_name()),
            grace: Duration::from_secs(self.swap.grace_secs),
            attempts: self.swap.attempts.max(1),
            retry_delay: Duration::from_secs(self.swap.retry_delay_secs),
        };

        self.replacer.atomically_replace(&plan)?;
        tracing::info!(script = %plan.script_path.display(), "install script handed off");

        Ok(InstallReport {
            new_binary: plan.new_binary,
            backup: plan.backup,
            script: plan.script_path,
        })
    }
}

fn verify_copy(original: &Path, backup: &Path) -> Result<(), InstallError> {
    let len = |p: &Path| std::fs::metadata(p).map(|m| m.len()).ok();
    match (len(original), len(backup)) {
        (Some(a), Some(b)) if a == b => Ok(()),
        _ => Err(InstallError::CopyVerificationFailed {
            backup: backup.to_path_buf(),
        }),
    }
}
