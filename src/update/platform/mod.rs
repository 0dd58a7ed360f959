//! Platform-specific pieces of the self-update flow.
//!
//! [`Platform`] drives release asset selection and executable discovery.
//! [`SelfReplace`] is the capability the installer needs to swap the running
//! executable: the swap itself happens in a generated script that runs after
//! this process exits, so the running binary never overwrites itself.

use super::installer::InstallError;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod posix;
mod windows;

pub use posix::PosixReplace;
pub use windows::WindowsReplace;

/// Operating system family an update is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
}

impl Platform {
    pub const ALL: [Self; 3] = [Self::Windows, Self::MacOs, Self::Linux];

    /// The platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Lower-case substrings that identify a release asset built for this platform.
    pub fn markers(self) -> &'static [&'static str] {
        match self {
            Self::Windows => &["windows", "win64", "win32"],
            Self::MacOs => &["macos", "darwin", "osx", "mac"],
            Self::Linux => &["linux"],
        }
    }

    /// Whether a lower-cased asset name carries this platform's marker.
    pub fn is_marked(self, lower_name: &str) -> bool {
        self.markers().iter().any(|m| lower_name.contains(m))
    }

    /// Whether a lower-cased asset name is marked for a different platform.
    pub fn is_foreign(self, lower_name: &str) -> bool {
        Self::ALL
            .into_iter()
            .filter(|&other| other != self)
            .any(|other| other.is_marked(lower_name))
    }

    /// Extension of a directly runnable artifact, if the platform has one.
    pub fn executable_extension(self) -> Option<&'static str> {
        match self {
            Self::Windows => Some(".exe"),
            Self::MacOs => None,
            Self::Linux => Some(".appimage"),
        }
    }

    /// Whether a lower-cased file name looks like this platform's executable.
    pub fn is_executable_name(self, lower_name: &str) -> bool {
        match self {
            Self::Windows => lower_name.ends_with(".exe"),
            Self::MacOs => !lower_name.contains('.'),
            Self::Linux => !lower_name.contains('.') || lower_name.ends_with(".appimage"),
        }
    }

    /// The replacement strategy for this platform.
    pub fn replacer(self) -> Box<dyn SelfReplace> {
        match self {
            Self::Windows => Box::new(WindowsReplace),
            Self::MacOs => Box::new(PosixReplace::macos()),
            Self::Linux => Box::new(PosixReplace::linux()),
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Windows => write!(f, "windows"),
            Self::MacOs => write!(f, "macos"),
            Self::Linux => write!(f, "linux"),
        }
    }
}

/// Everything the detached swap script needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    /// Executable found in the extracted update.
    pub new_binary: PathBuf,
    /// Installed executable to overwrite.
    pub target: PathBuf,
    /// Copy of `target` taken before the swap.
    pub backup: PathBuf,
    /// Where the script is written.
    pub script_path: PathBuf,
    /// Wait before the first copy attempt.
    pub grace: Duration,
    /// Copy attempts before restoring the backup.
    pub attempts: u32,
    /// Wait between failed copy attempts.
    pub retry_delay: Duration,
}

/// Capability interface for replacing the running executable.
///
/// Implementations only differ in how they find binaries and how the
/// deferred copy/verify/restore/relaunch sequence is expressed natively.
pub trait SelfReplace: Send + Sync {
    /// Platform this strategy targets.
    fn platform(&self) -> Platform;

    /// File name of the generated swap script.
    fn script_file_name(&self) -> &'static str;

    /// Find the new executable inside an extracted update.
    ///
    /// The first entry (in file-name order) whose lower-cased name contains
    /// `product` and matches the platform executable rule wins.
    fn locate_new_binary(&self, extracted_dir: &Path, product: &str) -> Option<PathBuf> {
        let product = product.to_lowercase();
        let platform = self.platform();
        walkdir::WalkDir::new(extracted_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| {
                let name = entry.file_name().to_string_lossy().to_lowercase();
                name.contains(&product) && platform.is_executable_name(&name)
            })
            .map(walkdir::DirEntry::into_path)
    }

    /// Copy the current executable to `backup`, replacing a stale backup.
    fn backup_current(&self, current: &Path, backup: &Path) -> io::Result<()> {
        if backup.exists() {
            std::fs::remove_file(backup)?;
        }
        std::fs::copy(current, backup)?;
        Ok(())
    }

    /// Native command that starts `target` again once it has been replaced.
    fn relaunch_command(&self, target: &Path) -> String;

    /// Render the swap script for `plan`.
    fn render_script(&self, plan: &SwapPlan) -> String;

    /// Start `script` so that it outlives this process.
    fn launch_detached(&self, script: &Path) -> io::Result<()>;

    /// Write the swap script and hand the replacement over to it.
    fn atomically_replace(&self, plan: &SwapPlan) -> Result<(), InstallError> {
        std::fs::write(&plan.script_path, self.render_script(plan)).map_err(|source| {
            InstallError::Script {
                path: plan.script_path.clone(),
                source,
            }
        })?;
        self.launch_detached(&plan.script_path)
            .map_err(|source| InstallError::Launch {
                path: plan.script_path.clone(),
                source,
            })
    }
}
