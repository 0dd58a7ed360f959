//! Update coordinator.
//!
//! Owned by the control thread. Starts checks and downloads on worker tasks,
//! applies the skip-list to check results, and guarantees at most one check
//! and one download run at a time. The two are independent: a download may
//! run while a fresh check is in flight.

use super::checker::{CheckError, CheckOutcome, ReleaseChecker};
use super::downloader::UpdateDownloader;
use super::events::CheckEvent;
use super::platform::{Platform, SelfReplace};
use super::release::UpdateInfo;
use super::state::UpdateState;
use super::version::Version;
use crate::config::UpdateConfig;
use crate::error::{IntegraError, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

type RawCheck = std::result::Result<CheckOutcome, CheckError>;

/// Everything the update subsystem needs from the running application,
/// built once at startup.
pub struct UpdateContext {
    pub config: UpdateConfig,
    pub current_version: Version,
    pub platform: Platform,
    /// The installed executable that updates replace.
    pub current_exe: PathBuf,
    pub replacer: Arc<dyn SelfReplace>,
    /// Skip-list file, used when `config.persist_skipped_versions` is set.
    pub state_file: PathBuf,
    /// Parent of per-session download directories.
    pub temp_dir: PathBuf,
}

impl UpdateContext {
    /// Context for the running process on the current platform.
    ///
    /// # Errors
    ///
    /// Returns an error if the path of the running executable is unknown.
    pub fn detect(config: UpdateConfig) -> Result<Self> {
        let current_exe = std::env::current_exe().map_err(|e| {
            IntegraError::Update(format!("cannot determine current executable path: {e}"))
        })?;
        let platform = Platform::current();

        Ok(Self {
            config,
            current_version: Version::current(),
            platform,
            current_exe,
            replacer: Arc::from(platform.replacer()),
            state_file: UpdateState::state_file_path(),
            temp_dir: std::env::temp_dir(),
        })
    }
}

/// Control-thread owner of the update state machines.
pub struct UpdateCoordinator {
    ctx: UpdateContext,
    state: UpdateState,
    check: Option<JoinHandle<()>>,
    check_tx: mpsc::UnboundedSender<RawCheck>,
    check_rx: mpsc::UnboundedReceiver<RawCheck>,
    downloading: Arc<AtomicBool>,
}

impl UpdateCoordinator {
    pub fn new(ctx: UpdateContext) -> Self {
        let state = if ctx.config.persist_skipped_versions {
            UpdateState::load_from(&ctx.state_file)
        } else {
            UpdateState::default()
        };
        let (check_tx, check_rx) = mpsc::unbounded_channel();

        Self {
            ctx,
            state,
            check: None,
            check_tx,
            check_rx,
            downloading: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn context(&self) -> &UpdateContext {
        &self.ctx
    }

    /// Start a background check.
    ///
    /// Returns `false` without doing anything while a previous check is
    /// still running. Results arrive through [`Self::next_check_event`].
    pub fn check_for_update(&mut self) -> bool {
        if self.is_checking() {
            tracing::debug!("update check already running");
            return false;
        }

        let checker = ReleaseChecker::new(
            &self.ctx.config,
            self.ctx.current_version,
            self.ctx.platform,
        );
        let tx = self.check_tx.clone();
        self.check = Some(tokio::spawn(async move {
            let raw = match checker {
                Ok(checker) => checker.check_latest().await,
                Err(e) => Err(e),
            };
            let _ = tx.send(raw);
        }));
        true
    }

    /// Wait for the next check result and republish it.
    ///
    /// An available version on the skip-list is reported as
    /// [`CheckEvent::NoUpdate`]. Returns `None` when no check is running and
    /// no result is pending. A check task that dies without a result is
    /// reported as [`CheckEvent::CheckFailed`].
    pub async fn next_check_event(&mut self) -> Option<CheckEvent> {
        if let Ok(raw) = self.check_rx.try_recv() {
            return Some(self.republish(raw));
        }

        // The task sends before it finishes, so once joined the result (if
        // any) is already queued.
        let joined = self.check.as_mut()?.await;
        self.check = None;

        let raw = match (joined, self.check_rx.try_recv()) {
            (_, Ok(raw)) => raw,
            (Ok(()), Err(_)) => return None,
            (Err(e), Err(_)) => {
                tracing::error!("update check task ended without a result: {e}");
                Err(CheckError::Network(format!("update check was interrupted: {e}")))
            }
        };
        Some(self.republish(raw))
    }

    fn republish(&mut self, raw: RawCheck) -> CheckEvent {
        if self.ctx.config.persist_skipped_versions {
            self.state.mark_checked();
            self.persist();
        }

        match raw {
            Ok(CheckOutcome::Available(info)) if self.is_skipped(&info.version) => {
                tracing::info!(version = %info.version, "update available but skipped");
                CheckEvent::NoUpdate
            }
            Ok(CheckOutcome::Available(info)) => CheckEvent::UpdateAvailable(info),
            Ok(CheckOutcome::NoUpdate) => CheckEvent::NoUpdate,
            Err(e) => {
                tracing::warn!("update check failed: {e}");
                CheckEvent::CheckFailed(e)
            }
        }
    }

    /// A downloader for `info`, or `None` while another download is active.
    ///
    /// The caller starts it and consumes its events.
    pub fn download_update(&self, info: UpdateInfo) -> Option<UpdateDownloader> {
        if self.is_downloading() {
            tracing::debug!("update download already running");
            return None;
        }

        Some(
            UpdateDownloader::new(
                info,
                self.ctx.config.clone(),
                self.ctx.current_exe.clone(),
                Arc::clone(&self.ctx.replacer),
                Arc::clone(&self.downloading),
            )
            .with_temp_root(self.ctx.temp_dir.clone()),
        )
    }

    /// Never offer `version` again (for this session, or permanently when
    /// persistence is enabled).
    pub fn skip_version(&mut self, version: &Version) {
        if self.state.skipped_versions.insert(version.to_string()) {
            tracing::info!(%version, "version skipped");
            if self.ctx.config.persist_skipped_versions {
                self.persist();
            }
        }
    }

    pub fn skipped_versions(&self) -> &BTreeSet<String> {
        &self.state.skipped_versions
    }

    pub fn is_skipped(&self, version: &Version) -> bool {
        self.state.skipped_versions.contains(&version.to_string())
    }

    pub fn is_checking(&self) -> bool {
        self.check.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn is_downloading(&self) -> bool {
        self.downloading.load(Ordering::Acquire)
    }

    fn persist(&self) {
        if let Err(e) = self.state.save_to(&self.ctx.state_file) {
            tracing::warn!("cannot persist update state: {e}");
        }
    }
}
