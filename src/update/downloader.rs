//! Background download, extraction and installation of an update.
//!
//! [`UpdateDownloader::start`] spawns one task that walks the session
//! through download → extract → install and reports every stage as a
//! [`DownloadEvent`]. Failures never cross the task boundary as errors;
//! they end the session with [`DownloadEvent::Failed`].

use super::events::DownloadEvent;
use super::installer::Installer;
use super::platform::SelfReplace;
use super::release::UpdateInfo;
use crate::config::UpdateConfig;
use crate::error::IntegraError;
use futures_util::StreamExt;
use reqwest::header::USER_AGENT;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// Errors from fetching or unpacking the update artifact.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("download server returned HTTP {0}")]
    Status(u16),

    #[error("download incomplete: received {received} of {expected} bytes")]
    Incomplete { received: u64, expected: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot extract update: {0}")]
    Archive(String),
}

/// Refusal to start a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum UpdateError {
    #[error("an update download is already in progress")]
    DownloadInProgress,
}

/// Clears the shared activity flag when the session ends, however it ends.
struct ActiveGuard(Arc<AtomicBool>);

impl ActiveGuard {
    fn claim(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(Arc::clone(flag)))
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A running session.
#[derive(Debug)]
pub struct DownloadTask {
    events: mpsc::UnboundedReceiver<DownloadEvent>,
}

impl DownloadTask {
    /// Next event; `None` once the session has ended and every event was read.
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }
}

/// One download/install session bound to a single [`UpdateInfo`].
pub struct UpdateDownloader {
    info: UpdateInfo,
    config: UpdateConfig,
    current_exe: PathBuf,
    replacer: Arc<dyn SelfReplace>,
    active: Arc<AtomicBool>,
    temp_root: PathBuf,
}

impl UpdateDownloader {
    /// `active` is shared by every downloader of one coordinator; at most one
    /// of them runs at a time.
    pub fn new(
        info: UpdateInfo,
        config: UpdateConfig,
        current_exe: PathBuf,
        replacer: Arc<dyn SelfReplace>,
        active: Arc<AtomicBool>,
    ) -> Self {
        Self {
            info,
            config,
            current_exe,
            replacer,
            active,
            temp_root: std::env::temp_dir(),
        }
    }

    /// Create session directories under `dir` instead of the system temp dir.
    #[must_use]
    pub fn with_temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_root = dir.into();
        self
    }

    /// Spawn the session on the current Tokio runtime.
    ///
    /// # Errors
    ///
    /// [`UpdateError::DownloadInProgress`] if another session sharing the
    /// activity flag is still running. Nothing is spawned in that case.
    pub fn start(self) -> Result<DownloadTask, UpdateError> {
        let guard = ActiveGuard::claim(&self.active).ok_or(UpdateError::DownloadInProgress)?;
        let (tx, events) = mpsc::unbounded_channel();

        tracing::info!(
            version = %self.info.version,
            url = %self.info.download_url,
            "starting update download"
        );

        tokio::spawn(async move {
            let outcome = self.run(&tx).await;
            // Release before the terminal event so observers see an idle flag.
            drop(guard);
            let terminal = match outcome {
                Ok(script) => {
                    tracing::info!(script = %script.display(), "update ready, exit to apply");
                    DownloadEvent::Completed { script }
                }
                Err(e) => {
                    tracing::error!("update failed: {e}");
                    DownloadEvent::Failed {
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(terminal);
        });

        Ok(DownloadTask { events })
    }

    async fn run(&self, tx: &mpsc::UnboundedSender<DownloadEvent>) -> Result<PathBuf, IntegraError> {
        let session_dir = self
            .temp_root
            .join(format!("integra_update_{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&session_dir).await?;

        let artifact = session_dir.join(artifact_file_name(&self.info));
        self.download(&artifact, tx).await?;

        let _ = tx.send(DownloadEvent::ExtractionStarted);
        let extracted = session_dir.join("extracted");
        {
            let (artifact, extracted) = (artifact.clone(), extracted.clone());
            tokio::task::spawn_blocking(move || extract(&artifact, &extracted))
                .await
                .map_err(|e| DownloadError::Archive(format!("extraction task failed: {e}")))??;
        }
        tracing::debug!(dir = %extracted.display(), "update extracted");

        let _ = tx.send(DownloadEvent::InstallationStarted);
        let installer = Installer::new(Arc::clone(&self.replacer), &self.config);
        let current_exe = self.current_exe.clone();
        let report = tokio::task::spawn_blocking(move || installer.install(&extracted, &current_exe))
            .await
            .map_err(|e| IntegraError::Update(format!("install task failed: {e}")))??;

        Ok(report.script)
    }

    async fn download(
        &self,
        dest: &Path,
        tx: &mpsc::UnboundedSender<DownloadEvent>,
    ) -> Result<(), DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .build()
            .map_err(|e| DownloadError::Http(e.to_string()))?;

        let resp = client
            .get(&self.info.download_url)
            .header(USER_AGENT, &self.config.user_agent)
            .send()
            .await
            .map_err(|e| DownloadError::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DownloadError::Status(status.as_u16()));
        }

        let total_bytes = resp.content_length();
        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = resp.bytes_stream();
        let mut received: u64 = 0;

        let _ = tx.send(DownloadEvent::Progress {
            bytes_downloaded: 0,
            total_bytes,
        });

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                // A connection closed before Content-Length bytes arrived.
                Err(e) => {
                    return Err(match total_bytes {
                        Some(expected) if received < expected => {
                            tracing::warn!(received, expected, "download stream ended early: {e}");
                            DownloadError::Incomplete { received, expected }
                        }
                        _ => DownloadError::Http(e.to_string()),
                    });
                }
            };
            file.write_all(&chunk).await?;
            received = received.saturating_add(chunk.len() as u64);
            let bytes_downloaded = total_bytes.map_or(received, |total| received.min(total));
            let _ = tx.send(DownloadEvent::Progress {
                bytes_downloaded,
                total_bytes,
            });
        }
        file.flush().await?;

        if let Some(expected) = total_bytes {
            if received < expected {
                return Err(DownloadError::Incomplete { received, expected });
            }
        }

        tracing::info!(bytes = received, path = %dest.display(), "update downloaded");
        Ok(())
    }
}

/// Last path segment of the download URL, or `integra_update_{version}.zip`.
pub fn artifact_file_name(info: &UpdateInfo) -> String {
    url::Url::parse(&info.download_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|segments| segments.last().map(str::to_owned))
        })
        .filter(|name| !name.is_empty() && name != ".." && !name.contains('\\'))
        .unwrap_or_else(|| format!("integra_update_{}.zip", info.version))
}

/// Unpack `artifact` into `dest`.
///
/// `.zip` files are extracted with entry paths confined to `dest`; anything
/// else is taken to be the executable itself and copied in unchanged.
pub fn extract(artifact: &Path, dest: &Path) -> Result<(), DownloadError> {
    std::fs::create_dir_all(dest)?;

    let is_zip = artifact
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
    if !is_zip {
        let name = artifact
            .file_name()
            .ok_or_else(|| DownloadError::Archive("artifact has no file name".to_owned()))?;
        let out = dest.join(name);
        std::fs::copy(artifact, &out)?;
        set_mode(&out, 0o755)?;
        return Ok(());
    }

    let file = std::fs::File::open(artifact)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| DownloadError::Archive(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| DownloadError::Archive(e.to_string()))?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(DownloadError::Archive(format!(
                "entry {:?} escapes the extraction directory",
                entry.name()
            )));
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(&out)?;
        io::copy(&mut entry, &mut file)?;

        if let Some(mode) = entry.unix_mode() {
            set_mode(&out, mode & 0o7777)?;
        }
    }

    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
