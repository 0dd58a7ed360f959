//! Release index checker.
//!
//! Queries the "latest release" endpoint, compares the published tag against
//! the running version, and resolves a download URL for this platform.

use super::platform::Platform;
use super::release::{Release, UpdateInfo};
use super::version::{ParseVersionError, Version};
use crate::config::UpdateConfig;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, USER_AGENT};

/// Result of a successful query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// A newer release with an asset for this platform.
    Available(UpdateInfo),
    /// Nothing newer (or no release published).
    NoUpdate,
}

/// Why a check could not be classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckError {
    #[error("release index returned HTTP {0}")]
    HttpError(u16),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed release descriptor: {0}")]
    MalformedResponse(String),

    #[error("release tag is not a version: {0}")]
    VersionParse(#[from] ParseVersionError),

    #[error("no compatible download found for this platform")]
    NoCompatibleAsset,
}

/// Classify a fetched release against the running version.
///
/// # Errors
///
/// [`CheckError::VersionParse`] for a tag that is not `x.y.z`, and
/// [`CheckError::NoCompatibleAsset`] when a newer release has nothing this
/// platform can install.
pub fn evaluate_release(
    release: &Release,
    current: Version,
    platform: Platform,
) -> Result<CheckOutcome, CheckError> {
    let Some(tag) = release.version_tag() else {
        tracing::debug!("release has no tag");
        return Ok(CheckOutcome::NoUpdate);
    };

    let remote = Version::parse(tag)?;
    if remote <= current {
        tracing::debug!(%remote, %current, "already up to date");
        return Ok(CheckOutcome::NoUpdate);
    }

    let asset = release
        .select_asset(platform)
        .ok_or(CheckError::NoCompatibleAsset)?;

    tracing::info!(%remote, %current, asset = %asset.name, "update available");
    Ok(CheckOutcome::Available(UpdateInfo {
        version: remote,
        download_url: asset.browser_download_url.clone(),
        release_notes: release.body.clone().unwrap_or_default(),
    }))
}

/// HTTP client for the release index.
#[derive(Debug, Clone)]
pub struct ReleaseChecker {
    client: reqwest::Client,
    url: String,
    user_agent: String,
    current: Version,
    platform: Platform,
}

impl ReleaseChecker {
    /// Build a checker from the update settings.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Network`] if the HTTP client cannot be built.
    pub fn new(
        config: &UpdateConfig,
        current: Version,
        platform: Platform,
    ) -> Result<Self, CheckError> {
        let client = reqwest::Client::builder()
            .timeout(config.check_timeout())
            .build()
            .map_err(|e| CheckError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url: config.check_url.clone(),
            user_agent: config.user_agent.clone(),
            current,
            platform,
        })
    }

    /// Fetch the latest release and classify it.
    ///
    /// A 404 means the repository has no published release and is reported
    /// as [`CheckOutcome::NoUpdate`].
    ///
    /// # Errors
    ///
    /// See [`CheckError`].
    pub async fn check_latest(&self) -> Result<CheckOutcome, CheckError> {
        tracing::debug!(url = %self.url, "checking for updates");

        let resp = self
            .client
            .get(&self.url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| CheckError::Network(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            tracing::warn!(url = %self.url, "no published release found");
            return Ok(CheckOutcome::NoUpdate);
        }
        if !status.is_success() {
            return Err(CheckError::HttpError(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| CheckError::Network(e.to_string()))?;
        let release: Release = serde_json::from_slice(&body)
            .map_err(|e| CheckError::MalformedResponse(e.to_string()))?;

        evaluate_release(&release, self.current, self.platform)
    }
}
