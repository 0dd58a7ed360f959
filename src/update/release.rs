//! Release descriptor wire types and platform asset selection.

use super::platform::Platform;
use super::version::Version;
use serde::{Deserialize, Serialize};

/// The subset of a GitHub release response the updater reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
    #[serde(default)]
    pub body: Option<String>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseAsset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

impl Release {
    /// The tag with one leading `v`/`V` removed; `None` when missing or empty.
    pub fn version_tag(&self) -> Option<&str> {
        let tag = self.tag_name.as_deref()?.trim();
        let tag = tag
            .strip_prefix('v')
            .or_else(|| tag.strip_prefix('V'))
            .unwrap_or(tag);
        (!tag.is_empty()).then_some(tag)
    }

    /// Pick the download URL for `platform`.
    ///
    /// Prefers a `.zip` or native executable whose name carries a platform
    /// marker, then falls back to a `.zip` not marked for another platform.
    pub fn select_asset(&self, platform: Platform) -> Option<&ReleaseAsset> {
        let candidates = || {
            self.assets
                .iter()
                .filter(|a| !a.browser_download_url.is_empty())
        };

        let native = candidates().find(|a| {
            let name = a.name.to_lowercase();
            let packaged = name.ends_with(".zip")
                || platform
                    .executable_extension()
                    .is_some_and(|ext| name.ends_with(ext));
            packaged && platform.is_marked(&name)
        });

        native.or_else(|| {
            candidates().find(|a| {
                let name = a.name.to_lowercase();
                name.ends_with(".zip") && !platform.is_foreign(&name)
            })
        })
    }
}

/// A newer release resolved for this platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateInfo {
    pub version: Version,
    pub download_url: String,
    pub release_notes: String,
}
