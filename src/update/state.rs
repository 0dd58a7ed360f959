//! Update state persistence.
//!
//! Tracks skipped release versions and the time of the last check.
//! Persisted to `update-state.json` in [`crate::app_dirs::config_dir`] when
//! `update.persist_skipped_versions` is enabled.

use crate::error::{IntegraError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Persistent update state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateState {
    /// Versions the user chose to skip, in display form (`"1.2.0"`).
    pub skipped_versions: BTreeSet<String>,
    /// Time of the last completed update check.
    pub last_check: Option<DateTime<Utc>>,
}

impl UpdateState {
    /// Returns the path to the state file.
    pub fn state_file_path() -> PathBuf {
        crate::app_dirs::update_state_file()
    }

    /// Load state from `path`. Returns the default state if the file is
    /// missing or cannot be parsed.
    pub fn load_from(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(_) => return Self::default(),
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(path = %path.display(), "ignoring unreadable update state: {e}");
                Self::default()
            }
        }
    }

    /// Load state from the default location.
    pub fn load() -> Self {
        Self::load_from(&Self::state_file_path())
    }

    /// Persist the state to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created or the
    /// file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                IntegraError::Update(format!(
                    "cannot create state directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IntegraError::Update(format!("cannot serialize update state: {e}")))?;

        std::fs::write(path, json).map_err(|e| {
            IntegraError::Update(format!(
                "cannot write update state to {}: {e}",
                path.display()
            ))
        })
    }

    /// Record that an update check was performed now.
    pub fn mark_checked(&mut self) {
        self.last_check = Some(Utc::now());
    }
}
