//! Configuration types for Integra.
//!
//! Loaded from `config.toml` in [`crate::app_dirs::config_dir`]; every
//! section falls back to defaults when absent.

use crate::error::{IntegraError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Release index queried by default.
pub const DEFAULT_CHECK_URL: &str =
    "https://api.github.com/repos/chaseG20gam/Integra-App/releases/latest";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegraConfig {
    /// Self-update settings.
    pub update: UpdateConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
}

/// Self-update settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateConfig {
    /// Release descriptor endpoint (GitHub "latest release" JSON).
    pub check_url: String,
    /// `User-Agent` header sent with every update request.
    pub user_agent: String,
    /// Substring identifying the product executable inside an update archive.
    pub product_name: String,
    /// Total timeout for the release index request.
    pub check_timeout_secs: u64,
    /// Connect timeout for the artifact download.
    pub connect_timeout_secs: u64,
    /// Keep skipped versions across restarts in `update-state.json`.
    pub persist_skipped_versions: bool,
    /// Timing of the detached executable swap.
    pub swap: SwapConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            check_url: DEFAULT_CHECK_URL.to_owned(),
            user_agent: format!("Integra-Client-Manager/{}", env!("CARGO_PKG_VERSION")),
            product_name: "integra".to_owned(),
            check_timeout_secs: 10,
            connect_timeout_secs: 15,
            persist_skipped_versions: false,
            swap: SwapConfig::default(),
        }
    }
}

impl UpdateConfig {
    /// Timeout for the release index request.
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs)
    }

    /// Connect timeout for artifact downloads.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Timing of the generated install script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapConfig {
    /// Seconds to wait for the application to exit and release file handles.
    pub grace_secs: u64,
    /// Copy attempts before the swap is abandoned and the backup restored.
    pub attempts: u32,
    /// Seconds between copy attempts.
    pub retry_delay_secs: u64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            grace_secs: 5,
            attempts: 10,
            retry_delay_secs: 2,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Also write daily log files under [`crate::app_dirs::logs_dir`].
    pub file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "integra=info,reqwest=warn".to_owned(),
            file: true,
        }
    }
}

impl IntegraConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| IntegraError::Config(e.to_string()))
    }

    /// Load `path` if it exists, otherwise return defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.is_file() {
            Self::from_file(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| IntegraError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> PathBuf {
        crate::app_dirs::config_file()
    }
}
