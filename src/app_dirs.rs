//! Centralized application directory paths for Integra.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | Windows | macOS | Linux |
//! |---------|---------|-------|-------|
//! | App data | `%APPDATA%\integra\` | `~/Library/Application Support/integra/` | `~/.local/share/integra/` |
//! | Config | `%APPDATA%\integra\` | `~/Library/Application Support/integra/` | `~/.config/integra/` |
//!
//! # Environment Overrides
//!
//! - `INTEGRA_DATA_DIR` overrides [`data_dir`]
//! - `INTEGRA_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

const APP_DIR_NAME: &str = "integra";

fn resolve(env_key: &str, base: Option<PathBuf>, fallback: &str) -> PathBuf {
    if let Some(override_dir) = std::env::var_os(env_key) {
        return PathBuf::from(override_dir);
    }
    base.map(|d| d.join(APP_DIR_NAME))
        .unwrap_or_else(|| std::env::temp_dir().join(fallback))
}

/// Application data root directory (logs live here).
#[must_use]
pub fn data_dir() -> PathBuf {
    resolve("INTEGRA_DATA_DIR", dirs::data_dir(), "integra-data")
}

/// Application config directory (`config.toml`, `update-state.json`).
#[must_use]
pub fn config_dir() -> PathBuf {
    resolve("INTEGRA_CONFIG_DIR", dirs::config_dir(), "integra-config")
}

/// Log file directory (`data_dir()/logs/`).
#[must_use]
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Persisted update state (`config_dir()/update-state.json`).
#[must_use]
pub fn update_state_file() -> PathBuf {
    config_dir().join("update-state.json")
}
