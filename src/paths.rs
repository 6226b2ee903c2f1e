//! Centralized path resolution for stratum
//!
//! # Environment Variables
//!
//! - `STRATUM_CONFIG_DIR` - Override config directory
//! - `STRATUM_STATE_DIR` - Override state directory (local backend state)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `STRATUM_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/stratum` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\stratum`
//!    - macOS/Linux: `~/.config/stratum`
//!
//! For state_dir():
//! 1. `STRATUM_STATE_DIR` environment variable
//! 2. `XDG_STATE_HOME/stratum` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\stratum`
//!    - macOS/Linux: `~/.local/state/stratum`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "STRATUM_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "STRATUM_STATE_DIR";

const APP: &str = "stratum";

/// Get the stratum config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join(APP);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join(APP));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join(APP);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Get the stratum state directory path
pub fn state_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_STATE_DIR) {
        let path = expand(&dir);
        log::debug!("Using state dir from {}: {}", ENV_STATE_DIR, path.display());
        return Ok(path);
    }

    if let Ok(xdg_state) = std::env::var("XDG_STATE_HOME") {
        let path = PathBuf::from(xdg_state).join(APP);
        log::debug!("Using XDG_STATE_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(local_app_data) = dirs::data_local_dir() {
            return Ok(local_app_data.join(APP));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".local").join("state").join(APP))
}

/// Default location of `stratum.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("stratum.toml"))
}

/// Default location of the local backend state
pub fn backend_state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join("backend.json"))
}

/// Expand `~` and environment variables in a path
///
/// Unknown variables are left as written.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
