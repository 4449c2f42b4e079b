//! Path resolution for keel
//!
//! # Environment Variables
//!
//! - `KEEL_CONFIG_DIR` - Override the config directory (e.g. `~/dotfiles/keel`)
//!
//! # Resolution Priority
//!
//! For config_dir():
//! 1. `KEEL_CONFIG_DIR`
//! 2. `XDG_CONFIG_HOME/keel`
//! 3. Platform default: `%APPDATA%\keel` on Windows, `~/.config/keel` elsewhere

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const ENV_CONFIG_DIR: &str = "KEEL_CONFIG_DIR";

/// Default configuration file name inside the config directory
pub const CONFIG_FILE: &str = "config.yaml";

pub fn config_dir() -> Result<PathBuf> {
    config_dir_from(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
    )
}

fn config_dir_from(override_dir: Option<String>, xdg_config: Option<String>) -> Result<PathBuf> {
    if let Some(dir) = override_dir.filter(|d| !d.is_empty()) {
        let path = expand(&dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Some(xdg) = xdg_config.filter(|d| !d.is_empty()) {
        let path = PathBuf::from(xdg).join("keel");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("keel"));
        }
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("keel"))
}

/// `config.yaml` inside [`config_dir`]
pub fn default_config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand `~` and environment variables. Unknown variables leave the input
/// unchanged.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Expand `path` and make it absolute relative to `base`.
pub fn resolve(path: &str, base: &Path) -> PathBuf {
    let expanded = expand(path);
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}
