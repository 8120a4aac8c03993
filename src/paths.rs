//! Centralized path resolution for dotlink
//!
//! This module provides config directory resolution with environment variable
//! support, so the dotlink config itself can live in a dotfiles repository.
//!
//! # Environment Variables
//!
//! - `DOTLINK_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/dotlink`)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `DOTLINK_CONFIG_DIR` environment variable
//! 2. Existing `~/.config/dotlink/`
//! 3. `XDG_CONFIG_HOME/dotlink` (if set)
//! 4. Default: `~/.config/dotlink`
//!
//! Engine state (ledger markers and backups) is not resolved here: it always
//! lives under the target root, see `stowkit::reconciler::STATE_SUBDIR`.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "DOTLINK_CONFIG_DIR";

/// Config file name inside the config directory
pub const CONFIG_FILE: &str = "config.toml";

/// Get the dotlink config directory path
///
/// Priority:
/// 1. `DOTLINK_CONFIG_DIR` env var
/// 2. Existing `~/.config/dotlink/`
/// 3. `XDG_CONFIG_HOME/dotlink`
/// 4. `~/.config/dotlink`
pub fn config_dir() -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    // 2. Check for an existing ~/.config/dotlink
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let home_config = home.join(".config").join("dotlink");
    if home_config.exists() {
        log::debug!("Using existing config dir: {}", home_config.display());
        return Ok(home_config);
    }

    // 3. Check XDG_CONFIG_HOME
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("dotlink");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    log::debug!("Using default config dir: {}", home_config.display());
    Ok(home_config)
}

/// Get the default config file path
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE))
}

/// Expand ~ and environment variables in a path string.
///
/// This is the canonical path expansion function for dotlink. All modules
/// should use this instead of calling shellexpand directly.
///
/// # Examples
///
/// ```ignore
/// // Expands ~ to home directory
/// let home_path = paths::expand("~/dotfiles");
///
/// // Expands environment variables
/// let var_path = paths::expand("$HOME/dotfiles");
/// ```
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

/// Contract home directory prefix to `~` for display
pub fn contract_home(path: &std::path::Path) -> String {
    if let Some(home) = dirs::home_dir()
        && let Ok(rest) = path.strip_prefix(&home)
    {
        if rest.as_os_str().is_empty() {
            return "~".to_string();
        }
        return format!("~/{}", rest.display());
    }
    path.display().to_string()
}

// ============================================================================
// Tests
// ============================================================================
