//! Config file schema for dotlink
//!
//! ```toml
//! [packages]
//! source = "~/dotfiles"
//! target = "~"
//! include = ["git", "zsh"]
//! ignore = [".github"]
//! stow = "stow"
//! origin = "stow"
//!
//! [host]
//! name = "dragon"
//! features = ["hyprland"]
//! ```

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Unified dotlink configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotlinkConfig {
    /// Where packages live and where they are linked
    #[serde(default)]
    pub packages: PackagesConfig,

    /// Host identity feeding the ledger fingerprint
    #[serde(default)]
    pub host: HostConfig,
}

impl DotlinkConfig {
    /// Load the config from `path`, falling back to defaults when it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    /// Save the config to `path`, creating its directory
    pub fn save_to(&self, path: &Path) -> Result<PathBuf> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Could not write config file: {}", path.display()))?;

        Ok(path.to_path_buf())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.packages.validate().context("Invalid [packages] section")
    }
}

// ============================================================================
// Packages
// ============================================================================

/// `[packages]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackagesConfig {
    /// Packages root; each subdirectory is a package
    #[serde(default = "default_source")]
    pub source: String,

    /// Target root the links are created under
    #[serde(default = "default_target")]
    pub target: String,

    /// Packages to reconcile; empty means every discovered package
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<String>,

    /// Extra names never linked (added to the built-in marker set)
    #[serde(default)]
    pub ignore: Vec<String>,

    /// Link manager binary
    #[serde(default = "default_stow")]
    pub stow: String,

    /// Backup origin tag
    #[serde(default = "default_origin")]
    pub origin: String,
}

fn default_source() -> String {
    "~/dotfiles".to_string()
}

fn default_target() -> String {
    "~".to_string()
}

fn default_stow() -> String {
    "stow".to_string()
}

fn default_origin() -> String {
    "stow".to_string()
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            target: default_target(),
            include: Vec::new(),
            ignore: Vec::new(),
            stow: default_stow(),
            origin: default_origin(),
        }
    }
}

impl PackagesConfig {
    fn validate(&self) -> Result<()> {
        if self.source.trim().is_empty() {
            bail!("source cannot be empty");
        }
        if self.target.trim().is_empty() {
            bail!("target cannot be empty");
        }
        if self.stow.trim().is_empty() {
            bail!("stow cannot be empty");
        }
        if !is_single_component(&self.origin) {
            bail!("origin '{}' must be a single path component", self.origin);
        }
        for name in &self.include {
            if !is_single_component(name) {
                bail!("package '{name}' must be a directory name, not a path");
            }
        }
        Ok(())
    }
}

fn is_single_component(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

// ============================================================================
// Host
// ============================================================================

/// `[host]` section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host identity override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Host features; changing them re-runs every package
    #[serde(default)]
    pub features: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let config: DotlinkConfig = toml::from_str(
            r#"
            [packages]
            source = "~/dots"
            target = "/home/me"
            include = ["git", "zsh"]
            ignore = [".github"]
            stow = "/usr/local/bin/stow"
            origin = "dotlink"

            [host]
            name = "dragon"
            features = ["hyprland", "wayland"]
            "#,
        )
        .unwrap();

        assert_eq!(config.packages.source, "~/dots");
        assert_eq!(config.packages.include, vec!["git", "zsh"]);
        assert_eq!(config.packages.stow, "/usr/local/bin/stow");
        assert_eq!(config.host.name.as_deref(), Some("dragon"));
        assert_eq!(config.host.features.len(), 2);
        config.validate().unwrap();
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: DotlinkConfig = toml::from_str("[packages]\nsource = \"~/x\"\n").unwrap();
        assert_eq!(config.packages.target, "~");
        assert_eq!(config.packages.stow, "stow");
        assert_eq!(config.packages.origin, "stow");
        assert!(config.packages.include.is_empty());
        assert!(config.host.name.is_none());

        let empty: DotlinkConfig = toml::from_str("").unwrap();
        assert_eq!(empty, DotlinkConfig::default());
    }

    #[test]
    fn test_load_missing_file_gives_default() {
        let temp = TempDir::new().unwrap();
        let config = DotlinkConfig::load_from(&temp.path().join("config.toml")).unwrap();
        assert_eq!(config, DotlinkConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.toml");

        let mut config = DotlinkConfig::default();
        config.packages.include = vec!["nvim".to_string()];
        config.host.features = vec!["laptop".to_string()];

        assert_eq!(config.save_to(&path).unwrap(), path);
        assert_eq!(DotlinkConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[packages\nsource =").unwrap();
        assert!(DotlinkConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_validate_rejects_path_like_names() {
        let mut config = DotlinkConfig::default();
        config.packages.include = vec!["../etc".to_string()];
        assert!(config.validate().is_err());

        let mut config = DotlinkConfig::default();
        config.packages.origin = "a/b".to_string();
        assert!(config.validate().is_err());

        let mut config = DotlinkConfig::default();
        config.packages.stow = " ".to_string();
        assert!(config.validate().is_err());
    }
}
