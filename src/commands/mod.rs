pub mod apply;
pub mod backups;
pub mod init;
pub mod ledger;
pub mod plan;
pub mod status;

use anyhow::{Context as _, Result, bail};
use std::fs;
use std::path::{Path, PathBuf};
use stowkit::backend::default_backend;
use stowkit::planner::GLOBAL_IGNORE_FILE;
use stowkit::{Markers, Package, ReconcileOptions, Reconciler};

use crate::Context;
use crate::host;
use crate::paths;
use crate::schema::DotlinkConfig;

/// Directories at the packages root that are never packages
const NON_PACKAGE_DIRS: &[&str] = &["scripts", "tools"];

/// Resolved configuration for one command invocation
pub struct Session {
    pub config: DotlinkConfig,
    pub config_path: PathBuf,
    pub source_root: PathBuf,
    pub options: ReconcileOptions,
}

impl Session {
    /// Load config and apply command-line overrides
    pub fn load(ctx: &Context) -> Result<Self> {
        let config_path = match &ctx.config {
            Some(path) => path.clone(),
            None => paths::config_file()?,
        };
        let config = DotlinkConfig::load_from(&config_path)?;
        config.validate()?;

        let source_root = paths::expand(ctx.source.as_deref().unwrap_or(&config.packages.source));
        let target_root = paths::expand(ctx.target.as_deref().unwrap_or(&config.packages.target));
        if !target_root.is_dir() {
            bail!("Target root does not exist: {}", target_root.display());
        }

        let mut options = ReconcileOptions::new(target_root);
        options.origin.clone_from(&config.packages.origin);
        options.host = host::identity(config.host.name.as_deref());
        options.features.clone_from(&config.host.features);
        options.markers = Markers::with_extra(config.packages.ignore.iter().cloned());
        if let Some(home) = dirs::home_dir() {
            options.markers = options.markers.with_global_ignore(home.join(GLOBAL_IGNORE_FILE));
        }

        log::debug!(
            "Session: source={}, target={}, host={}",
            source_root.display(),
            options.target_root.display(),
            options.host
        );

        Ok(Self {
            config,
            config_path,
            source_root,
            options,
        })
    }

    /// Build a reconciler over the configured stow binary
    pub fn reconciler(&self) -> Result<Reconciler> {
        let backend = default_backend(&self.config.packages.stow)?;
        Ok(Reconciler::new(Box::new(backend), self.options.clone()))
    }

    /// Packages to operate on: the requested names, else `include`, else
    /// every package discovered under the source root
    pub fn packages(&self, requested: &[String]) -> Result<Vec<Package>> {
        let names = if !requested.is_empty() {
            requested.to_vec()
        } else if !self.config.packages.include.is_empty() {
            self.config.packages.include.clone()
        } else {
            discover_packages(&self.source_root, &self.options.markers)?
        };

        let mut packages: Vec<Package> = names
            .iter()
            .map(|name| Package::in_root(&self.source_root, name))
            .collect();
        packages.sort_by(|a, b| a.name.cmp(&b.name));
        packages.dedup_by(|a, b| a.name == b.name);
        Ok(packages)
    }
}

/// Subdirectories of `root` that look like packages, sorted by name.
///
/// Hidden entries, marker names and helper directories are skipped.
pub fn discover_packages(root: &Path, markers: &Markers) -> Result<Vec<String>> {
    if !root.is_dir() {
        bail!("Packages root does not exist: {}", root.display());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(root).with_context(|| format!("Could not read {}", root.display()))? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            log::warn!("Skipping non-UTF-8 entry in {}", root.display());
            continue;
        };

        if name.starts_with('.') || markers.is_marker(&file_name) || NON_PACKAGE_DIRS.contains(&name)
        {
            continue;
        }

        if entry.path().is_dir() {
            names.push(name.to_string());
        }
    }

    names.sort();
    Ok(names)
}
