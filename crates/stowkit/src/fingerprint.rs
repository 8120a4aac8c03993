//! Step identifiers and the fingerprints they are built from.
//!
//! Any change to an input that shapes a package's link set (the package
//! tree, the target root, the host, or its feature list) produces a new
//! [`StepId`], which invalidates the cached ledger entry on its own.

use crate::error::Result;
use crate::planner::Markers;
use crate::types::Package;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use walkdir::WalkDir;

/// Hex digits of each hash kept in a step id.
const HASH_LEN: usize = 16;

/// Opaque, filename-safe ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    /// Compose a step id.
    ///
    /// Rendered as `host.operation.package.features.content`, with every
    /// part reduced to `[A-Za-z0-9_-]` and the hashes shortened.
    pub fn new(
        host: &str,
        operation: &str,
        package: &str,
        feature_fingerprint: &str,
        content_hash: &str,
    ) -> Self {
        let parts = [
            sanitize(host),
            sanitize(operation),
            sanitize(package),
            shorten(&sanitize(feature_fingerprint)),
            shorten(&sanitize(content_hash)),
        ];
        Self(parts.join("."))
    }

    /// Wrap an existing marker name.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The id as a string (also the marker file name).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Package segment of a composed id.
    pub fn package(&self) -> Option<&str> {
        self.0.split('.').nth(2)
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Replace anything outside `[A-Za-z0-9_-]` so the id is one path segment.
pub fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn shorten(hash: &str) -> String {
    hash.chars().take(HASH_LEN).collect()
}

/// Fingerprint of a host feature list; order and duplicates do not matter.
pub fn fingerprint_features(features: &[String]) -> String {
    let mut sorted: Vec<&str> = features.iter().map(|f| f.trim()).collect();
    sorted.sort_unstable();
    sorted.dedup();
    blake3::hash(sorted.join("\n").as_bytes()).to_hex().to_string()
}

/// Hash of everything that determines a package's link set.
///
/// Covers the target root path, the package's ignore rules and, for every
/// entry those rules keep, its relative path, its kind, and its file
/// contents or link target.
pub fn content_hash(package: &Package, markers: &Markers, target_root: &Path) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(target_root.as_os_str().as_bytes());
    hasher.update(b"\0");
    let rules = markers.rules_for(&package.source);
    hasher.update(rules.describe().as_bytes());
    hasher.update(b"\0");

    let walker = WalkDir::new(&package.source)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            !e.path()
                .strip_prefix(&package.source)
                .is_ok_and(|rel| rules.is_ignored(rel))
        });

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;
        let Ok(rel) = entry.path().strip_prefix(&package.source) else {
            continue;
        };
        hasher.update(rel.as_os_str().as_bytes());
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            hasher.update(b"\0l\0");
            hasher.update(fs::read_link(entry.path())?.as_os_str().as_bytes());
        } else if file_type.is_dir() {
            hasher.update(b"\0d");
        } else {
            hasher.update(b"\0f\0");
            hasher.update(&fs::read(entry.path())?);
        }
        hasher.update(b"\0");
    }

    Ok(hasher.finalize().to_hex().to_string())
}
