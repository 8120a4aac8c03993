//! Backup-then-remove neutralization of blocking paths.
//!
//! A path is only ever removed after a copy of it has been written under the
//! run's backup root and verified against the original. Any failure before
//! that point leaves the original untouched.

use crate::error::{Error, Result};
use crate::paths::{ancestors_of, relative_to_root};
use crate::types::{BackupEntry, NodeKind};
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// Format of the per-run backup directory name.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Timestamp-partitioned backup location for one run.
///
/// `<backups-dir>/<run-timestamp>/<origin-tag>`. Nothing is created until
/// the first backup is written.
#[derive(Debug, Clone)]
pub struct BackupRoot {
    path: PathBuf,
    timestamp: DateTime<Local>,
}

impl BackupRoot {
    /// Pick a fresh run directory under `backups_dir`.
    ///
    /// If a directory for the same second already exists a numeric suffix is
    /// appended, so earlier backups are never written into.
    pub fn allocate(backups_dir: &Path, origin: &str, now: DateTime<Local>) -> Self {
        let stamp = now.format(TIMESTAMP_FORMAT).to_string();
        let mut run_dir = backups_dir.join(&stamp);
        let mut suffix = 1;
        while run_dir.exists() {
            run_dir = backups_dir.join(format!("{stamp}-{suffix}"));
            suffix += 1;
        }
        Self {
            path: run_dir.join(origin),
            timestamp: now,
        }
    }

    /// Use an explicit directory.
    pub fn at(path: impl Into<PathBuf>, timestamp: DateTime<Local>) -> Self {
        Self {
            path: path.into(),
            timestamp,
        }
    }

    /// Directory package backups are written under.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run timestamp recorded on every entry.
    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Destination of `rel` for `package`.
    pub fn destination(&self, package: &str, rel: &Path) -> PathBuf {
        self.path.join(package).join(rel)
    }
}

/// What happened to one blocking path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Copied, verified and removed
    BackedUp(BackupEntry),
    /// Nothing existed at the path
    AlreadyAbsent,
    /// The path or one of its ancestors was handled earlier in this pass
    AlreadyProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyMode {
    /// Symlinks are copied as symlinks
    Preserve,
    /// Symlinks are replaced by what they point to
    Dereference,
}

type CopyFn = fn(&Path, &Path, NodeKind, CopyMode) -> io::Result<()>;

/// Safely neutralizes blocking paths under a target root.
pub struct ConflictResolver<'a> {
    target_root: &'a Path,
    copy: CopyFn,
}

impl<'a> ConflictResolver<'a> {
    /// Create a resolver confined to `target_root`.
    pub fn new(target_root: &'a Path) -> Self {
        Self {
            target_root,
            copy: copy_entry,
        }
    }

    #[cfg(test)]
    fn with_copy(mut self, copy: CopyFn) -> Self {
        self.copy = copy;
        self
    }

    /// Back up and remove the entry at `path`.
    ///
    /// `path` may be absolute or relative to the target root. `processed`
    /// belongs to the caller's resolution pass and records every relative
    /// path already handled, so an ancestor is purged at most once.
    pub fn resolve(
        &self,
        path: &Path,
        backup_root: &BackupRoot,
        package: &str,
        processed: &mut BTreeSet<PathBuf>,
    ) -> Result<Resolution> {
        if path.components().any(|c| c == Component::ParentDir) {
            return Err(Error::unsafe_path(path, "contains a '..' component"));
        }
        let Some(mut rel) = relative_to_root(self.target_root, path) else {
            return Err(Error::unsafe_path(path, "not strictly under the target root"));
        };

        if is_processed(processed, &rel) {
            return Ok(Resolution::AlreadyProcessed);
        }

        // A path reached through a file or symlink cannot be removed on its
        // own; the first non-directory ancestor is what actually blocks.
        for ancestor in ancestors_of(&rel) {
            match fs::symlink_metadata(self.target_root.join(&ancestor)) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => {
                    log::debug!(
                        "Redirecting {} to blocking ancestor {}",
                        rel.display(),
                        ancestor.display()
                    );
                    rel = ancestor;
                    break;
                }
                Err(_) => {
                    processed.insert(rel);
                    return Ok(Resolution::AlreadyAbsent);
                }
            }
        }
        if processed.contains(&rel) {
            return Ok(Resolution::AlreadyProcessed);
        }

        let original = self.target_root.join(&rel);
        let meta = match fs::symlink_metadata(&original) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                processed.insert(rel);
                return Ok(Resolution::AlreadyAbsent);
            }
            Err(e) => return Err(Error::backup(&original, format!("cannot inspect: {e}"))),
        };
        let kind = if meta.file_type().is_symlink() {
            NodeKind::Symlink
        } else if meta.is_dir() {
            NodeKind::Directory
        } else if meta.is_file() {
            NodeKind::File
        } else {
            return Err(Error::backup(
                &original,
                "not a regular file, directory or symlink",
            ));
        };

        let destination = backup_root.destination(package, &rel);
        if fs::symlink_metadata(&destination).is_ok() {
            return Err(Error::backup(
                &original,
                format!("destination {} already exists", destination.display()),
            ));
        }
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::backup(&original, format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let mode = match (self.copy)(&original, &destination, kind, CopyMode::Preserve) {
            Ok(()) => CopyMode::Preserve,
            Err(e) => {
                log::debug!(
                    "Preserving copy of {} failed ({}), dereferencing",
                    original.display(),
                    e
                );
                discard(&destination);
                if let Err(e) = (self.copy)(&original, &destination, kind, CopyMode::Dereference) {
                    discard(&destination);
                    return Err(Error::backup(&original, format!("copy failed: {e}")));
                }
                CopyMode::Dereference
            }
        };

        if let Err(reason) = verify(&original, &destination, kind, mode) {
            discard(&destination);
            return Err(Error::backup(&original, format!("verification failed: {reason}")));
        }

        let removed = if kind == NodeKind::Directory {
            fs::remove_dir_all(&original)
        } else {
            fs::remove_file(&original)
        };
        removed.map_err(|e| {
            Error::backup(
                &original,
                format!(
                    "backed up to {} but could not remove: {e}",
                    destination.display()
                ),
            )
        })?;

        log::info!(
            "Backed up {} {} to {}",
            kind,
            original.display(),
            destination.display()
        );
        processed.insert(rel);
        Ok(Resolution::BackedUp(BackupEntry {
            original,
            destination,
            run_timestamp: backup_root.timestamp(),
            package: package.to_string(),
            kind,
        }))
    }
}

fn is_processed(processed: &BTreeSet<PathBuf>, rel: &Path) -> bool {
    processed.contains(rel) || ancestors_of(rel).iter().any(|a| processed.contains(a))
}

/// Best-effort removal of a partial backup.
fn discard(path: &Path) {
    let result = match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(_) => return,
    };
    if let Err(e) = result {
        log::warn!("Could not discard partial backup {}: {}", path.display(), e);
    }
}

fn copy_entry(src: &Path, dst: &Path, kind: NodeKind, mode: CopyMode) -> io::Result<()> {
    match (kind, mode) {
        (NodeKind::Symlink, CopyMode::Preserve) => {
            std::os::unix::fs::symlink(fs::read_link(src)?, dst)
        }
        (NodeKind::File, _) => copy_file(src, dst),
        (NodeKind::Directory, _) => copy_tree(src, dst, mode),
        (NodeKind::Symlink, CopyMode::Dereference) => {
            if fs::metadata(src)?.is_dir() {
                copy_tree(src, dst, mode)
            } else {
                copy_file(src, dst)
            }
        }
    }
}

/// Copy regular file contents. Anything else (FIFOs, sockets, devices)
/// is refused, since reading it could block or never end.
fn copy_file(src: &Path, dst: &Path) -> io::Result<()> {
    if !fs::metadata(src)?.is_file() {
        return Err(io::Error::other(format!(
            "{} is not a regular file, directory or symlink",
            src.display()
        )));
    }
    fs::copy(src, dst).map(|_| ())
}

fn copy_tree(src: &Path, dst: &Path, mode: CopyMode) -> io::Result<()> {
    let follow = mode == CopyMode::Dereference;
    for entry in WalkDir::new(src).follow_links(follow) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let to = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&to)?;
        } else if file_type.is_symlink() {
            std::os::unix::fs::symlink(fs::read_link(entry.path())?, &to)?;
        } else {
            copy_file(entry.path(), &to)?;
        }
    }
    Ok(())
}

fn verify(
    src: &Path,
    dst: &Path,
    kind: NodeKind,
    mode: CopyMode,
) -> std::result::Result<(), String> {
    let dereferenced_dir = kind == NodeKind::Symlink
        && mode == CopyMode::Dereference
        && fs::metadata(src).is_ok_and(|m| m.is_dir());

    match (kind, mode) {
        (NodeKind::Symlink, CopyMode::Preserve) => {
            let expected = fs::read_link(src).map_err(|e| e.to_string())?;
            let actual = fs::read_link(dst).map_err(|e| e.to_string())?;
            if expected == actual {
                Ok(())
            } else {
                Err(format!(
                    "link target {} != {}",
                    actual.display(),
                    expected.display()
                ))
            }
        }
        (NodeKind::Directory, _) => compare_trees(src, dst, mode == CopyMode::Dereference),
        _ if dereferenced_dir => compare_trees(src, dst, true),
        _ => {
            let expected = hash_file(src)?;
            let actual = hash_file(dst)?;
            if expected == actual {
                Ok(())
            } else {
                Err("content hash mismatch".to_string())
            }
        }
    }
}

fn hash_file(path: &Path) -> std::result::Result<blake3::Hash, String> {
    fs::read(path)
        .map(|bytes| blake3::hash(&bytes))
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// One entry of a tree listing.
#[derive(Debug, PartialEq, Eq)]
enum TreeEntry {
    Directory,
    Symlink(PathBuf),
    File(blake3::Hash),
}

fn compare_trees(src: &Path, dst: &Path, follow: bool) -> std::result::Result<(), String> {
    let expected = tree_listing(src, follow)?;
    let actual = tree_listing(dst, false)?;
    if expected.len() != actual.len() {
        return Err(format!(
            "copied {} entries, expected {}",
            actual.len(),
            expected.len()
        ));
    }
    match expected
        .iter()
        .find(|(rel, entry)| actual.get(*rel) != Some(*entry))
    {
        Some((rel, _)) => Err(format!("{} differs from the original", rel.display())),
        None => Ok(()),
    }
}

/// Every entry under `root` with its kind and, for files, a content hash.
fn tree_listing(
    root: &Path,
    follow: bool,
) -> std::result::Result<BTreeMap<PathBuf, TreeEntry>, String> {
    let mut listing = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(follow).min_depth(1) {
        let entry = entry.map_err(|e| e.to_string())?;
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let file_type = entry.file_type();
        let node = if file_type.is_dir() {
            TreeEntry::Directory
        } else if file_type.is_symlink() {
            TreeEntry::Symlink(fs::read_link(entry.path()).map_err(|e| e.to_string())?)
        } else {
            TreeEntry::File(hash_file(entry.path())?)
        };
        listing.insert(rel.to_path_buf(), node);
    }
    Ok(listing)
}
