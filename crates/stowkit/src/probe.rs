//! Target filesystem probe.
//!
//! The classifier only ever looks at the target tree through
//! [`FileSystemProbe`], so classification can be tested against an
//! in-memory tree.

use crate::paths::resolve_link_target;
use crate::types::FsNode;
use std::fs;
use std::path::{Path, PathBuf};

/// Reports the structured state of a path.
pub trait FileSystemProbe: Send + Sync {
    /// Inspect `path` without following a final symlink.
    ///
    /// Unreadable paths are reported as [`FsNode::Absent`].
    fn probe(&self, path: &Path) -> FsNode;

    /// Fully resolve `path`, if the probe can.
    ///
    /// Used as the second step of link-target comparison.
    fn canonicalize(&self, _path: &Path) -> Option<PathBuf> {
        None
    }
}

/// Probe backed by the real filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsProbe;

impl FileSystemProbe for OsProbe {
    fn probe(&self, path: &Path) -> FsNode {
        let Ok(meta) = fs::symlink_metadata(path) else {
            return FsNode::Absent;
        };
        let file_type = meta.file_type();
        if file_type.is_symlink() {
            match fs::read_link(path) {
                Ok(raw) => FsNode::Symlink {
                    target: resolve_link_target(path, &raw),
                },
                Err(e) => {
                    log::debug!("Cannot read link {}: {}", path.display(), e);
                    FsNode::Absent
                }
            }
        } else if file_type.is_dir() {
            FsNode::Directory
        } else {
            FsNode::File
        }
    }

    fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        fs::canonicalize(path).ok()
    }
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryProbe;
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_os_probe_states() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("file"), "x").unwrap();
        fs::create_dir(root.join("dir")).unwrap();
        std::os::unix::fs::symlink("file", root.join("rel-link")).unwrap();
        std::os::unix::fs::symlink("/does/not/exist", root.join("dangling")).unwrap();

        let probe = OsProbe;
        assert_eq!(probe.probe(&root.join("missing")), FsNode::Absent);
        assert_eq!(probe.probe(&root.join("file")), FsNode::File);
        assert_eq!(probe.probe(&root.join("dir")), FsNode::Directory);
        assert_eq!(
            probe.probe(&root.join("rel-link")),
            FsNode::Symlink {
                target: root.join("file")
            }
        );
        assert_eq!(
            probe.probe(&root.join("dangling")),
            FsNode::Symlink {
                target: PathBuf::from("/does/not/exist")
            }
        );
    }

    #[test]
    fn test_os_probe_does_not_follow_directory_links() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir(root.join("real")).unwrap();
        std::os::unix::fs::symlink(root.join("real"), root.join("alias")).unwrap();

        let node = OsProbe.probe(&root.join("alias"));
        assert!(!node.is_dir());
        assert!(matches!(node, FsNode::Symlink { .. }));
    }

    #[test]
    fn test_memory_probe() {
        let probe = MemoryProbe::new()
            .dir("/t/.config")
            .link("/t/.config/nvim", "../../src/nvim/.config/nvim");
        assert_eq!(probe.probe(Path::new("/t/.config")), FsNode::Directory);
        assert_eq!(
            probe.probe(Path::new("/t/.config/nvim")),
            FsNode::Symlink {
                target: PathBuf::from("/src/nvim/.config/nvim")
            }
        );
        assert_eq!(probe.probe(Path::new("/t/.zshrc")), FsNode::Absent);
        assert_eq!(probe.canonicalize(Path::new("/t")), None);
    }
}
