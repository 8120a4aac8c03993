//! Plan-versus-target diffing.

use crate::paths::{ancestors_of, normalize};
use crate::probe::FileSystemProbe;
use crate::types::{Classified, Conflict, ConflictReason, Disposition, FsNode, LinkSpec, Package};
use std::path::Path;

/// Assigns a [`Disposition`] to each planned link.
pub struct Classifier<'a> {
    probe: &'a dyn FileSystemProbe,
    target_root: &'a Path,
}

impl<'a> Classifier<'a> {
    /// Create a classifier for `target_root`.
    pub fn new(probe: &'a dyn FileSystemProbe, target_root: &'a Path) -> Self {
        Self { probe, target_root }
    }

    /// Classify every spec, preserving order.
    pub fn classify_all(&self, package: &Package, specs: &[LinkSpec]) -> Vec<Classified> {
        specs
            .iter()
            .map(|spec| Classified {
                spec: spec.clone(),
                disposition: self.classify(package, spec),
            })
            .collect()
    }

    /// Classify one spec.
    ///
    /// Ancestors are checked shallowest first. An absent ancestor means the
    /// link simply needs creating; a folded link from this package's own
    /// matching directory already provides the leaf.
    pub fn classify(&self, package: &Package, spec: &LinkSpec) -> Disposition {
        for ancestor in ancestors_of(&spec.target) {
            match self.probe.probe(&self.target_root.join(&ancestor)) {
                FsNode::Absent => return Disposition::NeedsLink,
                FsNode::Directory => {}
                FsNode::Symlink { target }
                    if self.links_to(&target, &package.source.join(&ancestor)) =>
                {
                    return Disposition::NoOp;
                }
                node => {
                    log::debug!(
                        "Ancestor {} of {} is a {}",
                        ancestor.display(),
                        spec.target.display(),
                        node.label()
                    );
                    return Disposition::Blocking(Conflict {
                        target: ancestor,
                        reason: ConflictReason::BlockingDirectoryMismatch,
                        spec: Some(spec.clone()),
                    });
                }
            }
        }

        let reason = match self.probe.probe(&self.target_root.join(&spec.target)) {
            FsNode::Absent => return Disposition::NeedsLink,
            FsNode::Symlink { target } if self.links_to(&target, &spec.source) => {
                return Disposition::NoOp;
            }
            FsNode::Symlink { .. } => ConflictReason::BlockingWrongLink,
            FsNode::File | FsNode::Directory => ConflictReason::BlockingNonSymlink,
        };

        Disposition::Blocking(Conflict {
            target: spec.target.clone(),
            reason,
            spec: Some(spec.clone()),
        })
    }

    /// Link-target equality: lexical first, then canonical when both resolve.
    fn links_to(&self, actual: &Path, expected: &Path) -> bool {
        let expected = normalize(expected);
        if normalize(actual) == expected {
            return true;
        }
        match (
            self.probe.canonicalize(actual),
            self.probe.canonicalize(&expected),
        ) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}
