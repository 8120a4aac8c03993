//! Link application through the backend.

use crate::backend::Backend;
use crate::diagnostics::conflict_targets;
use crate::error::Result;
use crate::types::Package;
use std::path::{Path, PathBuf};

/// Result of one apply invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Whether the link manager exited successfully
    pub success: bool,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Combined captured output
    pub output: String,
    /// Conflict targets named in the output, relative to the target root
    pub conflicts: Vec<PathBuf>,
}

impl ApplyOutcome {
    /// Exit success with no conflict markers.
    ///
    /// Markers win over the exit status: a zero exit that still reports
    /// conflicts is not converged.
    pub fn converged(&self) -> bool {
        self.success && self.conflicts.is_empty()
    }

    /// Whether the output carried any conflict markers.
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Invokes the link-apply operation for a package.
pub struct Applier<'a> {
    backend: &'a dyn Backend,
    target_root: &'a Path,
}

impl<'a> Applier<'a> {
    /// Create an applier for `target_root`.
    pub fn new(backend: &'a dyn Backend, target_root: &'a Path) -> Self {
        Self {
            backend,
            target_root,
        }
    }

    /// Apply `package` once and parse the result.
    ///
    /// Only a failure to run the backend at all is an error; a failed apply
    /// is reported through [`ApplyOutcome`].
    pub fn apply(&self, package: &Package) -> Result<ApplyOutcome> {
        log::info!("Applying {} with {}", package.name, self.backend.name());
        let output = self.backend.apply(package, self.target_root)?;
        let conflicts = conflict_targets(&output.output);

        if !conflicts.is_empty() {
            log::debug!(
                "{} reported {} conflict(s) for {}",
                self.backend.name(),
                conflicts.len(),
                package.name
            );
        }

        Ok(ApplyOutcome {
            success: output.success,
            exit_code: output.exit_code,
            output: output.output,
            conflicts,
        })
    }
}
