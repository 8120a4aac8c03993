//! Bounded apply-resolve-apply protocol.
//!
//! Apply runs once. If it reports conflicts, every reported path plus every
//! conflict the classifier predicted is resolved in a single pass, and apply
//! runs exactly once more. There is no third attempt.

use crate::applier::{ApplyOutcome, Applier};
use crate::error::{Error, Result};
use crate::paths::relative_to_root;
use crate::resolver::{BackupRoot, ConflictResolver, Resolution};
use crate::types::{BackupEntry, Conflict, LinkSpec, Package};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Apply is invoked at most this many times per package.
pub const MAX_APPLY_ATTEMPTS: u32 = 2;

/// Callback trait for progress notifications during the protocol.
pub trait RetryCallback {
    /// Called when an apply attempt reported conflicts.
    ///
    /// # Arguments
    /// * `package` - Package name
    /// * `attempt` - Attempt that reported them (1-indexed)
    /// * `conflicts` - Conflicting paths, relative to the target root
    fn on_conflicts(&self, _package: &str, _attempt: u32, _conflicts: &[PathBuf]) {}

    /// Called after a blocking path was backed up and removed.
    fn on_backup(&self, _entry: &BackupEntry) {}

    /// Called before the retry apply.
    fn on_retry(&self, _package: &str, _attempt: u32, _max_attempts: u32) {}
}

/// No-op callback that does nothing.
pub struct NoCallback;

impl RetryCallback for NoCallback {}

/// Everything the protocol did for one package.
#[derive(Debug)]
pub struct RetryOutcome {
    /// Apply invocations made (1 or 2, 0 if the first could not start)
    pub attempts: u32,
    /// Verified backups made during the resolution pass
    pub backups: Vec<BackupEntry>,
    /// Paths the resolver refused or failed to back up
    pub resolution_failures: Vec<Error>,
    /// Terminal result
    pub result: Result<()>,
}

/// Orchestrates apply → resolve → apply once more.
pub struct RetryCoordinator<'a> {
    applier: Applier<'a>,
    resolver: ConflictResolver<'a>,
    target_root: &'a Path,
    backup_root: &'a BackupRoot,
    callback: &'a dyn RetryCallback,
}

impl<'a> RetryCoordinator<'a> {
    /// Create a coordinator.
    pub fn new(
        applier: Applier<'a>,
        target_root: &'a Path,
        backup_root: &'a BackupRoot,
        callback: &'a dyn RetryCallback,
    ) -> Self {
        Self {
            applier,
            resolver: ConflictResolver::new(target_root),
            target_root,
            backup_root,
            callback,
        }
    }

    /// Run the protocol for `package`.
    ///
    /// `specs` is the package's plan and `predicted` the classifier's
    /// blocking conflicts; both are only consulted once the first apply has
    /// reported conflicts.
    pub fn run(&self, package: &Package, specs: &[LinkSpec], predicted: &[Conflict]) -> RetryOutcome {
        let mut outcome = RetryOutcome {
            attempts: 0,
            backups: Vec::new(),
            resolution_failures: Vec::new(),
            result: Ok(()),
        };

        let first = match self.attempt(package, &mut outcome) {
            Ok(first) => first,
            Err(e) => {
                outcome.result = Err(e);
                return outcome;
            }
        };
        if first.converged() {
            return outcome;
        }
        if !first.has_conflicts() {
            outcome.result = Err(apply_failure(package, first));
            return outcome;
        }

        self.callback
            .on_conflicts(&package.name, outcome.attempts, &first.conflicts);
        self.resolve_pass(package, specs, &first.conflicts, predicted, &mut outcome);

        self.callback
            .on_retry(&package.name, outcome.attempts + 1, MAX_APPLY_ATTEMPTS);
        let second = match self.attempt(package, &mut outcome) {
            Ok(second) => second,
            Err(e) => {
                outcome.result = Err(e);
                return outcome;
            }
        };
        if second.converged() {
            log::info!("{} converged after retry", package.name);
            return outcome;
        }
        if second.has_conflicts() {
            self.callback
                .on_conflicts(&package.name, outcome.attempts, &second.conflicts);
            log::warn!(
                "{} still has {} conflict(s) after retry",
                package.name,
                second.conflicts.len()
            );
            outcome.result = Err(Error::UnresolvedConflict {
                package: package.name.clone(),
                conflicts: second.conflicts,
            });
        } else {
            outcome.result = Err(apply_failure(package, second));
        }
        outcome
    }

    fn attempt(&self, package: &Package, outcome: &mut RetryOutcome) -> Result<ApplyOutcome> {
        debug_assert!(outcome.attempts < MAX_APPLY_ATTEMPTS);
        outcome.attempts += 1;
        self.applier.apply(package)
    }

    /// Resolve extracted and predicted conflicts with one processed set.
    fn resolve_pass(
        &self,
        package: &Package,
        specs: &[LinkSpec],
        extracted: &[PathBuf],
        predicted: &[Conflict],
        outcome: &mut RetryOutcome,
    ) {
        let mut targets: Vec<&Path> = extracted.iter().map(PathBuf::as_path).collect();
        for conflict in predicted {
            if !targets.contains(&conflict.target.as_path()) {
                targets.push(&conflict.target);
            }
        }

        let mut processed = BTreeSet::new();
        for target in targets {
            match self
                .resolver
                .resolve(target, self.backup_root, &package.name, &mut processed)
            {
                Ok(Resolution::BackedUp(entry)) => {
                    self.callback.on_backup(&entry);
                    self.restore_directory(specs, &entry, outcome);
                    outcome.backups.push(entry);
                }
                Ok(Resolution::AlreadyAbsent | Resolution::AlreadyProcessed) => {}
                Err(e) => {
                    log::warn!("Could not resolve {}: {}", target.display(), e);
                    outcome.resolution_failures.push(e);
                }
            }
        }
    }

    /// A removed path that planned links live beneath must come back as a
    /// real directory.
    fn restore_directory(&self, specs: &[LinkSpec], entry: &BackupEntry, outcome: &mut RetryOutcome) {
        let Some(rel) = relative_to_root(self.target_root, &entry.original) else {
            return;
        };
        let is_parent = specs
            .iter()
            .any(|s| s.target != rel && s.target.starts_with(&rel));
        if !is_parent {
            return;
        }
        log::debug!("Recreating {} as a directory", entry.original.display());
        if let Err(e) = fs::create_dir_all(&entry.original) {
            log::warn!(
                "Could not recreate directory {}: {}",
                entry.original.display(),
                e
            );
            outcome.resolution_failures.push(Error::Io(e));
        }
    }
}

fn apply_failure(package: &Package, outcome: ApplyOutcome) -> Error {
    log::warn!(
        "Apply for {} failed without conflict diagnostics:\n{}",
        package.name,
        outcome.output.trim_end()
    );
    Error::Apply {
        package: package.name.clone(),
        exit_code: outcome.exit_code,
        output: outcome.output,
    }
}
