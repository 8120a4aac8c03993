//! Per-package driver tying the components together.

use crate::applier::Applier;
use crate::backend::Backend;
use crate::classifier::Classifier;
use crate::error::{Error, Result};
use crate::fingerprint::{StepId, content_hash, fingerprint_features};
use crate::ledger::RunLedger;
use crate::planner::{Markers, Planner};
use crate::probe::{FileSystemProbe, OsProbe};
use crate::resolver::BackupRoot;
use crate::retry::{RetryCallback, RetryCoordinator};
use crate::types::{
    Classified, Failure, LinkSpec, Outcome, Package, PackageReport, PlanSource, RunReport,
};
use chrono::Local;
use serde::Serialize;
use std::path::{Component, Path, PathBuf};

/// State directory relative to the target root.
pub const STATE_SUBDIR: &str = ".local/state/dotlink";

/// Operation name used in step ids.
pub const APPLY_OPERATION: &str = "apply";

/// Inputs shared by every package in a run.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Root the links are created under
    pub target_root: PathBuf,
    /// Holds `install/` (ledger) and `backups/`
    pub state_dir: PathBuf,
    /// Tag separating backups made by this engine from other tools
    pub origin: String,
    /// Host identity for step ids
    pub host: String,
    /// Host features for step ids
    pub features: Vec<String>,
    /// Reserved names excluded from planning
    pub markers: Markers,
    /// Ignore ledger completion and always run the protocol
    pub force: bool,
}

impl ReconcileOptions {
    /// Defaults for `target_root`: state under `.local/state/dotlink`,
    /// origin `stow`, host `localhost`, no features.
    pub fn new(target_root: impl Into<PathBuf>) -> Self {
        let target_root = target_root.into();
        Self {
            state_dir: target_root.join(STATE_SUBDIR),
            target_root,
            origin: "stow".to_string(),
            host: "localhost".to_string(),
            features: Vec::new(),
            markers: Markers::default(),
            force: false,
        }
    }

    /// Directory holding ledger markers.
    pub fn ledger_dir(&self) -> PathBuf {
        self.state_dir.join("install")
    }

    /// Directory holding per-run backup roots.
    pub fn backups_dir(&self) -> PathBuf {
        self.state_dir.join("backups")
    }
}

/// Read-only view of one package against the live target.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    /// Package name
    pub package: String,
    /// Step id for the current inputs
    pub step_id: StepId,
    /// Whether the ledger marks this step complete
    pub complete: bool,
    /// How the plan was obtained
    pub plan_source: PlanSource,
    /// Planned links with dispositions
    pub links: Vec<Classified>,
    /// Rejected planned targets
    pub planning_errors: Vec<Failure>,
}

impl Preview {
    /// Whether every planned link is already in place.
    pub fn in_sync(&self) -> bool {
        self.planning_errors.is_empty() && self.links.iter().all(|c| c.disposition.is_noop())
    }
}

/// Drives plan → classify → apply/resolve/retry → ledger for each package.
pub struct Reconciler {
    backend: Box<dyn Backend>,
    probe: Box<dyn FileSystemProbe>,
    options: ReconcileOptions,
}

impl Reconciler {
    /// Create a reconciler probing the real filesystem.
    pub fn new(backend: Box<dyn Backend>, options: ReconcileOptions) -> Self {
        Self::with_probe(backend, Box::new(OsProbe), options)
    }

    /// Create a reconciler with a custom probe (useful for testing).
    pub fn with_probe(
        backend: Box<dyn Backend>,
        probe: Box<dyn FileSystemProbe>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            backend,
            probe,
            options,
        }
    }

    /// Run options.
    pub fn options(&self) -> &ReconcileOptions {
        &self.options
    }

    /// The run ledger.
    pub fn ledger(&self) -> RunLedger {
        RunLedger::new(self.options.ledger_dir())
    }

    /// Fail if the link manager cannot run.
    pub fn check_prerequisites(&self) -> Result<()> {
        if self.backend.is_available() {
            Ok(())
        } else {
            Err(Error::BackendNotFound {
                binary: self.backend.name().to_string(),
            })
        }
    }

    /// Step id for `package` with the current inputs.
    pub fn step_id(&self, package: &Package) -> Result<StepId> {
        let hash = content_hash(package, &self.options.markers, &self.options.target_root)?;
        Ok(StepId::new(
            &self.options.host,
            APPLY_OPERATION,
            &package.name,
            &fingerprint_features(&self.options.features),
            &hash,
        ))
    }

    fn planner(&self) -> Planner<'_> {
        Planner::new(
            self.backend.as_ref(),
            &self.options.target_root,
            &self.options.markers,
        )
    }

    fn classifier(&self) -> Classifier<'_> {
        Classifier::new(self.probe.as_ref(), &self.options.target_root)
    }

    /// Plan and classify `package` without touching anything.
    pub fn preview(&self, package: &Package) -> Result<Preview> {
        validate_name(&package.name)?;
        let plan = self.planner().plan(package)?;
        let step_id = self.step_id(package)?;
        Ok(Preview {
            package: package.name.clone(),
            complete: self.ledger().is_complete(&step_id),
            step_id,
            plan_source: plan.source,
            links: self.classifier().classify_all(package, &plan.specs),
            planning_errors: plan.errors.iter().map(Failure::from).collect(),
        })
    }

    /// Reconcile `packages` one at a time in name order.
    ///
    /// Only a missing link manager fails the whole call; every other
    /// failure is recorded in that package's report.
    pub fn reconcile(
        &self,
        packages: &[Package],
        callback: &dyn RetryCallback,
    ) -> Result<RunReport> {
        self.check_prerequisites()?;

        let mut ordered: Vec<&Package> = packages.iter().collect();
        ordered.sort_by(|a, b| a.name.cmp(&b.name));
        ordered.dedup_by(|a, b| a.name == b.name);

        let backup_root = BackupRoot::allocate(
            &self.options.backups_dir(),
            &self.options.origin,
            Local::now(),
        );
        let ledger = self.ledger();

        let reports = ordered
            .into_iter()
            .map(|package| self.reconcile_package(package, &backup_root, &ledger, callback))
            .collect();

        Ok(RunReport {
            packages: reports,
            backup_root: backup_root.path().to_path_buf(),
        })
    }

    fn reconcile_package(
        &self,
        package: &Package,
        backup_root: &BackupRoot,
        ledger: &RunLedger,
        callback: &dyn RetryCallback,
    ) -> PackageReport {
        log::info!("Reconciling {}", package.name);

        let preview = match self.preview(package) {
            Ok(preview) => preview,
            Err(e) => {
                log::warn!("Cannot plan {}: {}", package.name, e);
                let mut report = PackageReport::new(&package.name, "", PlanSource::Primary);
                report.fail(&e);
                return report;
            }
        };

        let mut report =
            PackageReport::new(&package.name, preview.step_id.as_str(), preview.plan_source);
        report.planning_errors.clone_from(&preview.planning_errors);
        report.links.clone_from(&preview.links);

        if !self.options.force && preview.complete && preview.in_sync() {
            log::info!("{} unchanged", package.name);
            report.outcome = Outcome::Unchanged;
            return report;
        }

        let specs: Vec<LinkSpec> = preview.links.iter().map(|c| c.spec.clone()).collect();
        let predicted: Vec<_> = preview
            .links
            .iter()
            .filter_map(|c| c.disposition.conflict().cloned())
            .collect();

        let coordinator = RetryCoordinator::new(
            Applier::new(self.backend.as_ref(), &self.options.target_root),
            &self.options.target_root,
            backup_root,
            callback,
        );
        let outcome = coordinator.run(package, &specs, &predicted);
        report.apply_attempts = outcome.attempts;
        report.backups = outcome.backups;
        report.resolution_failures = outcome
            .resolution_failures
            .iter()
            .map(Failure::from)
            .collect();

        if let Err(e) = outcome.result {
            report.fail(&e);
            return report;
        }

        // Trust the target tree, not the exit status.
        let drifted: Vec<PathBuf> = self
            .classifier()
            .classify_all(package, &specs)
            .into_iter()
            .filter(|c| !c.disposition.is_noop())
            .map(|c| c.spec.target)
            .collect();
        if !drifted.is_empty() {
            log::warn!(
                "{} reported success but {} link(s) are not in place",
                package.name,
                drifted.len()
            );
            report.fail(&Error::UnresolvedConflict {
                package: package.name.clone(),
                conflicts: drifted,
            });
            return report;
        }

        if let Err(e) = ledger.mark_complete(&preview.step_id) {
            log::warn!("Could not record completion of {}: {}", package.name, e);
        }
        report.outcome = Outcome::Converged;
        report
    }
}

/// A package name must be a single plain path component.
fn validate_name(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(Error::Planning {
            target: name.to_string(),
            reason: "package name must be a single directory name".to_string(),
        }),
    }
}
