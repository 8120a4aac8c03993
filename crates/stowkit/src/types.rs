//! Core types for symlink reconciliation.

use crate::error::{Error, ErrorCategory};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// A named directory tree whose layout mirrors the desired layout under the
/// target root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    /// Package name (e.g., "zsh", "nvim")
    pub name: String,
    /// Absolute source root of the package (`<packages-root>/<name>`)
    pub source: PathBuf,
}

impl Package {
    /// Create a package from a name and an explicit source directory.
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Create a package located at `<root>/<name>`.
    pub fn in_root(root: &Path, name: &str) -> Self {
        Self::new(name, root.join(name))
    }

    /// The directory containing this package (what stow calls `--dir`).
    pub fn root(&self) -> &Path {
        self.source.parent().unwrap_or(Path::new("/"))
    }
}

/// Kind of link a [`LinkSpec`] materializes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryKind {
    /// Link to a single file
    FileLink,
    /// Folded link standing in for a whole directory
    DirectoryLink,
}

/// One desired link: `target` (relative to the target root) should resolve to
/// `source` (absolute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkSpec {
    /// Link path, relative to the target root
    pub target: PathBuf,
    /// Absolute path the link should resolve to
    pub source: PathBuf,
    /// File or folded directory link
    pub kind: EntryKind,
}

impl LinkSpec {
    /// Create a file link spec.
    pub fn file(target: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            source: source.into(),
            kind: EntryKind::FileLink,
        }
    }

    /// Create a folded directory link spec.
    pub fn directory(target: impl Into<PathBuf>, source: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            source: source.into(),
            kind: EntryKind::DirectoryLink,
        }
    }
}

/// Kind of filesystem entry, without link details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Regular file
    File,
    /// Real directory
    Directory,
    /// Symbolic link
    Symlink,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeKind::File => "file",
            NodeKind::Directory => "directory",
            NodeKind::Symlink => "symlink",
        };
        write!(f, "{s}")
    }
}

/// Observed state of a single path, never following a final symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsNode {
    /// Nothing exists at the path
    Absent,
    /// Regular file (or anything else that is neither dir nor symlink)
    File,
    /// Real directory
    Directory,
    /// Symlink; `target` is absolute and lexically normalized
    Symlink {
        /// Resolved destination of the link
        target: PathBuf,
    },
}

impl FsNode {
    /// Whether anything exists at the path (dangling links count).
    pub fn exists(&self) -> bool {
        !matches!(self, FsNode::Absent)
    }

    /// Whether this is a real directory (not a link to one).
    pub fn is_dir(&self) -> bool {
        matches!(self, FsNode::Directory)
    }

    /// Entry kind, or `None` when absent.
    pub fn kind(&self) -> Option<NodeKind> {
        match self {
            FsNode::Absent => None,
            FsNode::File => Some(NodeKind::File),
            FsNode::Directory => Some(NodeKind::Directory),
            FsNode::Symlink { .. } => Some(NodeKind::Symlink),
        }
    }

    /// Short label for reports.
    pub fn label(&self) -> &'static str {
        match self {
            FsNode::Absent => "absent",
            FsNode::File => "file",
            FsNode::Directory => "directory",
            FsNode::Symlink { .. } => "symlink",
        }
    }
}

/// Why a path blocks a planned link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictReason {
    /// A regular file or real directory sits where the link should go
    BlockingNonSymlink,
    /// A symlink exists but resolves somewhere else
    BlockingWrongLink,
    /// An ancestor of the link is a file or a foreign symlink
    BlockingDirectoryMismatch,
}

impl ConflictReason {
    /// Stable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            ConflictReason::BlockingNonSymlink => "blocking-non-symlink",
            ConflictReason::BlockingWrongLink => "blocking-wrong-link",
            ConflictReason::BlockingDirectoryMismatch => "blocking-directory-mismatch",
        }
    }
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A path that must be neutralized before a link can be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    /// Blocking path, relative to the target root
    pub target: PathBuf,
    /// Reason code
    pub reason: ConflictReason,
    /// The planned link this conflict blocks, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec: Option<LinkSpec>,
}

/// What must happen for one [`LinkSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum Disposition {
    /// Already correct
    NoOp,
    /// Nothing in the way; the link just needs creating
    NeedsLink,
    /// Something must be backed up and removed first
    Blocking(Conflict),
}

impl Disposition {
    /// Whether the link is already in place.
    pub fn is_noop(&self) -> bool {
        matches!(self, Disposition::NoOp)
    }

    /// The conflict, if blocking.
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Disposition::Blocking(c) => Some(c),
            _ => None,
        }
    }
}

/// A planned link together with its disposition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Classified {
    /// The planned link
    pub spec: LinkSpec,
    /// Its disposition against the live target tree
    pub disposition: Disposition,
}

/// Where a plan came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanSource {
    /// Parsed from the link manager's dry-run
    Primary,
    /// Walked from the package tree because the dry-run gave nothing usable
    Fallback,
}

impl fmt::Display for PlanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanSource::Primary => write!(f, "dry-run"),
            PlanSource::Fallback => write!(f, "tree walk"),
        }
    }
}

/// A verified copy made before a blocking path was removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    /// Absolute path that was removed
    pub original: PathBuf,
    /// Absolute path of the copy
    pub destination: PathBuf,
    /// Timestamp of the run that made the backup
    pub run_timestamp: DateTime<Local>,
    /// Package whose link the path blocked
    pub package: String,
    /// What was copied
    pub kind: NodeKind,
}

/// Final state of one package after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Links applied and verified
    Converged,
    /// Ledger complete and no drift; nothing was touched
    Unchanged,
    /// See the failure and unresolved list
    Failed,
}

impl Outcome {
    /// Whether the package ended in its desired state.
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed)
    }
}

/// Serializable summary of an [`Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    /// Error category
    pub category: ErrorCategory,
    /// Rendered message
    pub message: String,
}

impl From<&Error> for Failure {
    fn from(err: &Error) -> Self {
        Self {
            category: err.category(),
            message: err.to_string(),
        }
    }
}

/// Everything that happened to one package.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    /// Package name
    pub package: String,
    /// Ledger step id for the inputs of this run
    pub step_id: String,
    /// Final outcome
    pub outcome: Outcome,
    /// How the plan was obtained
    pub plan_source: PlanSource,
    /// Planned links with their dispositions before any mutation
    pub links: Vec<Classified>,
    /// Planned targets that were rejected as unsafe
    pub planning_errors: Vec<Failure>,
    /// Verified backups made for this package
    pub backups: Vec<BackupEntry>,
    /// Paths whose backup failed (left in place)
    pub resolution_failures: Vec<Failure>,
    /// Conflicts still blocking after the retry
    pub unresolved: Vec<PathBuf>,
    /// How many times apply was invoked (0..=2)
    pub apply_attempts: u32,
    /// Terminal failure, if any
    pub failure: Option<Failure>,
}

impl PackageReport {
    /// Create an empty report for a package.
    pub fn new(package: &str, step_id: &str, plan_source: PlanSource) -> Self {
        Self {
            package: package.to_string(),
            step_id: step_id.to_string(),
            outcome: Outcome::Failed,
            plan_source,
            links: Vec::new(),
            planning_errors: Vec::new(),
            backups: Vec::new(),
            resolution_failures: Vec::new(),
            unresolved: Vec::new(),
            apply_attempts: 0,
            failure: None,
        }
    }

    /// Mark the report failed with the given error.
    pub fn fail(&mut self, err: &Error) {
        self.outcome = Outcome::Failed;
        if let Error::UnresolvedConflict { conflicts, .. } = err {
            self.unresolved.clone_from(conflicts);
        }
        self.failure = Some(Failure::from(err));
    }

    /// Count links that were not already in place.
    pub fn changed_links(&self) -> usize {
        self.links
            .iter()
            .filter(|c| !c.disposition.is_noop())
            .count()
    }
}

/// Aggregated result of reconciling a set of packages.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Per-package reports in processing order
    pub packages: Vec<PackageReport>,
    /// Backup root used by this run (may not exist if nothing was backed up)
    pub backup_root: PathBuf,
}

impl RunReport {
    /// Whether every package converged or was unchanged.
    pub fn success(&self) -> bool {
        self.packages.iter().all(|p| p.outcome.is_success())
    }

    /// Reports of packages that failed.
    pub fn failed(&self) -> impl Iterator<Item = &PackageReport> {
        self.packages
            .iter()
            .filter(|p| p.outcome == Outcome::Failed)
    }

    /// All backups made during the run.
    pub fn backups(&self) -> impl Iterator<Item = &BackupEntry> {
        self.packages.iter().flat_map(|p| p.backups.iter())
    }

    /// Render the report as pretty JSON.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
