//! # stowkit
//!
//! Pure Rust library for declarative symlink reconciliation on top of GNU
//! stow.
//!
//! This crate provides functionality for:
//! - Planning the link set of a package from a stow dry-run, or from the
//!   package tree when the dry-run yields nothing usable
//! - Classifying each planned link against the live target tree
//! - Backing up and removing blocking paths, never deleting anything
//!   without a verified copy
//! - Applying links with exactly one automatic retry on conflicts
//! - Recording completion in a fingerprinted ledger so unchanged packages
//!   are skipped on later runs
//!
//! ## Example
//!
//! ```no_run
//! use stowkit::{Package, ReconcileOptions, Reconciler};
//! use stowkit::backend::stow::StowBackend;
//! use stowkit::retry::NoCallback;
//! use std::path::Path;
//!
//! let backend = StowBackend::new("stow").expect("stow not installed");
//! let reconciler = Reconciler::new(Box::new(backend), ReconcileOptions::new("/home/me"));
//!
//! let zsh = Package::in_root(Path::new("/home/me/dotfiles"), "zsh");
//! let report = reconciler.reconcile(&[zsh], &NoCallback).expect("run failed");
//! for pkg in &report.packages {
//!     println!("{}: {:?}", pkg.package, pkg.outcome);
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod applier;
pub mod backend;
pub mod classifier;
pub mod diagnostics;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod paths;
pub mod planner;
pub mod probe;
pub mod reconciler;
pub mod resolver;
pub mod retry;
pub mod types;

#[cfg(test)]
mod testing;

pub use error::{Error, ErrorCategory, Result};
pub use fingerprint::StepId;
pub use ledger::{LedgerEntry, RunLedger};
pub use planner::{IgnoreRules, Markers};
pub use reconciler::{Preview, ReconcileOptions, Reconciler};
pub use types::{
    BackupEntry, Classified, Conflict, ConflictReason, Disposition, EntryKind, FsNode, LinkSpec,
    NodeKind, Outcome, Package, PackageReport, PlanSource, RunReport,
};
