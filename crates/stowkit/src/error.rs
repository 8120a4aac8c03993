//! Error types for reconciliation.
//!
//! Failures are scoped to a single package and aggregated into its report.
//! Only a missing link manager is fatal to a whole run, and it is detected
//! before any package is touched.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    /// A planned link was unsafe or malformed, or the package is missing
    Planning,
    /// A blocking path could not be backed up (nothing was deleted)
    Backup,
    /// The link manager failed without recognizable conflict diagnostics
    Apply,
    /// Conflicts survived the single retry
    Unresolved,
    /// The link manager itself is not installed
    Prerequisite,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error aborts the run before any package is processed.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Self::Prerequisite)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Planning => "Unsafe or malformed plan",
            Self::Backup => "Backup failed",
            Self::Apply => "Link manager failed",
            Self::Unresolved => "Unresolved conflict",
            Self::Prerequisite => "Link manager not installed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Planning => "Check the package layout for absolute or '..' paths",
            Self::Backup => "Check free space and permissions of the backup directory",
            Self::Apply => "Inspect the captured link manager output above",
            Self::Unresolved => "Move the conflicting paths aside manually and re-run",
            Self::Prerequisite => "Install GNU stow and make sure it is on PATH",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors that can occur while reconciling a package.
#[derive(Debug, Error)]
pub enum Error {
    /// A planned target is absolute or traverses outside the target root
    #[error("unsafe planned target '{target}': {reason}")]
    Planning {
        /// Target exactly as emitted by the planner
        target: String,
        /// Why it was rejected
        reason: String,
    },

    /// The package source directory does not exist
    #[error("package '{name}' not found at {}", .path.display())]
    PackageNotFound {
        /// Package name
        name: String,
        /// Expected source directory
        path: PathBuf,
    },

    /// The resolver refused to touch a path outside the target root
    #[error("refusing to touch {}: {reason}", .path.display())]
    UnsafePath {
        /// Offending path
        path: PathBuf,
        /// Why it was refused
        reason: String,
    },

    /// The pre-removal copy could not be completed or verified
    #[error("backup of {} failed: {message}", .path.display())]
    Backup {
        /// Path that was being backed up
        path: PathBuf,
        /// What went wrong
        message: String,
    },

    /// The apply call failed without conflict diagnostics
    #[error("apply failed for package '{package}'{}", exit_suffix(.exit_code))]
    Apply {
        /// Package name
        package: String,
        /// Exit code, if the process exited normally
        exit_code: Option<i32>,
        /// Full captured output
        output: String,
    },

    /// Conflicts remained after the bounded retry
    #[error("package '{package}' has {} unresolved conflict(s) after retry", .conflicts.len())]
    UnresolvedConflict {
        /// Package name
        package: String,
        /// Conflicting target paths, relative to the target root
        conflicts: Vec<PathBuf>,
    },

    /// The link manager binary could not be found
    #[error("link manager not found: {binary}")]
    BackendNotFound {
        /// Binary name or path that was looked up
        binary: String,
    },

    /// A command could not be executed
    #[error("command failed: {message}")]
    CommandFailed {
        /// Description of what command failed
        message: String,
        /// Standard error output, if any
        stderr: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

fn exit_suffix(code: &Option<i32>) -> String {
    code.map(|c| format!(" (exit {c})")).unwrap_or_default()
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Planning { .. } | Error::PackageNotFound { .. } => ErrorCategory::Planning,
            Error::UnsafePath { .. } | Error::Backup { .. } => ErrorCategory::Backup,
            Error::Apply { .. } => ErrorCategory::Apply,
            Error::UnresolvedConflict { .. } => ErrorCategory::Unresolved,
            Error::BackendNotFound { .. } => ErrorCategory::Prerequisite,
            _ => ErrorCategory::Other,
        }
    }

    /// Whether this error aborts the whole run.
    pub fn is_run_fatal(&self) -> bool {
        self.category().is_run_fatal()
    }

    pub(crate) fn backup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Backup {
            path: path.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unsafe_path(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::UnsafePath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;
