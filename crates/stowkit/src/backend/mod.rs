//! Backend abstraction for the underlying link manager.
//!
//! The [`Backend`] trait defines the two operations the engine needs from a
//! link manager: a side-effect-free dry-run and the real apply. Both report
//! combined output so the diagnostics parser sees every line.

pub mod stow;

use crate::error::Result;
use crate::types::Package;
use std::path::Path;

/// Captured result of one link manager invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Whether the process exited successfully
    pub success: bool,
    /// Exit code, if the process exited normally
    pub exit_code: Option<i32>,
    /// Standard output followed by standard error
    pub output: String,
}

impl CommandOutput {
    /// Build from a finished process.
    pub fn from_process(output: &std::process::Output) -> Self {
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() && !combined.ends_with('\n') {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }
        Self {
            success: output.status.success(),
            exit_code: output.status.code(),
            output: combined,
        }
    }
}

/// Backend trait for link manager operations.
///
/// This trait abstracts the underlying link manager, enabling:
/// - Real CLI execution via `stow`
/// - Scripted implementations for testing
pub trait Backend: Send + Sync {
    /// Human-readable name of the link manager.
    fn name(&self) -> &str;

    /// Check if the link manager can be executed.
    fn is_available(&self) -> bool;

    /// Compute the link set for `package` without touching the target tree.
    fn dry_run(&self, package: &Package, target_root: &Path) -> Result<CommandOutput>;

    /// Materialize the link set for `package` under `target_root`.
    fn apply(&self, package: &Package, target_root: &Path) -> Result<CommandOutput>;
}

/// Get the default backend (real stow CLI).
pub fn default_backend(binary: &str) -> Result<stow::StowBackend> {
    stow::StowBackend::new(binary)
}
