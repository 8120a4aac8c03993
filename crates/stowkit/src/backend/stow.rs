//! GNU stow backend.

use crate::backend::{Backend, CommandOutput};
use crate::error::{Error, Result};
use crate::types::Package;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

/// Backend that executes real `stow` commands.
#[derive(Debug, Clone)]
pub struct StowBackend {
    /// Path to the stow executable
    stow_path: String,
}

impl StowBackend {
    /// Create a new StowBackend for `binary` (a name on PATH or a path).
    ///
    /// Returns an error if the binary cannot be found.
    pub fn new(binary: &str) -> Result<Self> {
        let stow_path = find_stow(binary)?;
        Ok(Self { stow_path })
    }

    /// Path of the executable this backend runs.
    pub fn path(&self) -> &str {
        &self.stow_path
    }

    fn args<'a>(package: &'a Package, target_root: &'a Path, simulate: bool) -> Vec<&'a OsStr> {
        let mut args = Vec::with_capacity(8);
        if simulate {
            args.push(OsStr::new("--no"));
        }
        args.extend([
            OsStr::new("-v"),
            OsStr::new("--dir"),
            package.root().as_os_str(),
            OsStr::new("--target"),
            target_root.as_os_str(),
            OsStr::new(&package.name),
        ]);
        args
    }

    /// Run stow and capture combined output.
    fn run_stow(
        &self,
        package: &Package,
        target_root: &Path,
        simulate: bool,
    ) -> Result<CommandOutput> {
        let args = Self::args(package, target_root, simulate);
        log::debug!("Running {} {:?}", self.stow_path, args);
        let output = Command::new(&self.stow_path)
            .args(&args)
            .output()
            .map_err(|e| Error::CommandFailed {
                message: format!("failed to execute {}: {}", self.stow_path, e),
                stderr: String::new(),
            })?;
        Ok(CommandOutput::from_process(&output))
    }
}

impl Backend for StowBackend {
    fn name(&self) -> &str {
        "stow"
    }

    fn is_available(&self) -> bool {
        Command::new(&self.stow_path)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn dry_run(&self, package: &Package, target_root: &Path) -> Result<CommandOutput> {
        self.run_stow(package, target_root, true)
    }

    fn apply(&self, package: &Package, target_root: &Path) -> Result<CommandOutput> {
        self.run_stow(package, target_root, false)
    }
}

/// Find the stow executable.
fn find_stow(binary: &str) -> Result<String> {
    let not_found = || Error::BackendNotFound {
        binary: binary.to_string(),
    };

    if binary.contains('/') {
        return if Path::new(binary).is_file() {
            Ok(binary.to_string())
        } else {
            Err(not_found())
        };
    }

    // Try which
    let output = Command::new("which")
        .arg(binary)
        .output()
        .map_err(|_| not_found())?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(path);
        }
    }

    Err(not_found())
}
