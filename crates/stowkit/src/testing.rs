//! Test doubles for the link manager.

use crate::backend::{Backend, CommandOutput};
use crate::error::{Error, Result};
use crate::planner::{IgnoreRules, Markers};
use crate::types::Package;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

/// Write a file, creating parent directories.
pub fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn ok(output: &str) -> CommandOutput {
    CommandOutput {
        success: true,
        exit_code: Some(0),
        output: output.to_string(),
    }
}

fn failed(output: &str) -> CommandOutput {
    CommandOutput {
        success: false,
        exit_code: Some(1),
        output: output.to_string(),
    }
}

// ============================================================================
// Scripted backend
// ============================================================================

/// Backend replaying canned outputs. Apply responses are consumed in order;
/// once exhausted, apply succeeds with empty output.
pub struct ScriptedBackend {
    dry_run: Option<String>,
    applies: Mutex<VecDeque<CommandOutput>>,
    apply_calls: AtomicU32,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            dry_run: Some(String::new()),
            applies: Mutex::new(VecDeque::new()),
            apply_calls: AtomicU32::new(0),
        }
    }

    pub fn with_dry_run(mut self, output: &str) -> Self {
        self.dry_run = Some(output.to_string());
        self
    }

    pub fn with_dry_run_error(mut self) -> Self {
        self.dry_run = None;
        self
    }

    pub fn then_apply_ok(self, output: &str) -> Self {
        self.applies.lock().unwrap().push_back(ok(output));
        self
    }

    pub fn then_apply_fail(self, output: &str) -> Self {
        self.applies.lock().unwrap().push_back(failed(output));
        self
    }

    pub fn apply_calls(&self) -> u32 {
        self.apply_calls.load(Ordering::SeqCst)
    }
}

impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn dry_run(&self, _package: &Package, _target_root: &Path) -> Result<CommandOutput> {
        self.dry_run
            .as_deref()
            .map(ok)
            .ok_or_else(|| Error::CommandFailed {
                message: "scripted dry-run failure".to_string(),
                stderr: String::new(),
            })
    }

    fn apply(&self, _package: &Package, _target_root: &Path) -> Result<CommandOutput> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .applies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ok("")))
    }
}

// ============================================================================
// Stow emulator
// ============================================================================

/// Backend that behaves like GNU stow on a real directory.
///
/// Directories absent from the target are folded into a single link unless
/// folding is disabled. Any conflict aborts the whole operation without
/// touching the target, like stow does.
pub struct StowEmulator {
    folding: bool,
    markers: Markers,
    apply_calls: AtomicU32,
}

/// A planned stow action: link `rel` to `source`, or create the directory
/// `rel` when `source` is `None`.
struct Action {
    rel: PathBuf,
    source: Option<PathBuf>,
}

impl StowEmulator {
    pub fn new() -> Self {
        Self {
            folding: true,
            markers: Markers::default(),
            apply_calls: AtomicU32::new(0),
        }
    }

    pub fn no_folding(mut self) -> Self {
        self.folding = false;
        self
    }

    pub fn apply_calls(&self) -> u32 {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn compute(&self, package: &Package, target_root: &Path) -> (Vec<Action>, Vec<String>) {
        let mut actions = Vec::new();
        let mut conflicts = Vec::new();
        let rules = self.markers.rules_for(&package.source);
        self.visit(package, &rules, target_root, Path::new(""), &mut actions, &mut conflicts);
        (actions, conflicts)
    }

    fn visit(
        &self,
        package: &Package,
        rules: &IgnoreRules,
        target_root: &Path,
        rel_dir: &Path,
        actions: &mut Vec<Action>,
        conflicts: &mut Vec<String>,
    ) {
        let mut entries: Vec<_> = fs::read_dir(package.source.join(rel_dir))
            .unwrap()
            .map(|e| e.unwrap())
            .collect();
        entries.sort_by_key(fs::DirEntry::file_name);

        for entry in entries {
            let rel = rel_dir.join(entry.file_name());
            if rules.is_ignored(&rel) {
                continue;
            }
            let source = entry.path();
            let source_is_dir = source.is_dir() && !source.is_symlink();
            let target = target_root.join(&rel);

            match fs::symlink_metadata(&target) {
                Err(_) => {
                    if source_is_dir && !self.folding {
                        // stow creates the directory and links inside it
                        actions.push(Action {
                            rel: rel.clone(),
                            source: None,
                        });
                        self.visit(package, rules, target_root, &rel, actions, conflicts);
                    } else {
                        actions.push(Action {
                            rel,
                            source: Some(source),
                        });
                    }
                }
                Ok(meta) if meta.file_type().is_symlink() => {
                    let raw = fs::read_link(&target).unwrap();
                    let resolved = crate::paths::resolve_link_target(&target, &raw);
                    if resolved != source {
                        conflicts.push(format!(
                            "existing target is not owned by stow: {}",
                            rel.display()
                        ));
                    }
                }
                Ok(meta) if meta.is_dir() && source_is_dir => {
                    self.visit(package, rules, target_root, &rel, actions, conflicts);
                }
                Ok(_) => {
                    conflicts.push(format!(
                        "cannot stow {} over existing target {} since neither a link nor a directory and --adopt not specified",
                        source.display(),
                        rel.display()
                    ));
                }
            }
        }
    }

    fn render(actions: &[Action], target_root: &Path) -> String {
        let mut out = String::new();
        for Action { rel, source } in actions {
            let Some(source) = source else {
                out.push_str(&format!("MKDIR: {}\n", rel.display()));
                continue;
            };
            let link = target_root.join(rel);
            let relative = relative_from(link.parent().unwrap(), source);
            out.push_str(&format!("LINK: {} => {}\n", rel.display(), relative.display()));
        }
        out
    }

    fn render_conflicts(package: &Package, conflicts: &[String]) -> String {
        let mut out = format!("WARNING! stowing {} would cause conflicts:\n", package.name);
        for c in conflicts {
            out.push_str(&format!("  * {c}\n"));
        }
        out.push_str("All operations aborted.\n");
        out
    }
}

impl Backend for StowEmulator {
    fn name(&self) -> &str {
        "stow-emulator"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn dry_run(&self, package: &Package, target_root: &Path) -> Result<CommandOutput> {
        let (actions, conflicts) = self.compute(package, target_root);
        if !conflicts.is_empty() {
            return Ok(failed(&Self::render_conflicts(package, &conflicts)));
        }
        Ok(ok(&Self::render(&actions, target_root)))
    }

    fn apply(&self, package: &Package, target_root: &Path) -> Result<CommandOutput> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        let (actions, conflicts) = self.compute(package, target_root);
        if !conflicts.is_empty() {
            return Ok(failed(&Self::render_conflicts(package, &conflicts)));
        }
        for Action { rel, source } in &actions {
            let link = target_root.join(rel);
            let Some(source) = source else {
                fs::create_dir_all(&link)?;
                continue;
            };
            let relative = relative_from(link.parent().unwrap(), source);
            std::os::unix::fs::symlink(relative, &link)?;
        }
        Ok(ok(&Self::render(&actions, target_root)))
    }
}

/// Path from directory `from` to `to`, both absolute.
pub fn relative_from(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from.components().collect();
    let to_components: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for c in &to_components[common..] {
        out.push(c.as_os_str());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_relative_from() {
        assert_eq!(
            relative_from(Path::new("/home/u/.config"), Path::new("/home/u/dotfiles/nvim/.config/nvim")),
            PathBuf::from("../dotfiles/nvim/.config/nvim")
        );
        assert_eq!(
            relative_from(Path::new("/home/u"), Path::new("/home/u/dotfiles/a")),
            PathBuf::from("dotfiles/a")
        );
    }

    #[test]
    fn test_emulator_folds_and_conflicts() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("dotfiles");
        let target = temp.path().join("home");
        write_file(&source.join("nvim/.config/nvim/init.lua"), "--");
        fs::create_dir_all(target.join(".config")).unwrap();
        let pkg = Package::in_root(&source, "nvim");

        let emulator = StowEmulator::new();
        let out = emulator.dry_run(&pkg, &target).unwrap();
        assert!(out.success);
        assert_eq!(
            out.output,
            "LINK: .config/nvim => ../../dotfiles/nvim/.config/nvim\n"
        );

        write_file(&target.join(".config/nvim"), "not a dir");
        let out = emulator.apply(&pkg, &target).unwrap();
        assert!(!out.success);
        assert!(out.output.contains("over existing target .config/nvim since"));
    }

    #[test]
    fn test_emulator_skips_stow_ignored_entries() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("dotfiles");
        let target = temp.path().join("home");
        write_file(&source.join("zsh/.zshrc"), "a");
        write_file(&source.join("zsh/.zshrc~"), "b");
        write_file(&source.join("zsh/README.md"), "docs");
        fs::create_dir_all(&target).unwrap();
        let pkg = Package::in_root(&source, "zsh");

        let out = StowEmulator::new().dry_run(&pkg, &target).unwrap();
        assert_eq!(out.output, "LINK: .zshrc => ../dotfiles/zsh/.zshrc\n");
    }
}
