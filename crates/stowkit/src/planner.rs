//! Desired link set computation.
//!
//! The primary plan comes from the link manager's dry-run. When the dry-run
//! yields no plan lines (for example because it aborted on conflicts) the
//! package tree itself is walked and every file becomes a file link,
//! skipping whatever stow's ignore rules skip.

use crate::backend::Backend;
use crate::diagnostics::Diagnostic;
use crate::error::{Error, Result};
use crate::paths::{normalize, safe_relative};
use crate::types::{EntryKind, LinkSpec, Package, PlanSource};
use regex::Regex;
use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// GNU stow's built-in ignore list, used when neither ignore file exists.
///
/// Patterns without a `/` match an entry's name. Patterns with one match
/// the package-relative path with a leading `/`, so `^/README.*` only
/// covers the package top level.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    "RCS",
    r".+,v",
    "CVS",
    r"\.#.+",
    r"\.cvsignore",
    r"\.svn",
    "_darcs",
    r"\.hg",
    r"\.git",
    r"\.gitignore",
    r"\.gitmodules",
    r".+~",
    r"#.*#",
    r"^/README.*",
    r"^/LICENSE.*",
    r"^/COPYING",
];

/// Package ignore file. Replaces every other pattern source when present.
pub const LOCAL_IGNORE_FILE: &str = ".stow-local-ignore";

/// Per-user ignore file, looked up in the home directory.
pub const GLOBAL_IGNORE_FILE: &str = ".stow-global-ignore";

/// Names skipped whatever the ignore patterns say.
pub const DEFAULT_MARKERS: &[&str] = &[LOCAL_IGNORE_FILE, ".stowrc", ".DS_Store"];

static DEFAULT_PATTERNS: LazyLock<IgnorePatterns> =
    LazyLock::new(|| IgnorePatterns::compile(DEFAULT_IGNORE_PATTERNS));

/// Compiled stow ignore patterns.
#[derive(Debug, Clone)]
struct IgnorePatterns {
    raw: Vec<String>,
    segment: Option<Regex>,
    path: Option<Regex>,
}

impl IgnorePatterns {
    fn compile<S: AsRef<str>>(patterns: &[S]) -> Self {
        let mut raw = Vec::new();
        let mut segments = Vec::new();
        let mut paths = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            if let Err(e) = Regex::new(pattern) {
                log::warn!("Ignoring invalid ignore pattern '{}': {}", pattern, e);
                continue;
            }
            raw.push(pattern.to_string());
            let group = format!("(?:{pattern})");
            if pattern.contains('/') {
                paths.push(group);
            } else {
                segments.push(group);
            }
        }
        Self {
            raw,
            segment: join_regex(&segments, "^(?:", ")$"),
            path: join_regex(&paths, "(?:^|/)(?:", ")(?:/|$)"),
        }
    }

    fn matches(&self, rel: &Path) -> bool {
        let Some(name) = rel.file_name() else {
            return false;
        };
        if self
            .segment
            .as_ref()
            .is_some_and(|re| re.is_match(&name.to_string_lossy()))
        {
            return true;
        }
        let Some(re) = &self.path else {
            return false;
        };
        let joined: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        re.is_match(&format!("/{}", joined.join("/")))
    }
}

fn join_regex(groups: &[String], open: &str, close: &str) -> Option<Regex> {
    if groups.is_empty() {
        return None;
    }
    let source = format!("{open}{}{close}", groups.join("|"));
    match Regex::new(&source) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Ignore patterns do not combine: {}", e);
            None
        }
    }
}

/// Read an ignore file the way stow does: one regex per line, `#` starts
/// a comment, `\#` is a literal hash. `None` when the file is absent.
fn read_ignore_file(path: &Path) -> Option<Vec<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
        Err(e) => {
            log::warn!("Cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    let patterns = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let line = TRAILING_COMMENT.replace(line, "");
            line.replace(r"\#", "#")
        })
        .collect();
    Some(patterns)
}

static TRAILING_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+#.+$").expect("valid regex"));

/// Exclusion rules for the tree of one package.
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    names: BTreeSet<String>,
    patterns: IgnorePatterns,
}

impl IgnoreRules {
    /// Whether a package-relative path is excluded. An excluded directory
    /// excludes everything below it.
    pub fn is_ignored(&self, rel: &Path) -> bool {
        let named = rel
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| self.names.contains(name));
        named || self.patterns.matches(rel)
    }

    /// Stable text covering every rule, for fingerprints.
    pub fn describe(&self) -> String {
        let names: Vec<&str> = self.names.iter().map(String::as_str).collect();
        format!("{}\n--\n{}", names.join("\n"), self.patterns.raw.join("\n"))
    }
}

/// Reserved names plus where to find stow ignore files.
#[derive(Debug, Clone)]
pub struct Markers {
    names: BTreeSet<String>,
    global_ignore: Option<PathBuf>,
}

impl Default for Markers {
    fn default() -> Self {
        Self {
            names: DEFAULT_MARKERS.iter().map(|s| (*s).to_string()).collect(),
            global_ignore: None,
        }
    }
}

impl Markers {
    /// Default markers plus extra exact names.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut markers = Self::default();
        markers.names.extend(extra.into_iter().map(Into::into));
        markers
    }

    /// Use `path` as the global ignore file.
    pub fn with_global_ignore(mut self, path: impl Into<PathBuf>) -> Self {
        self.global_ignore = Some(path.into());
        self
    }

    /// Rules for the package rooted at `package_dir`.
    ///
    /// Patterns come from the package's `.stow-local-ignore`, else the
    /// global ignore file, else [`DEFAULT_IGNORE_PATTERNS`].
    pub fn rules_for(&self, package_dir: &Path) -> IgnoreRules {
        let patterns = read_ignore_file(&package_dir.join(LOCAL_IGNORE_FILE))
            .or_else(|| self.global_ignore.as_deref().and_then(read_ignore_file))
            .map_or_else(|| DEFAULT_PATTERNS.clone(), |p| IgnorePatterns::compile(p.as_slice()));
        IgnoreRules {
            names: self.names.clone(),
            patterns,
        }
    }

    /// Whether a top-level entry name is reserved under the default rules.
    pub fn is_marker(&self, name: &OsStr) -> bool {
        let name = Path::new(name);
        name.to_str().is_some_and(|n| self.names.contains(n)) || DEFAULT_PATTERNS.matches(name)
    }
}

/// Desired link set for one package.
#[derive(Debug)]
pub struct Plan {
    /// Where the plan came from
    pub source: PlanSource,
    /// Links sorted by target, one per target
    pub specs: Vec<LinkSpec>,
    /// Planned targets rejected as unsafe
    pub errors: Vec<Error>,
}

/// Computes the ordered [`LinkSpec`] sequence for a package.
pub struct Planner<'a> {
    backend: &'a dyn Backend,
    target_root: &'a Path,
    markers: &'a Markers,
}

impl<'a> Planner<'a> {
    /// Create a planner for `target_root`.
    pub fn new(backend: &'a dyn Backend, target_root: &'a Path, markers: &'a Markers) -> Self {
        Self {
            backend,
            target_root,
            markers,
        }
    }

    /// Plan `package`.
    ///
    /// Fails only when the package source directory is missing. Unsafe
    /// targets are collected in [`Plan::errors`] and skipped.
    pub fn plan(&self, package: &Package) -> Result<Plan> {
        if !package.source.is_dir() {
            return Err(Error::PackageNotFound {
                name: package.name.clone(),
                path: package.source.clone(),
            });
        }

        let mut plan = match self.backend.dry_run(package, self.target_root) {
            Ok(output) => self.from_dry_run(&output.output),
            Err(e) => {
                log::warn!("Dry-run for {} failed: {}", package.name, e);
                Plan {
                    source: PlanSource::Primary,
                    specs: Vec::new(),
                    errors: Vec::new(),
                }
            }
        };

        if plan.specs.is_empty() && plan.errors.is_empty() {
            log::debug!(
                "No plan lines from {} for {}, walking package tree",
                self.backend.name(),
                package.name
            );
            plan = self.walk(package);
        }

        plan.specs.sort_by(|a, b| a.target.cmp(&b.target));
        plan.specs.dedup_by(|a, b| a.target == b.target);
        log::debug!(
            "Planned {} link(s) for {} from {}",
            plan.specs.len(),
            package.name,
            plan.source
        );
        Ok(plan)
    }

    /// Parse dry-run output into a plan.
    fn from_dry_run(&self, output: &str) -> Plan {
        let mut specs = Vec::new();
        let mut errors = Vec::new();

        for diagnostic in crate::diagnostics::parse_output(output) {
            let Diagnostic::PlanLink { target, source } = diagnostic else {
                continue;
            };
            let rel = match safe_relative(Path::new(&target)) {
                Ok(rel) => rel,
                Err(reason) => {
                    log::warn!("Skipping planned target '{}': {}", target, reason);
                    errors.push(Error::Planning {
                        target,
                        reason: reason.to_string(),
                    });
                    continue;
                }
            };

            let link = self.target_root.join(&rel);
            let source = Path::new(&source);
            let source = if source.is_absolute() {
                normalize(source)
            } else {
                let parent = link.parent().unwrap_or(self.target_root);
                normalize(&parent.join(source))
            };
            let kind = if source.is_dir() {
                EntryKind::DirectoryLink
            } else {
                EntryKind::FileLink
            };
            specs.push(LinkSpec {
                target: rel,
                source,
                kind,
            });
        }

        Plan {
            source: PlanSource::Primary,
            specs,
            errors,
        }
    }

    /// Walk the package tree into file-level links.
    fn walk(&self, package: &Package) -> Plan {
        let mut specs = Vec::new();
        let rules = self.markers.rules_for(&package.source);
        let walker = WalkDir::new(&package.source)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                !e.path()
                    .strip_prefix(&package.source)
                    .is_ok_and(|rel| rules.is_ignored(rel))
            });

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    log::warn!("Skipping unreadable entry in {}: {}", package.name, e);
                    continue;
                }
            };
            let file_type = entry.file_type();
            if !(file_type.is_file() || file_type.is_symlink()) {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&package.source) else {
                continue;
            };
            specs.push(LinkSpec::file(rel, entry.path()));
        }

        Plan {
            source: PlanSource::Fallback,
            specs,
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedBackend, write_file};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("dotfiles");
        let target = temp.path().join("home");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(&target).unwrap();
        (temp, source, target)
    }

    // ── markers ─────────────────────────────────────────────────────

    #[test]
    fn test_markers() {
        let markers = Markers::with_extra(["scripts"]);
        assert!(markers.is_marker(OsStr::new(".git")));
        assert!(markers.is_marker(OsStr::new("README.md")));
        assert!(markers.is_marker(OsStr::new("LICENSE")));
        assert!(markers.is_marker(OsStr::new("scripts")));
        assert!(!markers.is_marker(OsStr::new(".zshrc")));
        assert!(!markers.is_marker(OsStr::new(".config")));
    }

    #[test]
    fn test_default_rules_follow_stow() {
        let (_temp, source, _target) = setup();
        let rules = Markers::default().rules_for(&source.join("zsh"));
        for ignored in [
            ".zshrc~",
            ".config/nvim/init.lua~",
            "#scratch#",
            ".#lock",
            "RCS",
            "notes,v",
            ".git",
            ".config/plugin/.gitignore",
            "README.md",
            "LICENSE-MIT",
            "COPYING",
            ".stow-local-ignore",
        ] {
            assert!(rules.is_ignored(Path::new(ignored)), "{ignored} should be ignored");
        }
        for linked in [
            ".zshrc",
            "~backup",
            ".config/nvim/README.md",
            ".config/tool/LICENSE",
            "docs/COPYING",
            ".github",
        ] {
            assert!(!rules.is_ignored(Path::new(linked)), "{linked} should be linked");
        }
    }

    #[test]
    fn test_local_ignore_file_replaces_defaults() {
        let (_temp, source, _target) = setup();
        write_file(
            &source.join("zsh/.stow-local-ignore"),
            "# local rules\n\\.zsh_history  # shell history\n^/notes/.*\n\n\\#pinned\n",
        );
        let global = source.join("global-ignore");
        write_file(&global, "\\.zshrc\n");
        let rules = Markers::default()
            .with_global_ignore(&global)
            .rules_for(&source.join("zsh"));

        assert!(rules.is_ignored(Path::new(".zsh_history")));
        assert!(rules.is_ignored(Path::new("notes/todo.md")));
        assert!(rules.is_ignored(Path::new("#pinned")));
        assert!(!rules.is_ignored(Path::new(".config/notes/todo.md")));
        // defaults and the global file no longer apply
        assert!(!rules.is_ignored(Path::new(".zshrc~")));
        assert!(!rules.is_ignored(Path::new("README.md")));
        assert!(!rules.is_ignored(Path::new(".zshrc")));
    }

    #[test]
    fn test_global_ignore_file_replaces_defaults() {
        let (_temp, source, _target) = setup();
        let global = source.join("global-ignore");
        write_file(&global, "\\.zsh_history\n(unclosed\n");
        let rules = Markers::default()
            .with_global_ignore(&global)
            .rules_for(&source.join("zsh"));

        assert!(rules.is_ignored(Path::new(".zsh_history")));
        assert!(!rules.is_ignored(Path::new(".zshrc~")));
        assert!(!rules.is_ignored(Path::new("(unclosed")));

        let missing = Markers::default()
            .with_global_ignore(source.join("absent"))
            .rules_for(&source.join("zsh"));
        assert!(missing.is_ignored(Path::new(".zshrc~")));
    }

    // ── primary path ────────────────────────────────────────────────

    #[test]
    fn test_primary_plan_resolves_relative_sources() {
        let (_temp, source, target) = setup();
        write_file(&source.join("nvim/.config/nvim/init.lua"), "-- init");
        write_file(&source.join("nvim/.vimrc"), "set nu");

        let backend = ScriptedBackend::new().with_dry_run(
            "LINK: .vimrc => ../dotfiles/nvim/.vimrc\n\
             LINK: .config/nvim => ../../dotfiles/nvim/.config/nvim\n",
        );
        let markers = Markers::default();
        let planner = Planner::new(&backend, &target, &markers);
        let plan = planner
            .plan(&Package::in_root(&source, "nvim"))
            .unwrap();

        assert_eq!(plan.source, PlanSource::Primary);
        assert_eq!(
            plan.specs,
            vec![
                LinkSpec::directory(".config/nvim", source.join("nvim/.config/nvim")),
                LinkSpec::file(".vimrc", source.join("nvim/.vimrc")),
            ]
        );
    }

    #[test]
    fn test_primary_plan_rejects_unsafe_targets() {
        let (_temp, source, target) = setup();
        write_file(&source.join("evil/.zshrc"), "x");

        let backend = ScriptedBackend::new().with_dry_run(
            "LINK: ../outside => evil/x\n\
             LINK: /etc/passwd => evil/x\n\
             LINK: .zshrc => ../dotfiles/evil/.zshrc\n",
        );
        let markers = Markers::default();
        let plan = Planner::new(&backend, &target, &markers)
            .plan(&Package::in_root(&source, "evil"))
            .unwrap();

        assert_eq!(plan.specs.len(), 1);
        assert_eq!(plan.specs[0].target, PathBuf::from(".zshrc"));
        assert_eq!(plan.errors.len(), 2);
        assert!(plan.errors.iter().all(|e| matches!(e, Error::Planning { .. })));
    }

    #[test]
    fn test_primary_plan_dedups_targets() {
        let (_temp, source, target) = setup();
        write_file(&source.join("a/.x"), "x");

        let backend = ScriptedBackend::new().with_dry_run(
            "LINK: .x => ../dotfiles/a/.x\nLINK: .x => ../dotfiles/a/.x\n",
        );
        let markers = Markers::default();
        let plan = Planner::new(&backend, &target, &markers)
            .plan(&Package::in_root(&source, "a"))
            .unwrap();
        assert_eq!(plan.specs.len(), 1);
    }

    // ── fallback path ───────────────────────────────────────────────

    #[test]
    fn test_fallback_walks_package_tree() {
        let (_temp, source, target) = setup();
        write_file(&source.join("zsh/.zshrc"), "export A=1");
        write_file(&source.join("zsh/.zshrc~"), "export A=0");
        write_file(&source.join("zsh/.config/zsh/init.zsh"), "# init");
        write_file(&source.join("zsh/.config/zsh/README.md"), "nested docs");
        write_file(&source.join("zsh/README.md"), "docs");
        write_file(&source.join("zsh/.git/HEAD"), "ref");

        let backend = ScriptedBackend::new().with_dry_run(
            "WARNING! stowing zsh would cause conflicts:\n\
             \x20 * existing target is not owned by stow: .zshrc\n\
             All operations aborted.\n",
        );
        let markers = Markers::default();
        let plan = Planner::new(&backend, &target, &markers)
            .plan(&Package::in_root(&source, "zsh"))
            .unwrap();

        assert_eq!(plan.source, PlanSource::Fallback);
        assert_eq!(
            plan.specs,
            vec![
                LinkSpec::file(
                    ".config/zsh/README.md",
                    source.join("zsh/.config/zsh/README.md")
                ),
                LinkSpec::file(".config/zsh/init.zsh", source.join("zsh/.config/zsh/init.zsh")),
                LinkSpec::file(".zshrc", source.join("zsh/.zshrc")),
            ]
        );
    }

    #[test]
    fn test_fallback_honors_local_ignore_file() {
        let (_temp, source, target) = setup();
        write_file(&source.join("zsh/.zshrc"), "export A=1");
        write_file(&source.join("zsh/.zshrc~"), "export A=0");
        write_file(&source.join("zsh/local/secrets"), "token");
        write_file(&source.join("zsh/.stow-local-ignore"), "^/local\n");

        let backend = ScriptedBackend::new().with_dry_run("");
        let markers = Markers::default();
        let plan = Planner::new(&backend, &target, &markers)
            .plan(&Package::in_root(&source, "zsh"))
            .unwrap();

        let targets: Vec<_> = plan.specs.iter().map(|s| s.target.clone()).collect();
        assert_eq!(targets, vec![PathBuf::from(".zshrc"), PathBuf::from(".zshrc~")]);
    }

    #[test]
    fn test_fallback_when_dry_run_cannot_spawn() {
        let (_temp, source, target) = setup();
        write_file(&source.join("git/.gitconfig"), "[user]");

        let backend = ScriptedBackend::new().with_dry_run_error();
        let markers = Markers::with_extra([".gitconfig"]);
        let plan = Planner::new(&backend, &target, &markers)
            .plan(&Package::in_root(&source, "git"))
            .unwrap();
        assert_eq!(plan.source, PlanSource::Fallback);
        assert!(plan.specs.is_empty());
    }

    #[test]
    fn test_missing_package() {
        let (_temp, source, target) = setup();
        let backend = ScriptedBackend::new();
        let markers = Markers::default();
        let err = Planner::new(&backend, &target, &markers)
            .plan(&Package::in_root(&source, "ghost"))
            .unwrap_err();
        assert!(matches!(err, Error::PackageNotFound { .. }));
    }
}
