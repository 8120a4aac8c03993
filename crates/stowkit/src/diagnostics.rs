//! Parser for link manager output.
//!
//! Dry-run plan lines and apply-time conflict markers go through one parser
//! producing a tagged [`Diagnostic`]. Leading `*`, `WARNING!` and `stow:`
//! decorations are tolerated; anything unrecognized is ignored.

use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

static PLAN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*LINK:\s+(\S+)\s+=>\s+(.+)$").expect("valid regex"));

static CANNOT_APPLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"cannot (?:stow|apply)\s+(.+?)\s+over existing target\s+(.+?)\s+since\s*(.*)$")
        .expect("valid regex")
});

// Older stow releases report the same condition without naming the source.
static NEITHER_LINK_NOR_DIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"existing target is neither a link nor a directory:\s*(.+?)\s*$")
        .expect("valid regex")
});

static NOT_OWNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"existing target is not owned by (?:stow|this tool):\s*(.+?)\s*$")
        .expect("valid regex")
});

static DIFFERENT_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"existing target (?:is stowed to|belongs to) a different package:\s*(.+?)\s+=>\s*(.*)$",
    )
    .expect("valid regex")
});

/// Annotation stow appends when a link undoes an earlier planned unlink.
const REVERTS_SUFFIX: &str = "(reverts previous action)";

/// One recognized line of link manager output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// Dry-run plan entry: `target` should link to `source`
    PlanLink {
        /// Link path as printed (relative to the target root)
        target: String,
        /// Link destination as printed (often relative to the link's parent)
        source: String,
    },
    /// `cannot stow X over existing target T since ...`
    CannotApply {
        /// Package item that could not be linked, when reported
        source: Option<String>,
        /// Blocking target
        target: String,
        /// Free-form reason
        reason: String,
    },
    /// `existing target is not owned by stow: T`
    NotOwned {
        /// Blocking target
        target: String,
    },
    /// `existing target is stowed to a different package: T => ...`
    DifferentPackage {
        /// Blocking target
        target: String,
        /// Where the existing link points
        owner: String,
    },
}

impl Diagnostic {
    /// Parse a single output line.
    pub fn parse(line: &str) -> Option<Self> {
        if let Some(caps) = PLAN_LINK.captures(line) {
            let source = caps[2].trim();
            let source = source
                .strip_suffix(REVERTS_SUFFIX)
                .map_or(source, str::trim_end);
            return Some(Diagnostic::PlanLink {
                target: caps[1].trim().to_string(),
                source: source.to_string(),
            });
        }
        if let Some(caps) = CANNOT_APPLY.captures(line) {
            return Some(Diagnostic::CannotApply {
                source: Some(caps[1].trim().to_string()),
                target: caps[2].trim().to_string(),
                reason: caps[3].trim().to_string(),
            });
        }
        if let Some(caps) = NEITHER_LINK_NOR_DIR.captures(line) {
            return Some(Diagnostic::CannotApply {
                source: None,
                target: caps[1].trim().to_string(),
                reason: "neither a link nor a directory".to_string(),
            });
        }
        if let Some(caps) = NOT_OWNED.captures(line) {
            return Some(Diagnostic::NotOwned {
                target: caps[1].trim().to_string(),
            });
        }
        if let Some(caps) = DIFFERENT_PACKAGE.captures(line) {
            return Some(Diagnostic::DifferentPackage {
                target: caps[1].trim().to_string(),
                owner: caps[2].trim().to_string(),
            });
        }
        None
    }

    /// Blocking target named by a conflict marker.
    pub fn conflict_target(&self) -> Option<PathBuf> {
        match self {
            Diagnostic::PlanLink { .. } => None,
            Diagnostic::CannotApply { target, .. }
            | Diagnostic::NotOwned { target }
            | Diagnostic::DifferentPackage { target, .. } => Some(PathBuf::from(target)),
        }
    }

    /// Whether this line is a conflict marker.
    pub fn is_conflict(&self) -> bool {
        !matches!(self, Diagnostic::PlanLink { .. })
    }
}

/// Parse every recognized line of `output`, in order.
pub fn parse_output(output: &str) -> Vec<Diagnostic> {
    output.lines().filter_map(Diagnostic::parse).collect()
}

/// Conflict targets named in `output`, deduplicated, in first-seen order.
pub fn conflict_targets(output: &str) -> Vec<PathBuf> {
    let mut seen = Vec::new();
    for target in parse_output(output)
        .iter()
        .filter_map(Diagnostic::conflict_target)
    {
        if !seen.contains(&target) {
            seen.push(target);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_link_line() {
        let d = Diagnostic::parse("LINK: .zshrc => dotfiles/zsh/.zshrc").unwrap();
        assert_eq!(
            d,
            Diagnostic::PlanLink {
                target: ".zshrc".to_string(),
                source: "dotfiles/zsh/.zshrc".to_string(),
            }
        );
        assert!(!d.is_conflict());
        assert_eq!(d.conflict_target(), None);
    }

    #[test]
    fn test_plan_link_strips_revert_annotation() {
        let d = Diagnostic::parse(
            "  LINK: .config/nvim/init.lua => ../../dotfiles/nvim/.config/nvim/init.lua (reverts previous action)",
        )
        .unwrap();
        assert_eq!(
            d,
            Diagnostic::PlanLink {
                target: ".config/nvim/init.lua".to_string(),
                source: "../../dotfiles/nvim/.config/nvim/init.lua".to_string(),
            }
        );
    }

    #[test]
    fn test_cannot_apply_shapes() {
        let stow = Diagnostic::parse(
            "  * cannot stow dotfiles/zsh/.zshrc over existing target .zshrc since neither a link nor a directory and --adopt not specified",
        )
        .unwrap();
        assert_eq!(stow.conflict_target(), Some(PathBuf::from(".zshrc")));
        if let Diagnostic::CannotApply { source, reason, .. } = &stow {
            assert_eq!(source.as_deref(), Some("dotfiles/zsh/.zshrc"));
            assert!(reason.starts_with("neither a link"));
        } else {
            panic!("expected CannotApply, got {stow:?}");
        }

        let generic =
            Diagnostic::parse("WARNING! cannot apply a/b over existing target .b since busy")
                .unwrap();
        assert_eq!(generic.conflict_target(), Some(PathBuf::from(".b")));

        let old = Diagnostic::parse("  * existing target is neither a link nor a directory: .bashrc")
            .unwrap();
        assert_eq!(old.conflict_target(), Some(PathBuf::from(".bashrc")));
    }

    #[test]
    fn test_not_owned_shapes() {
        for line in [
            "  * existing target is not owned by stow: .config/git/config",
            "stow: existing target is not owned by this tool: .config/git/config  ",
        ] {
            let d = Diagnostic::parse(line).unwrap();
            assert!(d.is_conflict());
            assert_eq!(
                d.conflict_target(),
                Some(PathBuf::from(".config/git/config"))
            );
        }
    }

    #[test]
    fn test_different_package_shapes() {
        let d = Diagnostic::parse(
            "  * existing target is stowed to a different package: .vimrc => other/.vimrc",
        )
        .unwrap();
        assert_eq!(
            d,
            Diagnostic::DifferentPackage {
                target: ".vimrc".to_string(),
                owner: "other/.vimrc".to_string(),
            }
        );

        let d = Diagnostic::parse("existing target belongs to a different package: .x => y").unwrap();
        assert_eq!(d.conflict_target(), Some(PathBuf::from(".x")));
    }

    #[test]
    fn test_unrecognized_lines_ignored() {
        assert_eq!(Diagnostic::parse(""), None);
        assert_eq!(
            Diagnostic::parse("WARNING: in simulation mode so not modifying filesystem."),
            None
        );
        assert_eq!(Diagnostic::parse("MKDIR: .config/nvim"), None);
        assert_eq!(
            Diagnostic::parse("All operations aborted."),
            None
        );
    }

    #[test]
    fn test_conflict_targets_dedup() {
        let output = "\
WARNING! stowing zsh would cause conflicts:
  * cannot stow zsh/.zshrc over existing target .zshrc since neither a link nor a directory
  * existing target is not owned by stow: .zshrc
  * existing target is not owned by stow: .zprofile
All operations aborted.
";
        assert_eq!(
            conflict_targets(output),
            vec![PathBuf::from(".zshrc"), PathBuf::from(".zprofile")]
        );
        assert_eq!(parse_output(output).len(), 3);
    }
}
