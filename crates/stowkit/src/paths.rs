//! Lexical path helpers.
//!
//! Nothing here touches the filesystem. These helpers guard every mutation:
//! a target that is absolute or climbs with `..` never reaches the resolver.

use std::path::{Component, Path, PathBuf};

/// Validate a planned target and return it in normalized relative form.
///
/// Rejects absolute paths, any `..` component and paths that are empty
/// after dropping `.` components.
pub fn safe_relative(path: &Path) -> Result<PathBuf, &'static str> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err("contains a '..' component"),
            Component::RootDir | Component::Prefix(_) => return Err("is absolute"),
        }
    }
    if out.as_os_str().is_empty() {
        return Err("is empty");
    }
    Ok(out)
}

/// Express `path` relative to `root`, requiring it to lie strictly beneath.
///
/// Both paths are normalized lexically first. Returns `None` for the root
/// itself and for anything outside it.
pub fn relative_to_root(root: &Path, path: &Path) -> Option<PathBuf> {
    let root = normalize(root);
    let path = if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    };
    let rel = path.strip_prefix(&root).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(rel.to_path_buf())
}

/// Lexically normalize a path: drop `.`, fold `..` into its parent.
///
/// A `..` at the root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let after_parent = matches!(out.components().next_back(), Some(Component::ParentDir));
                if after_parent || (!out.pop() && !path.is_absolute()) {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve a raw symlink target against the directory containing the link.
pub fn resolve_link_target(link: &Path, raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        normalize(raw)
    } else {
        let parent = link.parent().unwrap_or(Path::new("/"));
        normalize(&parent.join(raw))
    }
}

/// Ancestors of a relative path, shallowest first, excluding the path itself.
///
/// `a/b/c` yields `a`, `a/b`.
pub fn ancestors_of(rel: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = rel
        .ancestors()
        .skip(1)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();
    out.reverse();
    out
}
