// src/watch/path_utils.rs

//! Path handling for watcher events.
//!
//! Notification backends are not consistent about what they report: some
//! hand out absolute paths, some relative ones, and occasionally a path that
//! lies outside the registered root. Everything that reaches the dispatcher
//! goes through [`normalize`] first.

use std::fmt;
use std::path::{Component, Path, PathBuf};

/// The event path does not lie under the watched root. Callers drop the
/// event silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unrelated {
    pub path: PathBuf,
}

impl fmt::Display for Unrelated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path {:?} is outside the watched root", self.path)
    }
}

impl std::error::Error for Unrelated {}

/// Absolute, lexically clean form of `path`.
///
/// Relative paths are joined onto the current working directory. No
/// filesystem access beyond `current_dir` happens here, so this works for
/// paths that were just deleted.
pub fn absolute(path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("/"))
            .join(path)
    };
    clean(&joined)
}

/// Resolve `.` and `..` components without touching the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                // `..` at the root stays at the root.
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Longest shared component prefix of two absolute paths.
fn common_prefix(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x.as_os_str())
        .collect()
}

/// Map an event path onto a `./`-prefixed path relative to `root`.
///
/// `root` must already be absolute (see [`crate::types::WatchedRoot`]). The
/// root itself maps to `"."`.
pub fn normalize(event_path: &Path, root: &Path) -> Result<String, Unrelated> {
    let abs = absolute(event_path);
    let common = common_prefix(root, &abs);

    // The root has to reduce to "." relative to the common prefix, i.e. the
    // prefix is the whole root.
    if common.as_os_str().is_empty() || common != root {
        return Err(Unrelated { path: abs });
    }

    let rel = abs
        .strip_prefix(&common)
        .map_err(|_| Unrelated { path: abs.clone() })?;

    if rel.as_os_str().is_empty() {
        return Ok(".".to_string());
    }

    let rel = rel.to_string_lossy().replace('\\', "/");
    Ok(format!("./{rel}"))
}

/// Strip the leading `./` from a normalized path, for console output and
/// command arguments.
pub fn display_path(rel: &str) -> &str {
    rel.strip_prefix("./").unwrap_or(rel)
}

/// True when `child` is `parent` or lies below it (lexically).
pub fn is_within(parent: &Path, child: &Path) -> bool {
    let parent = clean(parent);
    let child = clean(child);
    child.starts_with(&parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_inside_root() {
        let rel = normalize(Path::new("/a/b/c/d.txt"), Path::new("/a/b")).unwrap();
        assert_eq!(rel, "./c/d.txt");
    }

    #[test]
    fn normalize_outside_root_is_unrelated() {
        let err = normalize(Path::new("/a/other/x.txt"), Path::new("/a/b")).unwrap_err();
        assert_eq!(err.path, PathBuf::from("/a/other/x.txt"));
    }

    #[test]
    fn normalize_sibling_with_shared_name_prefix_is_unrelated() {
        // "/a/bc" shares a string prefix with "/a/b" but not a component prefix.
        assert!(normalize(Path::new("/a/bc/x.txt"), Path::new("/a/b")).is_err());
    }

    #[test]
    fn normalize_resolves_dot_segments() {
        let rel = normalize(Path::new("/a/b/./c/../d.txt"), Path::new("/a/b")).unwrap();
        assert_eq!(rel, "./d.txt");
        assert!(normalize(Path::new("/a/b/../x.txt"), Path::new("/a/b")).is_err());
    }

    #[test]
    fn normalize_root_itself() {
        assert_eq!(normalize(Path::new("/a/b"), Path::new("/a/b")).unwrap(), ".");
    }

    #[test]
    fn normalize_relative_event_path_uses_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let rel = normalize(Path::new("src/lib.rs"), &clean(&cwd)).unwrap();
        assert_eq!(rel, "./src/lib.rs");
    }

    #[test]
    fn clean_keeps_root_on_excess_parent_dirs() {
        assert_eq!(clean(Path::new("/../x")), PathBuf::from("/x"));
        assert_eq!(clean(Path::new("a/../../b")), PathBuf::from("../b"));
    }

    #[test]
    fn within_checks_components() {
        assert!(is_within(Path::new("/a/b"), Path::new("/a/b/c")));
        assert!(is_within(Path::new("/a/b"), Path::new("/a/b")));
        assert!(!is_within(Path::new("/a/b"), Path::new("/a/bc")));
    }
}
