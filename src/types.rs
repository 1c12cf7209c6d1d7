// src/types.rs

//! Shared value types: change events and watched roots.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What the notification layer says happened to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
    Moved,
}

/// Whether the notification was about a file, a directory, or unknown
/// (some notify backends do not tell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryKind {
    File,
    Directory,
    #[default]
    Unknown,
}

/// A single filesystem change as delivered by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub entry: EntryKind,
    pub timestamp: Instant,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            entry: EntryKind::Unknown,
            timestamp: Instant::now(),
        }
    }

    pub fn with_entry(mut self, entry: EntryKind) -> Self {
        self.entry = entry;
        self
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Created, path).with_entry(EntryKind::File)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Modified, path).with_entry(EntryKind::File)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(ChangeKind::Deleted, path).with_entry(EntryKind::File)
    }
}

/// A top-level directory tree under observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchedRoot {
    /// Absolute, lexically clean path used for all path arithmetic.
    path: PathBuf,
    /// The path as the user spelled it, for console output.
    display: String,
}

impl WatchedRoot {
    /// Build a root from a user-supplied path.
    ///
    /// Relative paths are resolved against the current working directory; the
    /// directory does not need to exist (startup validation checks that).
    pub fn new(path: impl AsRef<Path>) -> Self {
        let given = path.as_ref();
        let abs = crate::watch::path_utils::absolute(given);
        Self {
            path: abs,
            display: given.to_string_lossy().into_owned(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn display_name(&self) -> &str {
        &self.display
    }
}

impl fmt::Display for WatchedRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}
