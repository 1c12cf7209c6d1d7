// src/watch/patterns.rs

//! Basename glob matching shared by the editor and user pattern filters.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

/// Backup and swap files written by common editors (Emacs, Vim, GNOME
/// apps). Changes to these never reach the destination.
pub const EDITOR_PATTERNS: &[&str] = &[
    "*~",
    "#*#",
    ".#*",
    ".goutputstream-*",
    "*_flymake.*",
    "*.swp",
    "*.swo",
    "*.swx",
    "4913",
];

/// A compiled set of glob patterns matched against a file's base name.
///
/// Matching is case-sensitive. `*` does not cross `/`, which is irrelevant
/// for base names but keeps the semantics of shell `fnmatch`.
#[derive(Clone)]
pub struct BasenamePatterns {
    patterns: Vec<String>,
    set: GlobSet,
}

impl fmt::Debug for BasenamePatterns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasenamePatterns")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl BasenamePatterns {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();
        let set = build_globset(&patterns)?;
        Ok(Self { patterns, set })
    }

    pub fn editor() -> Self {
        // The built-in list is static and known to compile.
        Self::new(EDITOR_PATTERNS).unwrap_or_else(|_| Self::empty())
    }

    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The source patterns, in configuration order.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Patterns without any glob metacharacter, i.e. literal file names.
    pub fn literals(&self) -> impl Iterator<Item = &str> {
        self.patterns
            .iter()
            .map(String::as_str)
            .filter(|p| !p.contains(['*', '?', '[', '{']))
    }

    /// True if the base name of `path` matches any pattern.
    pub fn matches(&self, path: &Path) -> bool {
        match path.file_name() {
            Some(name) => self.set.is_match(Path::new(name)),
            None => false,
        }
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = GlobBuilder::new(pat)
            .literal_separator(true)
            .build()
            .with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
