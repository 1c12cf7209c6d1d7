// src/filter/mod.rs

//! Ignore/filter engine.
//!
//! Every candidate change goes through an ordered [`FilterChain`]; the first
//! filter that rejects the path wins and the rest are skipped. Order:
//!
//! 1. [`DirectoryEventFilter`] - directory-level notifications.
//! 2. [`PatternFilter::editor`] - editor backup/swap files.
//! 3. [`PatternFilter::user`] - `ignore_files` from configuration.
//! 4. [`VcsFilter`] - git internals, ignored and untracked files.

pub mod directory;
pub mod pattern;
pub mod vcs;

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::backend::rsync::escape_rsync_pattern;
use crate::errors::{Result, SyncError};
use crate::types::{ChangeEvent, EntryKind};
use crate::watch::patterns::BasenamePatterns;

pub use directory::DirectoryEventFilter;
pub use pattern::PatternFilter;
pub use vcs::{GitCli, IgnoreRegistry, VcsFilter, VersionControl};

/// Outcome of a single filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDecision {
    pub keep: bool,
    pub reason: Option<Cow<'static, str>>,
}

impl FilterDecision {
    pub fn keep() -> Self {
        Self {
            keep: true,
            reason: None,
        }
    }

    pub fn suppress(reason: impl Into<Cow<'static, str>>) -> Self {
        Self {
            keep: false,
            reason: Some(reason.into()),
        }
    }

    /// Suppress without a user-facing notice.
    pub fn suppress_quietly() -> Self {
        Self {
            keep: false,
            reason: None,
        }
    }
}

/// One link of the filter chain.
pub trait ChangeFilter: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, path: &Path, entry: EntryKind) -> Result<FilterDecision>;
}

/// What the chain decided for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Keep,
    Suppress {
        filter: &'static str,
        /// `Some` only the first time this path was suppressed with a reason.
        notice: Option<String>,
    },
}

impl Verdict {
    pub fn is_keep(&self) -> bool {
        matches!(self, Verdict::Keep)
    }
}

/// Remembers which paths were already reported as ignored.
#[derive(Debug, Default)]
pub struct SuppressionLog {
    seen: Mutex<HashSet<PathBuf>>,
}

impl SuppressionLog {
    /// Returns true the first time a path is recorded.
    pub fn record(&self, path: &Path) -> bool {
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(path.to_path_buf()),
            Err(poisoned) => poisoned.into_inner().insert(path.to_path_buf()),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Ordered filter chain with once-per-path suppression notices.
pub struct FilterChain {
    filters: Vec<Box<dyn ChangeFilter>>,
    log: SuppressionLog,
    editor: BasenamePatterns,
    user: BasenamePatterns,
    vcs: Option<Arc<VcsFilter>>,
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.filters.iter().map(|f| f.name()).collect();
        f.debug_struct("FilterChain")
            .field("filters", &names)
            .finish_non_exhaustive()
    }
}

impl FilterChain {
    /// The standard chain: directory events, editor files, user patterns,
    /// and version control.
    pub fn standard(user: BasenamePatterns, vcs: VcsFilter) -> Self {
        let editor = BasenamePatterns::editor();
        let vcs = Arc::new(vcs);
        let filters: Vec<Box<dyn ChangeFilter>> = vec![
            Box::new(DirectoryEventFilter),
            Box::new(PatternFilter::editor_with(editor.clone())),
            Box::new(PatternFilter::user(user.clone())),
            Box::new(SharedVcs(Arc::clone(&vcs))),
        ];
        Self {
            filters,
            log: SuppressionLog::default(),
            editor,
            user,
            vcs: Some(vcs),
        }
    }

    /// A chain without the version-control stage; used where no git
    /// collaborator is wanted (tests, non-repository trees).
    pub fn without_vcs(user: BasenamePatterns) -> Self {
        let editor = BasenamePatterns::editor();
        let filters: Vec<Box<dyn ChangeFilter>> = vec![
            Box::new(DirectoryEventFilter),
            Box::new(PatternFilter::editor_with(editor.clone())),
            Box::new(PatternFilter::user(user.clone())),
        ];
        Self {
            filters,
            log: SuppressionLog::default(),
            editor,
            user,
            vcs: None,
        }
    }

    /// Run the chain for an event.
    pub fn evaluate(&self, event: &ChangeEvent) -> Result<Verdict> {
        self.evaluate_path(&event.path, event.entry)
    }

    /// Run the chain for a bare path.
    pub fn evaluate_path(&self, path: &Path, entry: EntryKind) -> Result<Verdict> {
        if path.as_os_str().is_empty() {
            return Err(SyncError::InvalidArgument(
                "a file path or change event is required".to_string(),
            ));
        }

        for filter in &self.filters {
            let decision = filter.check(path, entry)?;
            if decision.keep {
                continue;
            }

            let notice = match decision.reason {
                Some(reason) if self.log.record(path) => {
                    Some(format!("Ignored {}, {}", path.display(), reason))
                }
                _ => None,
            };
            debug!(path = %path.display(), filter = filter.name(), "change suppressed");
            return Ok(Verdict::Suppress {
                filter: filter.name(),
                notice,
            });
        }

        Ok(Verdict::Keep)
    }

    /// Exclusion patterns for a full sync of `root`, relative to it.
    ///
    /// Refreshes the version-control listing first.
    pub fn exclusions(&self, root: &Path) -> Vec<String> {
        let mut out = vec![".git/".to_string()];
        out.extend(self.editor.patterns().iter().cloned());
        out.extend(self.user.patterns().iter().cloned());
        out.extend(
            self.user
                .literals()
                .map(|l| format!("/{}", escape_rsync_pattern(l))),
        );
        if let Some(vcs) = &self.vcs {
            out.extend(vcs.exclusions_under(root));
        }
        let mut seen = HashSet::new();
        out.retain(|rule| seen.insert(rule.clone()));
        out
    }

    pub fn suppression_log(&self) -> &SuppressionLog {
        &self.log
    }
}

/// Lets the chain keep a handle on the VCS filter for exclusion listings
/// while the same instance sits in the filter list.
struct SharedVcs(Arc<VcsFilter>);

impl ChangeFilter for SharedVcs {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn check(&self, path: &Path, entry: EntryKind) -> Result<FilterDecision> {
        self.0.check(path, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FilterChain {
        FilterChain::without_vcs(BasenamePatterns::new(&["*.log"]).unwrap())
    }

    #[test]
    fn empty_path_is_invalid_argument() {
        let err = chain()
            .evaluate_path(Path::new(""), EntryKind::File)
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidArgument(_)));
    }

    #[test]
    fn first_rejecting_filter_wins() {
        let verdict = chain()
            .evaluate_path(Path::new("/tmp/x/#build.log#"), EntryKind::File)
            .unwrap();
        match verdict {
            Verdict::Suppress { filter, .. } => assert_eq!(filter, "editor-temp-file"),
            Verdict::Keep => panic!("expected suppression"),
        }
    }

    #[test]
    fn notice_is_emitted_once_per_path() {
        let chain = chain();
        let path = Path::new("/tmp/x/build.log");

        let first = chain.evaluate_path(path, EntryKind::File).unwrap();
        let second = chain.evaluate_path(path, EntryKind::File).unwrap();

        assert_eq!(
            first,
            Verdict::Suppress {
                filter: "user-pattern",
                notice: Some(
                    "Ignored /tmp/x/build.log, matches pattern from ignore_files config"
                        .to_string()
                ),
            }
        );
        assert_eq!(
            second,
            Verdict::Suppress {
                filter: "user-pattern",
                notice: None
            }
        );
    }

    #[test]
    fn ordinary_file_is_kept() {
        let verdict = chain()
            .evaluate_path(Path::new("/tmp/x/src/main.rs"), EntryKind::File)
            .unwrap();
        assert!(verdict.is_keep());
    }

    #[test]
    fn exclusions_repeated_across_filters_appear_once() {
        let chain = FilterChain::without_vcs(
            BasenamePatterns::new(&["*.swp", "*.log", "*~", "*.log"]).unwrap(),
        );
        let ex = chain.exclusions(Path::new("/tmp/x"));
        for rule in ["*.swp", "*.log", "*~"] {
            assert_eq!(ex.iter().filter(|r| *r == rule).count(), 1, "{rule} in {ex:?}");
        }
        assert_eq!(ex[0], ".git/");
    }

    #[test]
    fn exclusions_include_literals_anchored() {
        let chain = FilterChain::without_vcs(BasenamePatterns::new(&["*.log", "secret.env"]).unwrap());
        let ex = chain.exclusions(Path::new("/tmp/x"));
        assert_eq!(ex[0], ".git/");
        assert!(ex.contains(&"*~".to_string()));
        assert!(ex.contains(&"*.log".to_string()));
        assert!(ex.contains(&"/secret.env".to_string()));
    }
}
