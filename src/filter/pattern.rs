// src/filter/pattern.rs

use std::borrow::Cow;
use std::path::Path;

use crate::errors::Result;
use crate::filter::{ChangeFilter, FilterDecision};
use crate::types::EntryKind;
use crate::watch::patterns::BasenamePatterns;

/// Rejects paths whose base name matches a glob pattern.
#[derive(Debug, Clone)]
pub struct PatternFilter {
    name: &'static str,
    reason: Cow<'static, str>,
    patterns: BasenamePatterns,
}

impl PatternFilter {
    /// Editor backup and swap files.
    pub fn editor() -> Self {
        Self::editor_with(BasenamePatterns::editor())
    }

    pub(crate) fn editor_with(patterns: BasenamePatterns) -> Self {
        Self {
            name: "editor-temp-file",
            reason: Cow::Borrowed("editor backup file"),
            patterns,
        }
    }

    /// Patterns from the `ignore_files` configuration key.
    pub fn user(patterns: BasenamePatterns) -> Self {
        Self {
            name: "user-pattern",
            reason: Cow::Borrowed("matches pattern from ignore_files config"),
            patterns,
        }
    }

    pub fn is_filtered(&self, path: &Path) -> bool {
        self.patterns.matches(path)
    }
}

impl ChangeFilter for PatternFilter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, path: &Path, _entry: EntryKind) -> Result<FilterDecision> {
        if self.patterns.matches(path) {
            Ok(FilterDecision::suppress(self.reason.clone()))
        } else {
            Ok(FilterDecision::keep())
        }
    }
}
