// src/filter/directory.rs

use std::path::Path;

use crate::errors::Result;
use crate::filter::{ChangeFilter, FilterDecision};
use crate::types::EntryKind;

/// Drops notifications about directories; only file content changes are
/// propagated. A new directory reaches the destination with its first file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryEventFilter;

impl ChangeFilter for DirectoryEventFilter {
    fn name(&self) -> &'static str {
        "directory-event"
    }

    fn check(&self, path: &Path, entry: EntryKind) -> Result<FilterDecision> {
        let is_dir = match entry {
            EntryKind::Directory => true,
            EntryKind::File => false,
            EntryKind::Unknown => path.is_dir(),
        };

        if is_dir {
            Ok(FilterDecision::suppress_quietly())
        } else {
            Ok(FilterDecision::keep())
        }
    }
}
