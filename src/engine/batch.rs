// src/engine/batch.rs

//! Pure batch planning: coalescing, filtering, normalization and the
//! full-sync threshold. No I/O besides what the filters themselves do.

use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::errors::{Result, SyncError};
use crate::filter::{FilterChain, Verdict};
use crate::types::{ChangeEvent, ChangeKind, WatchedRoot};
use crate::watch::path_utils::normalize;

/// More kept events than this in one window turn into a full-project sync.
pub const FULL_SYNC_THRESHOLD: usize = 3;

/// Events drained in one debounce window, coalesced per path.
///
/// The last event for a path replaces earlier ones but keeps the position
/// where the path was first seen.
#[derive(Debug, Default, Clone)]
pub struct EventBatch {
    events: Vec<ChangeEvent>,
    index: HashMap<PathBuf, usize>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: ChangeEvent) {
        match self.index.get(&event.path) {
            Some(&i) => self.events[i] = event,
            None => {
                self.index.insert(event.path.clone(), self.events.len());
                self.events.push(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[ChangeEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<ChangeEvent> {
        self.events
    }
}

impl FromIterator<ChangeEvent> for EventBatch {
    fn from_iter<I: IntoIterator<Item = ChangeEvent>>(iter: I) -> Self {
        let mut batch = EventBatch::new();
        for ev in iter {
            batch.push(ev);
        }
        batch
    }
}

/// One change that survived filtering, ready for the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSync {
    /// `./`-prefixed path relative to the root.
    pub rel_path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlannedAction {
    /// Nothing survived.
    Nothing,
    /// Dispatch each change in batch order.
    Individual(Vec<PlannedSync>),
    /// Too many changes: one full-project sync instead.
    FullSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub action: PlannedAction,
    /// First-time suppression notices, to be printed.
    pub notices: Vec<String>,
}

/// Decide what to do with a coalesced batch for `root`.
///
/// Filtering stops as soon as more than [`FULL_SYNC_THRESHOLD`] changes are
/// kept. Paths outside the root are dropped silently.
pub fn plan_batch(batch: EventBatch, root: &WatchedRoot, filter: &FilterChain) -> Result<BatchPlan> {
    let mut kept: Vec<PlannedSync> = Vec::new();
    let mut notices: Vec<String> = Vec::new();

    for event in batch.into_events() {
        match filter.evaluate(&event) {
            Ok(Verdict::Keep) => {}
            Ok(Verdict::Suppress { notice, .. }) => {
                notices.extend(notice);
                continue;
            }
            Err(SyncError::InvalidArgument(msg)) => {
                warn!(error = %msg, "skipping malformed change event");
                continue;
            }
            Err(err) => return Err(err),
        }

        let rel_path = match normalize(&event.path, root.path()) {
            Ok(rel) => rel,
            Err(unrelated) => {
                debug!(%unrelated, "dropping event outside root");
                continue;
            }
        };

        kept.push(PlannedSync {
            rel_path,
            kind: event.kind,
        });

        if kept.len() > FULL_SYNC_THRESHOLD {
            debug!(root = %root, "full-sync threshold exceeded");
            return Ok(BatchPlan {
                action: PlannedAction::FullSync,
                notices,
            });
        }
    }

    let action = if kept.is_empty() {
        PlannedAction::Nothing
    } else {
        PlannedAction::Individual(kept)
    };
    Ok(BatchPlan { action, notices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watch::patterns::BasenamePatterns;
    use std::path::Path;

    fn chain() -> FilterChain {
        FilterChain::without_vcs(BasenamePatterns::new(&["*.log"]).unwrap())
    }

    #[test]
    fn last_event_wins_in_first_seen_order() {
        let batch: EventBatch = [
            ChangeEvent::created("/r/a"),
            ChangeEvent::created("/r/b"),
            ChangeEvent::modified("/r/a"),
            ChangeEvent::deleted("/r/a"),
        ]
        .into_iter()
        .collect();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.events()[0].path, Path::new("/r/a"));
        assert_eq!(batch.events()[0].kind, ChangeKind::Deleted);
        assert_eq!(batch.events()[1].path, Path::new("/r/b"));
    }

    #[test]
    fn small_batches_dispatch_individually() {
        let root = WatchedRoot::new("/r");
        let batch: EventBatch = [
            ChangeEvent::created("/r/src/a.rs"),
            ChangeEvent::modified("/r/debug.log"),
            ChangeEvent::deleted("/elsewhere/x"),
        ]
        .into_iter()
        .collect();

        let plan = plan_batch(batch, &root, &chain()).unwrap();
        assert_eq!(
            plan.action,
            PlannedAction::Individual(vec![PlannedSync {
                rel_path: "./src/a.rs".to_string(),
                kind: ChangeKind::Created,
            }])
        );
        assert_eq!(plan.notices.len(), 1);
        assert!(plan.notices[0].starts_with("Ignored /r/debug.log"));
    }

    #[test]
    fn more_than_threshold_becomes_full_sync() {
        let root = WatchedRoot::new("/r");
        let batch: EventBatch = (0..4)
            .map(|i| ChangeEvent::modified(format!("/r/f{i}.rs")))
            .collect();
        let plan = plan_batch(batch, &root, &chain()).unwrap();
        assert_eq!(plan.action, PlannedAction::FullSync);

        let batch: EventBatch = (0..3)
            .map(|i| ChangeEvent::modified(format!("/r/f{i}.rs")))
            .collect();
        let plan = plan_batch(batch, &root, &chain()).unwrap();
        assert!(matches!(plan.action, PlannedAction::Individual(ref v) if v.len() == 3));
    }

    #[test]
    fn suppressed_events_do_not_count_toward_threshold() {
        let root = WatchedRoot::new("/r");
        let batch: EventBatch = (0..10)
            .map(|i| ChangeEvent::modified(format!("/r/f{i}.log")))
            .chain([ChangeEvent::modified("/r/main.rs")])
            .collect();
        let plan = plan_batch(batch, &root, &chain()).unwrap();
        assert!(matches!(plan.action, PlannedAction::Individual(ref v) if v.len() == 1));
        assert_eq!(plan.notices.len(), 10);
    }
}
