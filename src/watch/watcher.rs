// src/watch/watcher.rs

use anyhow::Context;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::engine::EventSender;
use crate::errors::Result;
use crate::types::{ChangeEvent, ChangeKind, EntryKind, WatchedRoot};

/// Handle for the filesystem watcher of one root.
///
/// Dropping this handle stops watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Translate one notify event into change events.
///
/// Access notifications are ignored. Renames with both ends known become a
/// delete of the old path and a create of the new one; the dispatcher's
/// existence check sorts out renames reported one end at a time.
pub fn map_event(event: Event) -> Vec<ChangeEvent> {
    let Event { kind, paths, .. } = event;

    let single = |kind: ChangeKind, entry: EntryKind| -> Vec<ChangeEvent> {
        paths
            .iter()
            .map(|p| ChangeEvent::new(kind, p.clone()).with_entry(entry))
            .collect()
    };

    match kind {
        EventKind::Create(CreateKind::File) => single(ChangeKind::Created, EntryKind::File),
        EventKind::Create(CreateKind::Folder) => {
            single(ChangeKind::Created, EntryKind::Directory)
        }
        EventKind::Create(_) => single(ChangeKind::Created, EntryKind::Unknown),

        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, paths.as_slice()) {
            (RenameMode::Both, [from, to]) => vec![
                ChangeEvent::new(ChangeKind::Deleted, from.clone()),
                ChangeEvent::new(ChangeKind::Created, to.clone()),
            ],
            (RenameMode::From, _) => single(ChangeKind::Deleted, EntryKind::Unknown),
            (RenameMode::To, _) => single(ChangeKind::Created, EntryKind::Unknown),
            _ => single(ChangeKind::Moved, EntryKind::Unknown),
        },
        EventKind::Modify(_) | EventKind::Any => {
            single(ChangeKind::Modified, EntryKind::Unknown)
        }

        EventKind::Remove(RemoveKind::File) => single(ChangeKind::Deleted, EntryKind::File),
        EventKind::Remove(RemoveKind::Folder) => {
            single(ChangeKind::Deleted, EntryKind::Directory)
        }
        EventKind::Remove(_) => single(ChangeKind::Deleted, EntryKind::Unknown),

        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}

/// Watch `root` recursively, pushing every change into `sender`.
///
/// The notify callback runs on the backend's own thread; `push` never blocks
/// it.
pub fn spawn_watcher(root: &WatchedRoot, sender: EventSender) -> Result<WatcherHandle> {
    let label = root.display_name().to_string();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                debug!(?event, "received notify event");
                for change in map_event(event) {
                    if !sender.push(change) {
                        debug!(root = %label, "event queue closed; dropping notify event");
                        return;
                    }
                }
            }
            Err(err) => warn!(root = %label, error = %err, "file watch error"),
        },
        Config::default(),
    )
    .context("creating file watcher")?;

    watcher
        .watch(root.path(), RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", root.path().display()))?;

    info!(root = %root, "file watcher started");
    Ok(WatcherHandle { _inner: watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        let mut ev = Event::new(kind);
        for p in paths {
            ev = ev.add_path(PathBuf::from(p));
        }
        ev
    }

    #[test]
    fn creates_and_removes_carry_entry_kind() {
        let out = map_event(event(EventKind::Create(CreateKind::File), &["/r/a"]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Created);
        assert_eq!(out[0].entry, EntryKind::File);

        let out = map_event(event(EventKind::Remove(RemoveKind::Folder), &["/r/d"]));
        assert_eq!(out[0].kind, ChangeKind::Deleted);
        assert_eq!(out[0].entry, EntryKind::Directory);
    }

    #[test]
    fn rename_with_both_ends_splits() {
        let out = map_event(event(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            &["/r/old", "/r/new"],
        ));
        let kinds: Vec<_> = out.iter().map(|e| (e.kind, e.path.clone())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::Deleted, PathBuf::from("/r/old")),
                (ChangeKind::Created, PathBuf::from("/r/new")),
            ]
        );
    }

    #[test]
    fn partial_renames_and_content_changes() {
        let from = map_event(event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/r/a"]));
        assert_eq!(from[0].kind, ChangeKind::Deleted);

        let any = map_event(event(EventKind::Modify(ModifyKind::Name(RenameMode::Any)), &["/r/a"]));
        assert_eq!(any[0].kind, ChangeKind::Moved);

        let data = map_event(event(EventKind::Modify(ModifyKind::Any), &["/r/a"]));
        assert_eq!(data[0].kind, ChangeKind::Modified);
    }

    #[test]
    fn access_events_are_ignored() {
        let out = map_event(event(
            EventKind::Access(notify::event::AccessKind::Any),
            &["/r/a"],
        ));
        assert!(out.is_empty());
    }
}
