// src/watch/mod.rs

//! File watching and path handling.
//!
//! This module is responsible for:
//! - Wiring up a cross-platform filesystem watcher (`notify`) per root.
//! - Normalizing event paths against their root.
//! - Compiling basename glob patterns for the ignore filters.
//!
//! It does not decide what gets synced; it only turns filesystem changes
//! into queued [`ChangeEvent`](crate::types::ChangeEvent)s.

pub mod path_utils;
pub mod patterns;
pub mod watcher;

pub use patterns::{BasenamePatterns, EDITOR_PATTERNS};
pub use watcher::{WatcherHandle, map_event, spawn_watcher};
