// src/engine/mod.rs

//! Event coalescing and sync orchestration.
//!
//! This module ties together:
//! - the bounded per-root event queue fed by the watcher
//! - batch planning (coalescing, filtering, full-sync threshold)
//! - the debounce loop consuming one root's queue
//! - the dispatcher mapping planned changes onto the backend

pub mod batch;
pub mod debouncer;
pub mod dispatcher;
pub mod queue;

pub use batch::{BatchPlan, EventBatch, FULL_SYNC_THRESHOLD, PlannedAction, PlannedSync, plan_batch};
pub use debouncer::{DebounceSettings, DebounceState, Debouncer};
pub use dispatcher::{Dispatcher, print_recoverable, sync_op};
pub use queue::{EventSender, QUEUE_CAPACITY, event_queue};
