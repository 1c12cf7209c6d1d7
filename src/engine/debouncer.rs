// src/engine/debouncer.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::console::Console;
use crate::engine::batch::{EventBatch, PlannedAction, plan_batch};
use crate::engine::dispatcher::{Dispatcher, print_recoverable};
use crate::errors::{Result, SyncError};
use crate::lifecycle::OperationControl;
use crate::types::{ChangeEvent, WatchedRoot};

/// Timing of one consumer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebounceSettings {
    /// How long one wait on the queue lasts before the running flag is
    /// checked again.
    pub poll_interval: Duration,
    /// Delay after the first event of a burst.
    pub settle: Duration,
    /// Additional delay when more events arrived during `settle`.
    pub extra_settle: Duration,
}

impl Default for DebounceSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            settle: Duration::from_millis(250),
            extra_settle: Duration::from_millis(400),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Draining,
    Deciding,
    Dispatching,
}

/// Single consumer of one root's event queue.
pub struct Debouncer {
    root: WatchedRoot,
    all_roots: Arc<[WatchedRoot]>,
    rx: mpsc::Receiver<ChangeEvent>,
    dispatcher: Dispatcher,
    console: Console,
    control: Arc<OperationControl>,
    settings: DebounceSettings,
    state: DebounceState,
}

impl std::fmt::Debug for Debouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Debouncer")
            .field("root", &self.root)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Debouncer {
    pub fn new(
        root: WatchedRoot,
        all_roots: Arc<[WatchedRoot]>,
        rx: mpsc::Receiver<ChangeEvent>,
        dispatcher: Dispatcher,
        console: Console,
        control: Arc<OperationControl>,
    ) -> Self {
        Self {
            root,
            all_roots,
            rx,
            dispatcher,
            console,
            control,
            settings: DebounceSettings::default(),
            state: DebounceState::Idle,
        }
    }

    pub fn with_settings(mut self, settings: DebounceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    /// Consume the queue until the control is stopped or every producer is
    /// gone.
    pub async fn run(mut self) -> Result<()> {
        info!(root = %self.root, "debouncer started");

        while self.control.is_running() {
            self.state = DebounceState::Idle;
            let first = match timeout(self.settings.poll_interval, self.rx.recv()).await {
                Err(_) => continue,
                Ok(None) => {
                    debug!(root = %self.root, "event queue closed");
                    break;
                }
                Ok(Some(event)) => event,
            };

            self.state = DebounceState::Draining;
            let batch = self.drain(first).await;
            if !self.control.is_running() {
                debug!(root = %self.root, discarded = batch.len(), "stopped while draining");
                break;
            }
            self.process(batch).await?;
        }

        self.state = DebounceState::Idle;
        info!(root = %self.root, "debouncer stopped");
        Ok(())
    }

    async fn drain(&mut self, first: ChangeEvent) -> EventBatch {
        sleep(self.settings.settle).await;
        if !self.rx.is_empty() {
            sleep(self.settings.extra_settle).await;
        }

        let mut batch = EventBatch::new();
        batch.push(first);
        while let Ok(event) = self.rx.try_recv() {
            batch.push(event);
        }
        debug!(root = %self.root, events = batch.len(), "batch drained");
        batch
    }

    /// Filter, plan and dispatch one batch while holding the console.
    pub async fn process(&mut self, batch: EventBatch) -> Result<()> {
        let mut out = self.console.acquire().await;

        self.state = DebounceState::Deciding;
        let filter = Arc::clone(self.dispatcher.filter());
        let root = self.root.clone();
        let plan = tokio::task::spawn_blocking(move || plan_batch(batch, &root, &filter))
            .await
            .map_err(|e| SyncError::Other(anyhow::anyhow!("planning batch: {e}")))??;

        for notice in &plan.notices {
            out.line(notice)?;
        }

        self.state = DebounceState::Dispatching;
        match plan.action {
            PlannedAction::Nothing => {}
            PlannedAction::FullSync => {
                let result = self.dispatcher.sync_project(&self.all_roots, &mut out).await;
                print_recoverable(result, &mut out)?;
            }
            PlannedAction::Individual(items) => {
                for item in items {
                    let result = self
                        .dispatcher
                        .sync(&item.rel_path, item.kind, &self.root, &mut out)
                        .await;
                    print_recoverable(result, &mut out)?;
                }
            }
        }
        self.state = DebounceState::Idle;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timings() {
        let s = DebounceSettings::default();
        assert_eq!(s.poll_interval, Duration::from_millis(200));
        assert!(s.extra_settle > s.settle);
    }
}
