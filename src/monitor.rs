// src/monitor.rs

//! The watch session: per-root watchers and debouncers, the key reader, the
//! Ctrl-C listener and the main loop that waits for a stop or a failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::console::{Console, KeyController, KeySource};
use crate::engine::{
    DebounceSettings, Debouncer, Dispatcher, QUEUE_CAPACITY, event_queue, print_recoverable,
};
use crate::errors::{Result, SyncError};
use crate::lifecycle::{OperationControl, StopReason, Supervisor};
use crate::types::WatchedRoot;
use crate::watch::{WatcherHandle, spawn_watcher};

/// How often the main loop looks for a stop or a failure.
pub const MAIN_LOOP_INTERVAL: Duration = Duration::from_millis(200);

/// Upper bound on waiting for background loops after a stop.
pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Monitor {
    roots: Arc<[WatchedRoot]>,
    dispatcher: Dispatcher,
    console: Console,
    supervisor: Arc<Supervisor>,
    settings: DebounceSettings,
    initial_full_sync: bool,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("roots", &self.roots)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    pub fn new(roots: Vec<WatchedRoot>, dispatcher: Dispatcher, console: Console) -> Self {
        Self {
            roots: roots.into(),
            dispatcher,
            console,
            supervisor: Supervisor::new(),
            settings: DebounceSettings::default(),
            initial_full_sync: true,
        }
    }

    pub fn with_settings(mut self, settings: DebounceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_initial_full_sync(mut self, enabled: bool) -> Self {
        self.initial_full_sync = enabled;
        self
    }

    pub fn supervisor(&self) -> Arc<Supervisor> {
        Arc::clone(&self.supervisor)
    }

    pub fn roots(&self) -> &[WatchedRoot] {
        &self.roots
    }

    /// Key controller with the session keys: `f` full sync, `x` exit.
    pub fn key_controller(&self) -> KeyController {
        let mut ctl = KeyController::new(self.console.clone(), self.supervisor());

        let dispatcher = self.dispatcher.clone();
        let roots = Arc::clone(&self.roots);
        ctl.on_key(&['f'], Some("to trigger a full sync"), move |mut out| {
            let dispatcher = dispatcher.clone();
            let roots = Arc::clone(&roots);
            async move {
                let result = dispatcher.sync_project(&roots, &mut out).await;
                print_recoverable(result, &mut out)
            }
        });

        let sup = self.supervisor();
        ctl.on_key(&['x'], Some("to exit"), move |_| {
            let sup = Arc::clone(&sup);
            async move {
                sup.broadcast_stop(StopReason::UserRequest);
                Ok::<(), SyncError>(())
            }
        });
        ctl
    }

    /// Start one watcher and one debouncer per root. The returned handles
    /// keep the watchers alive.
    pub fn start_watching(&self) -> Result<Vec<WatcherHandle>> {
        let mut handles = Vec::with_capacity(self.roots.len());
        for root in self.roots.iter() {
            let (tx, rx) = event_queue(QUEUE_CAPACITY);
            handles.push(spawn_watcher(root, tx)?);

            let control = OperationControl::new(format!("debouncer {root}"));
            let debouncer = Debouncer::new(
                root.clone(),
                Arc::clone(&self.roots),
                rx,
                self.dispatcher.clone(),
                self.console.clone(),
                Arc::clone(&control),
            )
            .with_settings(self.settings);
            self.supervisor.spawn(control, debouncer.run());
        }
        Ok(handles)
    }

    /// Run the session until the user quits, Ctrl-C arrives, or a
    /// background loop fails.
    pub async fn run(self, keys: Option<Box<dyn KeySource>>) -> Result<StopReason> {
        let backend = Arc::clone(self.dispatcher.backend());
        {
            let mut out = self.console.acquire().await;
            backend.on_monitor_start(&self.roots, &mut out).await?;

            let names: Vec<&str> = self.roots.iter().map(WatchedRoot::display_name).collect();
            out.line(format_args!(
                "Watching dir(s): '{}'; press [Ctrl-C] to exit\n",
                names.join("', '")
            ))?;

            if self.initial_full_sync {
                let result = self.dispatcher.sync_project(&self.roots, &mut out).await;
                print_recoverable(result, &mut out)?;
            }
        }

        let watchers = match self.start_watching() {
            Ok(w) => w,
            Err(err) => {
                self.shutdown(StopReason::Failure(err.to_string())).await;
                return Err(err);
            }
        };

        if let Some(source) = keys {
            let controller = self.key_controller();
            let help = controller.help_text();
            self.console.acquire().await.line(help.trim_end())?;
            controller.spawn(source);
        }

        let signal = {
            let sup = self.supervisor();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => sup.broadcast_stop(StopReason::Interrupt),
                    Err(err) => warn!(error = %err, "failed to listen for Ctrl-C"),
                }
            })
        };

        let failure = self.wait_for_stop().await;
        signal.abort();
        drop(watchers);

        let reason = match &failure {
            Some(err) => StopReason::Failure(err.to_string()),
            None => self
                .supervisor
                .stop_reason()
                .unwrap_or(StopReason::UserRequest),
        };
        self.shutdown(reason.clone()).await;

        match failure {
            Some(err) => Err(err),
            None => Ok(reason),
        }
    }

    async fn wait_for_stop(&self) -> Option<SyncError> {
        loop {
            tokio::time::sleep(MAIN_LOOP_INTERVAL).await;
            if let Some(err) = self.supervisor.take_failure() {
                return Some(err);
            }
            if !self.supervisor.is_running() {
                return None;
            }
        }
    }

    /// Stop every loop, wait for them, let the backend clean up and print
    /// why we stopped.
    async fn shutdown(&self, reason: StopReason) {
        self.supervisor.broadcast_stop(reason);
        self.supervisor.join(JOIN_TIMEOUT).await;
        if let Some(late) = self.supervisor.take_failure() {
            debug!(error = %late, "failure during shutdown");
        }

        let mut out = self.console.acquire().await;
        if let Err(err) = self.dispatcher.backend().on_monitor_exit(&mut out).await {
            warn!(error = %err, "backend cleanup failed");
            let _ = out.line(&err);
        }
        if let Some(reason) = self.supervisor.stop_reason() {
            info!(%reason, "monitor stopped");
            let _ = out.line(&reason);
        }
    }
}
