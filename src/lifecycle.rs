// src/lifecycle.rs

//! Lifecycle and shutdown coordination.
//!
//! Every long-running loop (one debouncer per root, the key reader) owns an
//! [`OperationControl`] and registers it with the shared [`Supervisor`]. The
//! supervisor keeps only weak references; stopping is cooperative: loops
//! check [`OperationControl::is_running`] at least once per poll interval.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use anyhow::anyhow;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

impl OperationState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Stopping => 2,
            Self::Stopped => 3,
        }
    }

    const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            3 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Ctrl-C, from the signal handler or the raw-mode key reader.
    Interrupt,
    /// The user pressed the exit key.
    UserRequest,
    /// A background loop failed.
    Failure(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupt => f.write_str("Received [Ctrl-C], exiting."),
            StopReason::UserRequest => f.write_str("Exiting."),
            StopReason::Failure(msg) => write!(f, "Stopping after failure: {msg}"),
        }
    }
}

/// Something the supervisor can stop.
pub trait BackgroundOperation: Send + Sync {
    fn name(&self) -> &str;

    /// Request a stop; must not block.
    fn stop(&self, reason: &StopReason);

    fn state(&self) -> OperationState;
}

/// State machine shared between a loop and the supervisor.
///
/// `Idle -> Running -> Stopping -> Stopped`; `Stopped` is terminal.
#[derive(Debug)]
pub struct OperationControl {
    name: String,
    state: AtomicU8,
}

impl OperationControl {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: AtomicU8::new(OperationState::Idle.as_u8()),
        })
    }

    /// `Idle -> Running`. Returns false if a stop already arrived.
    pub fn start(&self) -> bool {
        self.transition(OperationState::Idle, OperationState::Running)
    }

    pub fn is_running(&self) -> bool {
        self.state() == OperationState::Running
    }

    /// Mark the loop as finished.
    pub fn finish(&self) {
        self.state
            .store(OperationState::Stopped.as_u8(), Ordering::Release);
    }

    fn transition(&self, from: OperationState, to: OperationState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl BackgroundOperation for OperationControl {
    fn name(&self) -> &str {
        &self.name
    }

    fn stop(&self, reason: &StopReason) {
        let stopped = self.transition(OperationState::Running, OperationState::Stopping)
            || self.transition(OperationState::Idle, OperationState::Stopping);
        if stopped {
            debug!(operation = %self.name, reason = ?reason, "stop requested");
        }
    }

    fn state(&self) -> OperationState {
        OperationState::from_u8(self.state.load(Ordering::Acquire))
    }
}

#[derive(Debug)]
struct Failure {
    operation: String,
    error: SyncError,
}

/// Owns the stop broadcast and the first background failure.
#[derive(Default)]
pub struct Supervisor {
    operations: Mutex<Vec<Weak<dyn BackgroundOperation>>>,
    stopped: AtomicBool,
    reason: Mutex<Option<StopReason>>,
    failure: Mutex<Option<Failure>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Supervisor")
            .field("stopped", &self.stopped.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Supervisor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Track an operation. Registering after a stop stops it right away.
    pub fn register(&self, op: &Arc<dyn BackgroundOperation>) {
        lock(&self.operations).push(Arc::downgrade(op));
        if let Some(reason) = self.stop_reason() {
            op.stop(&reason);
        }
    }

    /// Stop every live operation. Only the first call has an effect.
    pub fn broadcast_stop(&self, reason: StopReason) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            debug!(?reason, "stop already broadcast");
            return;
        }
        info!(?reason, "broadcasting stop");
        *lock(&self.reason) = Some(reason.clone());

        let live: Vec<Arc<dyn BackgroundOperation>> = {
            let mut ops = lock(&self.operations);
            ops.retain(|w| w.strong_count() > 0);
            ops.iter().filter_map(Weak::upgrade).collect()
        };
        for op in live {
            op.stop(&reason);
        }
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::Acquire)
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        lock(&self.reason).clone()
    }

    /// Record a background failure; the first one is kept.
    pub fn report_failure(&self, operation: &str, error: SyncError) {
        error!(operation, error = %error, "background operation failed");
        let mut slot = lock(&self.failure);
        if slot.is_none() {
            *slot = Some(Failure {
                operation: operation.to_string(),
                error,
            });
        } else {
            warn!(operation, "additional failure dropped");
        }
    }

    /// Hand the recorded failure to the caller (main loop).
    pub fn take_failure(&self) -> Option<SyncError> {
        lock(&self.failure).take().map(|f| {
            debug!(operation = %f.operation, "failure taken by main loop");
            f.error
        })
    }

    /// Run an async loop under supervision. Errors and panics are reported.
    pub fn spawn<F>(self: &Arc<Self>, control: Arc<OperationControl>, fut: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let op: Arc<dyn BackgroundOperation> = control.clone();
        self.register(&op);
        control.start();

        let sup = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = tokio::spawn(fut).await;
            sup.settle(&control, outcome);
        });
        lock(&self.handles).push(handle);
    }

    /// Like [`Supervisor::spawn`] for a loop that blocks its thread.
    pub fn spawn_blocking<F>(self: &Arc<Self>, control: Arc<OperationControl>, f: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let op: Arc<dyn BackgroundOperation> = control.clone();
        self.register(&op);
        control.start();

        let sup = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = tokio::task::spawn_blocking(f).await;
            sup.settle(&control, outcome);
        });
        lock(&self.handles).push(handle);
    }

    fn settle(
        &self,
        control: &OperationControl,
        outcome: std::result::Result<Result<()>, tokio::task::JoinError>,
    ) {
        match outcome {
            Ok(Ok(())) => debug!(operation = %control.name(), "operation finished"),
            Ok(Err(err)) => self.report_failure(control.name(), err),
            Err(join) if join.is_panic() => self.report_failure(
                control.name(),
                SyncError::Other(anyhow!("{} panicked", control.name())),
            ),
            Err(_) => debug!(operation = %control.name(), "operation cancelled"),
        }
        control.finish();
    }

    /// Wait for every supervised loop, up to `limit` in total.
    pub async fn join(&self, limit: Duration) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *lock(&self.handles));
        let all = async {
            for h in handles {
                let _ = h.await;
            }
        };
        if tokio::time::timeout(limit, all).await.is_err() {
            warn!(?limit, "background operations did not finish in time");
        }
    }
}
