use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use devsync::backend::{
    BackendFuture, Output, ProjectSyncRequest, SyncBackend, SyncOp, SyncRequest,
};
use devsync::errors::SyncError;
use devsync::types::WatchedRoot;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendCall {
    Start { roots: Vec<String> },
    Sync { rel_path: String, op: SyncOp },
    Project { roots: Vec<String> },
    Exit,
}

/// A backend that:
/// - records every call
/// - fails `sync` for paths registered with [`FakeBackend::fail_on`]
#[derive(Clone, Default)]
pub struct FakeBackend {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `sync` fail with a backend error for this `./`-prefixed path.
    pub fn fail_on(&self, rel_path: &str) {
        self.failing.lock().unwrap().insert(rel_path.to_string());
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn syncs(&self) -> Vec<(String, SyncOp)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                BackendCall::Sync { rel_path, op } => Some((rel_path, op)),
                _ => None,
            })
            .collect()
    }

    pub fn project_syncs(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::Project { .. }))
            .count()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

fn names(roots: &[WatchedRoot]) -> Vec<String> {
    roots.iter().map(|r| r.display_name().to_string()).collect()
}

impl SyncBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn sync<'a>(&'a self, request: &'a SyncRequest, _out: Output<'a>) -> BackendFuture<'a> {
        Box::pin(async move {
            self.record(BackendCall::Sync {
                rel_path: request.rel_path.clone(),
                op: request.op,
            });
            if self.failing.lock().unwrap().contains(&request.rel_path) {
                return Err(SyncError::backend("fake", &request.rel_path, "refused"));
            }
            Ok(())
        })
    }

    fn sync_project<'a>(
        &'a self,
        request: &'a ProjectSyncRequest,
        _out: Output<'a>,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            let roots: Vec<WatchedRoot> = request.roots.iter().map(|r| r.root.clone()).collect();
            self.record(BackendCall::Project {
                roots: names(&roots),
            });
            Ok(())
        })
    }

    fn on_monitor_start<'a>(
        &'a self,
        roots: &'a [WatchedRoot],
        _out: Output<'a>,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            self.record(BackendCall::Start {
                roots: names(roots),
            });
            Ok(())
        })
    }

    fn on_monitor_exit<'a>(&'a self, _out: Output<'a>) -> BackendFuture<'a> {
        Box::pin(async move {
            self.record(BackendCall::Exit);
            Ok(())
        })
    }
}
