// src/backend/mod.rs

//! Sync backends.
//!
//! The dispatcher talks to a [`SyncBackend`] instead of spawning commands
//! itself. Production code picks one variant of the closed [`Backend`] enum
//! from the destination at startup; tests plug in a recording fake.
//!
//! - [`RsyncBackend`] copies to a local path or an ssh-style remote.
//! - [`KubeBackend`] copies into every ready container whose image matches a
//!   prefix, running rsync through `kubectl exec`.

pub mod kube;
pub mod rsync;

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::time::Duration;

use crate::config::Destination;
use crate::errors::Result;
use crate::types::WatchedRoot;

pub use kube::KubeBackend;
pub use rsync::RsyncBackend;

pub type BackendFuture<'a> = Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

/// Console output handed to backends for per-target status lines.
pub type Output<'a> = &'a mut (dyn Write + Send);

/// What has to happen to one path at the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncOp {
    Create,
    Delete,
    Sync,
}

impl SyncOp {
    /// Past-tense verb used in the console line.
    pub fn verb(self) -> &'static str {
        match self {
            SyncOp::Create => "Created",
            SyncOp::Delete => "Deleted",
            SyncOp::Sync => "Synced",
        }
    }
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub root: WatchedRoot,
    /// `./`-prefixed path relative to `root`.
    pub rel_path: String,
    pub op: SyncOp,
}

/// One root of a full-project sync and what to leave out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoot {
    pub root: WatchedRoot,
    /// rsync exclude patterns, relative to the root.
    pub exclusions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectSyncRequest {
    pub roots: Vec<ProjectRoot>,
}

/// Capability every backend provides.
pub trait SyncBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Propagate a single change.
    fn sync<'a>(&'a self, request: &'a SyncRequest, out: Output<'a>) -> BackendFuture<'a>;

    /// Copy every root, minus exclusions.
    fn sync_project<'a>(
        &'a self,
        request: &'a ProjectSyncRequest,
        out: Output<'a>,
    ) -> BackendFuture<'a>;

    /// Called once before watching starts.
    fn on_monitor_start<'a>(&'a self, roots: &'a [WatchedRoot], out: Output<'a>)
    -> BackendFuture<'a>;

    /// Called once after every loop has stopped.
    fn on_monitor_exit<'a>(&'a self, out: Output<'a>) -> BackendFuture<'a>;
}

/// Settings the CLI and configuration hand to backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendOptions {
    /// Patch matching deployments to run under a supervisor while syncing.
    pub supervisor: bool,
    pub kube_host: Option<String>,
    pub pod_timeout: Duration,
    pub container_command: Option<String>,
}

impl Default for BackendOptions {
    fn default() -> Self {
        Self {
            supervisor: false,
            kube_host: None,
            pod_timeout: Duration::from_secs(crate::config::model::DEFAULT_POD_TIMEOUT_SECS),
            container_command: None,
        }
    }
}

/// The closed set of production backends.
#[derive(Debug)]
pub enum Backend {
    LocalCopy(RsyncBackend),
    RemoteExec(KubeBackend),
}

impl Backend {
    pub fn from_destination(dest: &Destination, options: BackendOptions) -> Result<Self> {
        match dest {
            Destination::LocalCopy { target } => {
                Ok(Backend::LocalCopy(RsyncBackend::new(target.clone())))
            }
            Destination::RemoteExec { image_prefix, dir } => Ok(Backend::RemoteExec(
                KubeBackend::new(image_prefix.clone(), dir.clone(), options)?,
            )),
        }
    }

    fn inner(&self) -> &dyn SyncBackend {
        match self {
            Backend::LocalCopy(b) => b,
            Backend::RemoteExec(b) => b,
        }
    }
}

impl SyncBackend for Backend {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn sync<'a>(&'a self, request: &'a SyncRequest, out: Output<'a>) -> BackendFuture<'a> {
        self.inner().sync(request, out)
    }

    fn sync_project<'a>(
        &'a self,
        request: &'a ProjectSyncRequest,
        out: Output<'a>,
    ) -> BackendFuture<'a> {
        self.inner().sync_project(request, out)
    }

    fn on_monitor_start<'a>(
        &'a self,
        roots: &'a [WatchedRoot],
        out: Output<'a>,
    ) -> BackendFuture<'a> {
        self.inner().on_monitor_start(roots, out)
    }

    fn on_monitor_exit<'a>(&'a self, out: Output<'a>) -> BackendFuture<'a> {
        self.inner().on_monitor_exit(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_follows_destination() {
        let dest = Destination::parse("/tmp/out").unwrap();
        let backend = Backend::from_destination(&dest, BackendOptions::default()).unwrap();
        assert_eq!(backend.name(), "rsync");

        let dest = Destination::parse("kube://api:/srv").unwrap();
        let backend = Backend::from_destination(&dest, BackendOptions::default()).unwrap();
        assert_eq!(backend.name(), "kube");
    }

    #[test]
    fn verbs() {
        assert_eq!(SyncOp::Create.to_string(), "Created");
        assert_eq!(SyncOp::Delete.to_string(), "Deleted");
        assert_eq!(SyncOp::Sync.to_string(), "Synced");
    }
}
