// src/engine/dispatcher.rs

use std::io::Write;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{
    Output, ProjectRoot, ProjectSyncRequest, SyncBackend, SyncOp, SyncRequest,
};
use crate::errors::{Result, SyncError};
use crate::filter::FilterChain;
use crate::types::{ChangeKind, WatchedRoot};
use crate::watch::path_utils::display_path;

/// Turns planned changes into backend calls and console lines.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn SyncBackend>,
    filter: Arc<FilterChain>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

/// The operation for a change; a path gone from disk is a delete no matter
/// what the notification said.
pub fn sync_op(kind: ChangeKind, exists: bool) -> SyncOp {
    if !exists {
        return SyncOp::Delete;
    }
    match kind {
        ChangeKind::Created => SyncOp::Create,
        ChangeKind::Deleted => SyncOp::Delete,
        ChangeKind::Modified | ChangeKind::Moved => SyncOp::Sync,
    }
}

/// Print a recoverable backend failure and carry on; anything else is
/// returned.
pub fn print_recoverable(result: Result<()>, out: Output<'_>) -> Result<()> {
    match result {
        Err(err) if err.is_recoverable() => {
            warn!(error = %err, "sync failed");
            writeln!(out, "{err}")?;
            out.flush()?;
            Ok(())
        }
        other => other,
    }
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn SyncBackend>, filter: Arc<FilterChain>) -> Self {
        Self { backend, filter }
    }

    pub fn backend(&self) -> &Arc<dyn SyncBackend> {
        &self.backend
    }

    pub fn filter(&self) -> &Arc<FilterChain> {
        &self.filter
    }

    /// Propagate one change under `root`.
    pub async fn sync(
        &self,
        rel_path: &str,
        kind: ChangeKind,
        root: &WatchedRoot,
        out: Output<'_>,
    ) -> Result<()> {
        if rel_path.is_empty() {
            return Err(SyncError::InvalidArgument(
                "a relative path is required".to_string(),
            ));
        }
        let exists = root.path().join(display_path(rel_path)).exists();
        let op = sync_op(kind, exists);
        debug!(path = rel_path, ?kind, ?op, "dispatching change");

        let request = SyncRequest {
            root: root.clone(),
            rel_path: rel_path.to_string(),
            op,
        };
        self.backend.sync(&request, &mut *out).await?;
        writeln!(out, "{} {}", op.verb(), display_path(rel_path))?;
        out.flush()?;
        Ok(())
    }

    /// Copy every root, minus ignored paths.
    pub async fn sync_project(&self, roots: &[WatchedRoot], out: Output<'_>) -> Result<()> {
        let filter = Arc::clone(&self.filter);
        let owned = roots.to_vec();
        let project_roots = tokio::task::spawn_blocking(move || {
            owned
                .into_iter()
                .map(|root| {
                    let exclusions = filter.exclusions(root.path());
                    ProjectRoot { root, exclusions }
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| SyncError::Other(anyhow::anyhow!("computing exclusions: {e}")))?;

        let names: Vec<&str> = roots.iter().map(WatchedRoot::display_name).collect();
        info!(roots = ?names, "full sync");
        let request = ProjectSyncRequest {
            roots: project_roots,
        };
        self.backend.sync_project(&request, &mut *out).await?;
        writeln!(out, "Full Sync {}", names.join(", "))?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_paths_become_deletes() {
        assert_eq!(sync_op(ChangeKind::Created, true), SyncOp::Create);
        assert_eq!(sync_op(ChangeKind::Modified, true), SyncOp::Sync);
        assert_eq!(sync_op(ChangeKind::Moved, true), SyncOp::Sync);
        assert_eq!(sync_op(ChangeKind::Deleted, true), SyncOp::Delete);
        assert_eq!(sync_op(ChangeKind::Created, false), SyncOp::Delete);
        assert_eq!(sync_op(ChangeKind::Modified, false), SyncOp::Delete);
    }
}
