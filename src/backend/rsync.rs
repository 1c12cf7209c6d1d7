// src/backend/rsync.rs

//! rsync command construction and execution.
//!
//! All commands run with the watched root as working directory so paths on
//! the command line stay root-relative:
//!
//! - create/modify: `rsync -Rvx <rel> <dest>/`
//! - delete: sync the nearest existing ancestor `A` of the deleted path,
//!   letting only the missing child `N` through:
//!   `rsync -rvx --delete --include=/<N> --exclude=/* ./A/ <dest>/A/`
//! - full sync: `rsync -rvx --exclude-from=- ./ <dest>/`, exclusions on stdin

use std::borrow::Cow;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::backend::{
    BackendFuture, Output, ProjectSyncRequest, SyncBackend, SyncOp, SyncRequest,
};
use crate::errors::{Result, SyncError};
use crate::types::WatchedRoot;
use crate::watch::path_utils::display_path;

/// Extra settings for running rsync through a remote shell.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transport {
    /// Value for `--rsh`; also turns on `--blocking-io`.
    pub rsh: Option<String>,
    /// Environment for the remote-shell helper.
    pub env: Vec<(String, String)>,
}

impl Transport {
    fn flags(&self) -> Vec<String> {
        match &self.rsh {
            Some(rsh) => vec!["--blocking-io".to_string(), format!("--rsh={rsh}")],
            None => Vec::new(),
        }
    }
}

/// One rsync invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub args: Vec<String>,
    /// Fed to rsync's stdin (`--exclude-from=-`).
    pub stdin: Option<String>,
}

fn dest_dir(dest: &str, sub: Option<&str>) -> String {
    let base = dest.trim_end_matches('/');
    let base = if base.is_empty() { "/" } else { base };
    match sub {
        Some(sub) if !sub.is_empty() && sub != "." => format!("{base}/{sub}/"),
        _ if base == "/" => "/".to_string(),
        _ => format!("{base}/"),
    }
}

/// Make a file name safe to use inside an rsync filter rule.
///
/// rsync only treats `\` as an escape when the rule also contains one of
/// `*`, `?` or `[`; names without those are returned unchanged.
pub fn escape_rsync_pattern(name: &str) -> Cow<'_, str> {
    if !name.contains(['*', '?', '[']) {
        return Cow::Borrowed(name);
    }
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if matches!(c, '\\' | '*' | '?' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

/// Command for a created or modified file.
pub fn file_invocation(rel_path: &str, dest: &str, transport: &Transport) -> Invocation {
    let mut args = vec!["-Rvx".to_string()];
    args.extend(transport.flags());
    args.push(display_path(rel_path).to_string());
    args.push(dest_dir(dest, None));
    Invocation { args, stdin: None }
}

/// Command for a path that no longer exists under `root`.
///
/// Walks up from the deleted path to the nearest ancestor that still exists
/// and syncs that directory with `--delete`, restricted to the one missing
/// child on the way down.
pub fn delete_invocation(
    root: &Path,
    rel_path: &str,
    dest: &str,
    transport: &Transport,
) -> Invocation {
    let rel = PathBuf::from(display_path(rel_path));
    let mut ancestor = rel.parent().map(Path::to_path_buf).unwrap_or_default();
    let mut missing = rel.clone();
    while !ancestor.as_os_str().is_empty() && !root.join(&ancestor).is_dir() {
        missing = ancestor.clone();
        ancestor = ancestor.parent().map(Path::to_path_buf).unwrap_or_default();
    }

    let child = missing
        .components()
        .next_back()
        .and_then(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .unwrap_or_default();
    let ancestor = ancestor.to_string_lossy().replace('\\', "/");

    let mut args = vec![
        "-rvx".to_string(),
        "--delete".to_string(),
        format!("--include=/{}", escape_rsync_pattern(&child)),
        "--exclude=/*".to_string(),
    ];
    args.extend(transport.flags());
    if ancestor.is_empty() {
        args.push("./".to_string());
        args.push(dest_dir(dest, None));
    } else {
        args.push(format!("./{ancestor}/"));
        args.push(dest_dir(dest, Some(&ancestor)));
    }
    Invocation { args, stdin: None }
}

/// Command for copying a whole root.
pub fn project_invocation(exclusions: &[String], dest: &str, transport: &Transport) -> Invocation {
    let mut args = vec!["-rvx".to_string(), "--exclude-from=-".to_string()];
    args.extend(transport.flags());
    args.push("./".to_string());
    args.push(dest_dir(dest, None));
    let mut stdin = exclusions.join("\n");
    stdin.push('\n');
    Invocation {
        args,
        stdin: Some(stdin),
    }
}

/// Run rsync in `cwd`. A non-zero exit becomes [`SyncError::Backend`].
pub async fn run_rsync(
    cwd: &Path,
    invocation: &Invocation,
    transport: &Transport,
    target: &str,
) -> Result<()> {
    debug!(cwd = %cwd.display(), args = ?invocation.args, "running rsync");

    let mut cmd = Command::new("rsync");
    cmd.args(&invocation.args)
        .current_dir(cwd)
        .envs(transport.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = cmd
        .spawn()
        .map_err(|e| SyncError::backend("rsync", target, format!("failed to start: {e}")))?;

    if let (Some(input), Some(mut stdin)) = (&invocation.stdin, child.stdin.take()) {
        stdin.write_all(input.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    debug!(
        status = %output.status,
        stdout = %String::from_utf8_lossy(&output.stdout).trim(),
        "rsync finished"
    );

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        };
        Err(SyncError::backend("rsync", target, message))
    }
}

/// Invocation for one change, picking the delete form when needed.
pub fn change_invocation(request: &SyncRequest, dest: &str, transport: &Transport) -> Invocation {
    match request.op {
        SyncOp::Delete => delete_invocation(request.root.path(), &request.rel_path, dest, transport),
        SyncOp::Create | SyncOp::Sync => file_invocation(&request.rel_path, dest, transport),
    }
}

/// Copies to a local directory or an ssh-style `host:path`.
#[derive(Debug, Clone)]
pub struct RsyncBackend {
    destination: String,
    transport: Transport,
}

impl RsyncBackend {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            transport: Transport::default(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }
}

impl SyncBackend for RsyncBackend {
    fn name(&self) -> &'static str {
        "rsync"
    }

    fn sync<'a>(&'a self, request: &'a SyncRequest, _out: Output<'a>) -> BackendFuture<'a> {
        Box::pin(async move {
            let inv = change_invocation(request, &self.destination, &self.transport);
            run_rsync(
                request.root.path(),
                &inv,
                &self.transport,
                display_path(&request.rel_path),
            )
            .await
        })
    }

    fn sync_project<'a>(
        &'a self,
        request: &'a ProjectSyncRequest,
        _out: Output<'a>,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            for pr in &request.roots {
                let inv = project_invocation(&pr.exclusions, &self.destination, &self.transport);
                run_rsync(pr.root.path(), &inv, &self.transport, pr.root.display_name()).await?;
            }
            Ok(())
        })
    }

    fn on_monitor_start<'a>(
        &'a self,
        _roots: &'a [WatchedRoot],
        out: Output<'a>,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            if let Some(parent) = local_parent(&self.destination) {
                if !parent.exists() {
                    writeln!(out, "Destination parent {} does not exist", parent.display())?;
                }
            }
            Ok(())
        })
    }

    fn on_monitor_exit<'a>(&'a self, _out: Output<'a>) -> BackendFuture<'a> {
        Box::pin(async { Ok(()) })
    }
}

/// Parent directory of a local destination; `None` for remote targets.
fn local_parent(dest: &str) -> Option<PathBuf> {
    if let Some(colon) = dest.find(':') {
        if !dest[..colon].contains('/') {
            return None;
        }
    }
    let path = Path::new(dest.trim_end_matches('/'));
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
