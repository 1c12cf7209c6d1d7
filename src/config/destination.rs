// src/config/destination.rs

//! Destination addressing.
//!
//! - bare path or `user@host:path` -> [`Destination::LocalCopy`] (rsync)
//! - `kube://<image-prefix>:<dir>` -> [`Destination::RemoteExec`]
//! - any other `scheme://` -> unknown backend

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::errors::{Result, SyncError};

const KUBE_SCHEME: &str = "kube://";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Target handed to rsync as-is.
    LocalCopy { target: String },
    /// Containers whose image starts with `image_prefix`; files land in `dir`.
    RemoteExec { image_prefix: String, dir: String },
}

impl Destination {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(SyncError::Validation("No destination given".to_string()));
        }

        if let Some(rest) = strip_kube_scheme(raw) {
            // Image names may carry a registry port, so split at the last ':'.
            let (image_prefix, dir) = match rest.rsplit_once(':') {
                Some((image, dir)) if !dir.is_empty() => (image, dir),
                Some((image, _)) => (image, "."),
                None => (rest, "."),
            };
            if image_prefix.is_empty() {
                return Err(SyncError::Validation(format!(
                    "missing image name in destination '{raw}'"
                )));
            }
            return Ok(Destination::RemoteExec {
                image_prefix: image_prefix.to_string(),
                dir: dir.to_string(),
            });
        }

        if let Some((scheme, _)) = raw.split_once("://") {
            return Err(SyncError::UnknownBackend(scheme.to_string()));
        }

        Ok(Destination::LocalCopy {
            target: raw.to_string(),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Destination::LocalCopy { .. } => "rsync",
            Destination::RemoteExec { .. } => "kube",
        }
    }

    /// The filesystem path for a destination on this machine, `None` for
    /// remote and container targets.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            Destination::LocalCopy { target } if !is_remote_target(target) => {
                Some(PathBuf::from(target))
            }
            _ => None,
        }
    }
}

impl FromStr for Destination {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        Destination::parse(s)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::LocalCopy { target } => f.write_str(target),
            Destination::RemoteExec { image_prefix, dir } => write!(f, "{image_prefix}:{dir}"),
        }
    }
}

/// The part after a case-insensitive `kube://`.
fn strip_kube_scheme(raw: &str) -> Option<&str> {
    let scheme = raw.get(..KUBE_SCHEME.len())?;
    if scheme.eq_ignore_ascii_case(KUBE_SCHEME) {
        raw.get(KUBE_SCHEME.len()..)
    } else {
        None
    }
}

/// rsync treats `host:path` as remote when the ':' comes before any '/'.
fn is_remote_target(target: &str) -> bool {
    match target.find(':') {
        Some(colon) => !target[..colon].contains('/') && !Path::new(target).exists(),
        None => false,
    }
}

/// True if the argument looks like a destination rather than a source: a
/// `kube://` address or an ssh-style `user@host:path`.
pub fn has_destination_optics(arg: &str) -> bool {
    let lower = arg.to_ascii_lowercase();
    if lower.starts_with(KUBE_SCHEME) {
        return true;
    }

    let mut is_ssh = arg.contains(":/") || arg.contains(":~");
    if let Some((user_host, _)) = arg.split_once(':') {
        is_ssh = is_ssh || user_host.contains('@');
    }
    is_ssh
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kube_destination_splits_at_last_colon() {
        let d = Destination::parse("kube://registry:5000/team/api:/srv/app").unwrap();
        assert_eq!(
            d,
            Destination::RemoteExec {
                image_prefix: "registry:5000/team/api".to_string(),
                dir: "/srv/app".to_string(),
            }
        );
        assert_eq!(d.backend_name(), "kube");
    }

    #[test]
    fn kube_destination_without_dir_defaults_to_dot() {
        match Destination::parse("KUBE://api").unwrap() {
            Destination::RemoteExec { image_prefix, dir } => {
                assert_eq!(image_prefix, "api");
                assert_eq!(dir, ".");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn other_schemes_are_unknown_backends() {
        let err = Destination::parse("s3://bucket/path").unwrap_err();
        assert!(matches!(err, SyncError::UnknownBackend(ref s) if s == "s3"));
    }

    #[test]
    fn plain_and_ssh_targets_are_local_copy() {
        let d = Destination::parse("../out").unwrap();
        assert_eq!(d.local_path(), Some(PathBuf::from("../out")));

        let d = Destination::parse("me@box:/srv/app").unwrap();
        assert_eq!(d.backend_name(), "rsync");
        assert_eq!(d.local_path(), None);
    }

    #[test]
    fn non_ascii_targets_parse() {
        let d = Destination::parse("/tmp/日本").unwrap();
        assert_eq!(d.local_path(), Some(PathBuf::from("/tmp/日本")));

        let d = Destination::parse("kube://アプリ:/srv/データ").unwrap();
        assert_eq!(
            d,
            Destination::RemoteExec {
                image_prefix: "アプリ".to_string(),
                dir: "/srv/データ".to_string(),
            }
        );
    }

    #[test]
    fn destination_optics() {
        assert!(has_destination_optics("kube://api:/srv"));
        assert!(has_destination_optics("me@box:app"));
        assert!(has_destination_optics("box:/srv/app"));
        assert!(has_destination_optics("box:~/app"));
        assert!(!has_destination_optics("src"));
        assert!(!has_destination_optics("../out"));
    }
}
