// src/config/validate.rs

use std::path::Path;

use tracing::debug;

use crate::config::destination::{Destination, has_destination_optics};
use crate::config::model::ProjectConfig;
use crate::errors::{Result, SyncError};
use crate::types::WatchedRoot;
use crate::watch::path_utils::{absolute, is_within};

/// Sources and destination as spelled on the command line, after applying
/// the configured destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    pub sources: Vec<String>,
    pub destination: Option<String>,
}

/// Split positional arguments into sources and a destination.
///
/// - no arguments: source `.`, configured destination
/// - one argument that does not look like a destination while the config
///   names one: the argument is the source
/// - one argument otherwise: it is the destination, source `.`
/// - more: the last one is the destination
pub fn resolve_targets(positional: &[String], config: &ProjectConfig) -> Targets {
    match positional {
        [] => Targets {
            sources: vec![".".to_string()],
            destination: config.destination.clone(),
        },
        [only] if config.destination.is_some() && !has_destination_optics(only) => Targets {
            sources: vec![only.clone()],
            destination: config.destination.clone(),
        },
        [only] => Targets {
            sources: vec![".".to_string()],
            destination: Some(only.clone()),
        },
        [sources @ .., dest] => Targets {
            sources: sources.to_vec(),
            destination: Some(dest.clone()),
        },
    }
}

/// Everything the monitor needs, checked.
#[derive(Debug, Clone)]
pub struct Setup {
    pub roots: Vec<WatchedRoot>,
    pub destination: Destination,
    /// Sources that did not exist and were left out.
    pub missing: Vec<String>,
}

/// Check startup preconditions and build the watched roots.
///
/// Fails when no source exists, the destination cannot be parsed, or a local
/// destination and a source contain one another.
pub fn validate_setup(targets: &Targets, config: &ProjectConfig) -> Result<Setup> {
    let mut candidates: Vec<String> = config
        .additional_sources
        .iter()
        .map(|p| display_relative(p))
        .collect();
    for src in &targets.sources {
        if !candidates.contains(src) {
            candidates.push(src.clone());
        }
    }

    let (present, missing): (Vec<String>, Vec<String>) =
        candidates.into_iter().partition(|p| Path::new(p).exists());

    let mut roots: Vec<WatchedRoot> = Vec::new();
    for src in present {
        let root = WatchedRoot::new(&src);
        if !roots.iter().any(|r| r.path() == root.path()) {
            roots.push(root);
        }
    }
    if roots.is_empty() {
        let mut msg = "No source file/dirs found".to_string();
        if !missing.is_empty() {
            msg.push_str(&format!(" (not found: {})", missing.join(", ")));
        }
        return Err(SyncError::Validation(msg));
    }

    let raw = targets.destination.as_deref().unwrap_or_default();
    let destination = Destination::parse(raw)?;

    if let Some(dest) = destination.local_path() {
        let dest = absolute(&dest);
        for root in &roots {
            if is_within(root.path(), &dest) {
                return Err(SyncError::Validation(format!(
                    "destination '{}' is inside source '{}'",
                    dest.display(),
                    root
                )));
            }
            if is_within(&dest, root.path()) {
                return Err(SyncError::Validation(format!(
                    "source '{}' is inside destination '{}'",
                    root,
                    dest.display()
                )));
            }
        }
    }

    debug!(roots = roots.len(), backend = destination.backend_name(), "setup validated");
    Ok(Setup {
        roots,
        destination,
        missing,
    })
}

/// Paths under the working directory are shown relative to it.
fn display_relative(path: &Path) -> String {
    let cwd = absolute(Path::new("."));
    match path.strip_prefix(&cwd) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_arguments_watch_cwd() {
        let cfg = ProjectConfig {
            destination: Some("/out".to_string()),
            ..ProjectConfig::default()
        };
        let t = resolve_targets(&[], &cfg);
        assert_eq!(t.sources, vec!["."]);
        assert_eq!(t.destination.as_deref(), Some("/out"));
    }

    #[test]
    fn single_argument_is_source_when_config_has_destination() {
        let cfg = ProjectConfig {
            destination: Some("kube://api:/srv".to_string()),
            ..ProjectConfig::default()
        };
        let t = resolve_targets(&args(&["src"]), &cfg);
        assert_eq!(t.sources, vec!["src"]);
        assert_eq!(t.destination.as_deref(), Some("kube://api:/srv"));

        let t = resolve_targets(&args(&["me@box:/srv"]), &cfg);
        assert_eq!(t.sources, vec!["."]);
        assert_eq!(t.destination.as_deref(), Some("me@box:/srv"));
    }

    #[test]
    fn single_argument_is_destination_without_config() {
        let t = resolve_targets(&args(&["../out"]), &ProjectConfig::default());
        assert_eq!(t.sources, vec!["."]);
        assert_eq!(t.destination.as_deref(), Some("../out"));
    }

    #[test]
    fn last_argument_is_destination() {
        let t = resolve_targets(&args(&["a", "b", "/out"]), &ProjectConfig::default());
        assert_eq!(t.sources, vec!["a", "b"]);
        assert_eq!(t.destination.as_deref(), Some("/out"));
    }
}
