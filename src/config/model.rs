// src/config/model.rs

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::watch::path_utils::clean;

/// File name looked up in every candidate directory.
pub const CONFIG_FILE_NAME: &str = "devsync.toml";

pub const DEFAULT_POD_TIMEOUT_SECS: u64 = 30;

/// A `devsync.toml` file as read from disk.
///
/// ```toml
/// [devsync]
/// additional_sources = ["../shared-lib"]
/// destination = "kube://registry.local/team/api:/srv/app"
/// pod_timeout = 60
/// container_command = "python -m api"
/// ignore_files = ["*.log", "secrets.env"]
/// ignore_untracked = false
/// ```
///
/// Everything is optional; a file without a `[devsync]` table contributes
/// nothing.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub devsync: DevsyncSection,
}

/// `[devsync]` table.
///
/// Scalars are `Option` so the merge can tell "not set" from "set to the
/// default".
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DevsyncSection {
    /// Extra trees to watch, relative to the file's directory unless absolute.
    pub additional_sources: Vec<String>,

    pub destination: Option<String>,

    /// Seconds to wait for pods to roll after a supervisor toggle.
    pub pod_timeout: Option<u64>,

    /// Replaces the supervised container command.
    pub container_command: Option<String>,

    /// Base-name glob patterns that are never synchronized.
    pub ignore_files: Vec<String>,

    pub ignore_untracked: Option<bool>,
}

/// Merged configuration of every discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub additional_sources: Vec<PathBuf>,
    pub destination: Option<String>,
    pub pod_timeout: u64,
    pub container_command: Option<String>,
    pub ignore_files: Vec<String>,
    pub ignore_untracked: bool,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            additional_sources: Vec::new(),
            destination: None,
            pod_timeout: DEFAULT_POD_TIMEOUT_SECS,
            container_command: None,
            ignore_files: Vec::new(),
            ignore_untracked: true,
        }
    }
}

impl ProjectConfig {
    /// Fold one file's `[devsync]` table into the merged view.
    ///
    /// Lists are unioned in first-seen order. Scalars take the value of the
    /// later file when it sets a non-default one.
    pub fn merge(&mut self, section: DevsyncSection, base_dir: &Path) {
        for src in section.additional_sources {
            let path = Path::new(&src);
            let resolved = if path.is_absolute() {
                clean(path)
            } else {
                clean(&base_dir.join(path))
            };
            if !self.additional_sources.contains(&resolved) {
                self.additional_sources.push(resolved);
            }
        }

        for pattern in section.ignore_files {
            if !self.ignore_files.contains(&pattern) {
                self.ignore_files.push(pattern);
            }
        }

        if let Some(dest) = section.destination.filter(|d| !d.trim().is_empty()) {
            self.destination = Some(dest);
        }
        if let Some(timeout) = section
            .pod_timeout
            .filter(|t| *t != DEFAULT_POD_TIMEOUT_SECS)
        {
            self.pod_timeout = timeout;
        }
        if let Some(cmd) = section.container_command.filter(|c| !c.trim().is_empty()) {
            self.container_command = Some(cmd);
        }
        if let Some(flag) = section.ignore_untracked {
            self.ignore_untracked = flag;
        }
    }

    pub fn pod_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_timeout)
    }
}
