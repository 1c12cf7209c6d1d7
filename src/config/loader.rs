// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::model::{CONFIG_FILE_NAME, ConfigFile, ProjectConfig};
use crate::errors::Result;
use crate::watch::path_utils::absolute;

/// Load one configuration file.
///
/// Only TOML deserialization happens here; merging and validation are done
/// by [`read_project_config`] and [`crate::config::validate_setup`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let config: ConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Directories searched for `devsync.toml`: the current directory, then each
/// source candidate. Duplicates (after resolution) are dropped.
pub fn candidate_dirs<S: AsRef<str>>(sources: &[S]) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let all = std::iter::once(".").chain(sources.iter().map(|s| s.as_ref()));
    for dir in all {
        let abs = absolute(Path::new(dir));
        if !dirs.contains(&abs) {
            dirs.push(abs);
        }
    }
    dirs
}

/// Read and merge `devsync.toml` from each directory, in order.
///
/// Files that cannot be read or parsed are skipped with a notice; a
/// directory without a config file contributes nothing.
pub fn read_project_config(dirs: &[PathBuf]) -> ProjectConfig {
    let mut merged = ProjectConfig::default();

    for dir in dirs {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.is_file() {
            continue;
        }

        match load_from_path(&path) {
            Ok(file) => {
                debug!(path = %path.display(), "merging config file");
                merged.merge(file.devsync, dir);
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable config file");
                println!("Skipping {} - {}", path.display(), err);
            }
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_start_with_cwd_and_dedupe() {
        let dirs = candidate_dirs(&[".", "src", "./src"]);
        let cwd = absolute(Path::new("."));
        assert_eq!(dirs, vec![cwd.clone(), cwd.join("src")]);
    }

    #[test]
    fn malformed_files_are_skipped() {
        let good = tempfile::tempdir().unwrap();
        let bad = tempfile::tempdir().unwrap();
        fs::write(
            good.path().join(CONFIG_FILE_NAME),
            "[devsync]\ndestination = \"/out\"\n",
        )
        .unwrap();
        fs::write(bad.path().join(CONFIG_FILE_NAME), "[devsync\n").unwrap();

        let merged =
            read_project_config(&[good.path().to_path_buf(), bad.path().to_path_buf()]);
        assert_eq!(merged.destination.as_deref(), Some("/out"));
    }
}
