// src/filter/vcs.rs

//! Version-control aware filtering.
//!
//! Git is an external collaborator reached through the [`VersionControl`]
//! trait; the production implementation shells out to the `git` CLI. The
//! untracked/ignored listing of a repository is refreshed before every
//! decision, optionally bounded by a TTL (zero by default).

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use tracing::{debug, info, warn};

use crate::backend::rsync::escape_rsync_pattern;
use crate::errors::Result;
use crate::filter::{ChangeFilter, FilterDecision};
use crate::types::EntryKind;
use crate::watch::path_utils::{absolute, is_within};

/// Untracked and ignored entries of one working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepoListing {
    /// Untracked, not ignored files, as absolute paths.
    pub untracked: HashSet<PathBuf>,
    /// Ignored entries relative to the repository root. Directories carry a
    /// trailing `/`.
    pub ignored: Vec<String>,
}

/// Queries a version-control system for a working tree.
pub trait VersionControl: Send + Sync {
    /// Root of the working tree that contains the existing directory `dir`.
    fn discover(&self, dir: &Path) -> Result<Option<PathBuf>>;

    /// Whether `path` (absolute) matches the repository's ignore rules.
    fn is_ignored(&self, repo: &Path, path: &Path) -> Result<bool>;

    /// Current untracked and ignored entries.
    fn listing(&self, repo: &Path) -> Result<RepoListing>;
}

/// `VersionControl` backed by the `git` executable.
#[derive(Debug, Clone, Default)]
pub struct GitCli;

impl GitCli {
    fn git(repo: &Path) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(repo).stdin(Stdio::null());
        cmd
    }

    fn ls_files(repo: &Path, extra: &[&str]) -> Result<Vec<String>> {
        let output = Self::git(repo)
            .args(["ls-files", "--others", "--exclude-standard", "-z"])
            .args(extra)
            .output()
            .with_context(|| format!("running git ls-files in {:?}", repo))?;

        if !output.status.success() {
            return Err(anyhow!(
                "git ls-files failed in {:?}: {}",
                repo,
                String::from_utf8_lossy(&output.stderr).trim()
            )
            .into());
        }

        Ok(output
            .stdout
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
            .collect())
    }
}

impl VersionControl for GitCli {
    fn discover(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let output = match Self::git(dir)
            .args(["rev-parse", "--show-toplevel"])
            .stderr(Stdio::null())
            .output()
        {
            Ok(o) => o,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("git executable not found; version-control filter disabled");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };

        if !output.status.success() {
            return Ok(None);
        }

        let top = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if top.is_empty() {
            return Ok(None);
        }
        Ok(Some(PathBuf::from(top)))
    }

    fn is_ignored(&self, repo: &Path, path: &Path) -> Result<bool> {
        // Relative to `-C repo`, so git never has to reconcile symlinked
        // absolute paths with its resolved worktree.
        let rel = path.strip_prefix(repo).unwrap_or(path);
        let status = Self::git(repo)
            .args(["check-ignore", "-q", "--"])
            .arg(rel)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .with_context(|| format!("running git check-ignore for {:?}", path))?;

        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(anyhow!("git check-ignore failed for {:?} ({status})", path).into()),
        }
    }

    fn listing(&self, repo: &Path) -> Result<RepoListing> {
        let untracked = Self::ls_files(repo, &[])?
            .into_iter()
            .map(|rel| repo.join(rel))
            .collect();
        let ignored = Self::ls_files(repo, &["--ignored", "--directory"])?;
        Ok(RepoListing { untracked, ignored })
    }
}

#[derive(Debug)]
struct RegistryEntry {
    listing: Arc<RepoListing>,
    refreshed_at: Instant,
}

/// Per-repository untracked/ignored listings.
///
/// With a zero TTL every lookup goes back to the collaborator.
#[derive(Debug, Default)]
pub struct IgnoreRegistry {
    ttl: Duration,
    entries: Mutex<HashMap<PathBuf, RegistryEntry>>,
}

impl IgnoreRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh (or reuse, within the TTL) the listing for `repo`.
    pub fn refresh(&self, vc: &dyn VersionControl, repo: &Path) -> Result<Arc<RepoListing>> {
        if !self.ttl.is_zero() {
            if let Ok(entries) = self.entries.lock() {
                if let Some(entry) = entries.get(repo) {
                    if entry.refreshed_at.elapsed() < self.ttl {
                        return Ok(Arc::clone(&entry.listing));
                    }
                }
            }
        }

        let listing = Arc::new(vc.listing(repo)?);
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                repo.to_path_buf(),
                RegistryEntry {
                    listing: Arc::clone(&listing),
                    refreshed_at: Instant::now(),
                },
            );
        }
        Ok(listing)
    }

    /// Last known listings of every repository seen so far.
    pub fn snapshot(&self) -> Vec<(PathBuf, Arc<RepoListing>)> {
        match self.entries.lock() {
            Ok(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), Arc::clone(&v.listing)))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct RepoCache {
    roots: Vec<PathBuf>,
    /// Existing directories known to be outside any repository.
    misses: HashSet<PathBuf>,
}

/// Rejects git internals, ignored files and (optionally) untracked files.
pub struct VcsFilter {
    vc: Arc<dyn VersionControl>,
    registry: IgnoreRegistry,
    repos: Mutex<RepoCache>,
    ignore_untracked: bool,
}

impl std::fmt::Debug for VcsFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VcsFilter")
            .field("ignore_untracked", &self.ignore_untracked)
            .finish_non_exhaustive()
    }
}

impl VcsFilter {
    pub fn new(vc: Arc<dyn VersionControl>, ignore_untracked: bool, ttl: Duration) -> Self {
        Self {
            vc,
            registry: IgnoreRegistry::new(ttl),
            repos: Mutex::new(RepoCache::default()),
            ignore_untracked,
        }
    }

    pub fn git(ignore_untracked: bool) -> Self {
        Self::new(Arc::new(GitCli), ignore_untracked, Duration::ZERO)
    }

    pub fn registry(&self) -> &IgnoreRegistry {
        &self.registry
    }

    /// Find the working tree owning `path`, caching resolved roots.
    pub fn resolve_repo(&self, path: &Path) -> Result<Option<PathBuf>> {
        let abs = absolute(path);

        if let Ok(cache) = self.repos.lock() {
            let known = cache
                .roots
                .iter()
                .filter(|root| is_within(root, &abs))
                .max_by_key(|root| root.components().count());
            if let Some(root) = known {
                return Ok(Some(root.clone()));
            }
        }

        let Some(parent) = existing_dir(&abs) else {
            return Ok(None);
        };

        if let Ok(cache) = self.repos.lock() {
            if cache.misses.contains(&parent) {
                return Ok(None);
            }
        }

        let found = self
            .vc
            .discover(&parent)?
            .map(|top| lexical_root(&parent, top));
        if let Ok(mut cache) = self.repos.lock() {
            match &found {
                Some(root) => {
                    info!("Using git repo: {}", root.display());
                    cache.roots.push(root.clone());
                }
                None => {
                    cache.misses.insert(parent);
                }
            }
        }
        Ok(found)
    }

    /// Untracked/ignored entries under `root`, as root-anchored exclusion
    /// patterns (`/rel/path`, directories with a trailing `/`).
    pub fn exclusions_under(&self, root: &Path) -> Vec<String> {
        let repo = match self.resolve_repo(root) {
            Ok(Some(repo)) => repo,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(root = %root.display(), error = %err, "failed to resolve git repository");
                return Vec::new();
            }
        };

        let listing = match self.registry.refresh(self.vc.as_ref(), &repo) {
            Ok(l) => l,
            Err(err) => {
                warn!(repo = %repo.display(), error = %err, "failed to list untracked files");
                return Vec::new();
            }
        };

        let root = absolute(root);
        let untracked = listing
            .untracked
            .iter()
            .filter(|_| self.ignore_untracked)
            .map(|p| (p.clone(), false));
        let ignored = listing
            .ignored
            .iter()
            .map(|rel| (repo.join(rel.trim_end_matches('/')), rel.ends_with('/')));

        let mut out: Vec<String> = untracked
            .chain(ignored)
            .filter_map(|(abs, is_dir)| {
                let rel = abs.strip_prefix(&root).ok()?;
                if rel.as_os_str().is_empty() {
                    return None;
                }
                let rel = rel.to_string_lossy().replace('\\', "/");
                let rel = escape_rsync_pattern(&rel);
                Some(if is_dir {
                    format!("/{rel}/")
                } else {
                    format!("/{rel}")
                })
            })
            .collect();
        out.sort();
        out
    }
}

impl ChangeFilter for VcsFilter {
    fn name(&self) -> &'static str {
        "version-control"
    }

    fn check(&self, path: &Path, _entry: EntryKind) -> Result<FilterDecision> {
        if path.components().any(|c| c == Component::Normal(".git".as_ref())) {
            return Ok(FilterDecision::suppress("GIT repo internals"));
        }

        let repo = match self.resolve_repo(path) {
            Ok(Some(repo)) => repo,
            Ok(None) => return Ok(FilterDecision::keep()),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "git lookup failed; keeping change");
                return Ok(FilterDecision::keep());
            }
        };

        let listing = match self.registry.refresh(self.vc.as_ref(), &repo) {
            Ok(l) => l,
            Err(err) => {
                warn!(repo = %repo.display(), error = %err, "git listing failed; keeping change");
                return Ok(FilterDecision::keep());
            }
        };

        let abs = absolute(path);
        match self.vc.is_ignored(&repo, &abs) {
            Ok(true) => return Ok(FilterDecision::suppress("file is in .gitignore")),
            Ok(false) => {}
            Err(err) => {
                warn!(path = %abs.display(), error = %err, "git check-ignore failed");
            }
        }

        if self.ignore_untracked && listing.untracked.contains(&abs) {
            return Ok(FilterDecision::suppress("Untracked GIT file"));
        }

        Ok(FilterDecision::keep())
    }
}

/// Express a repository root reported by git (symlinks resolved) in the
/// lexical form of `dir`, the directory it was discovered from. Event paths
/// are never canonicalized, so both sides have to agree on one spelling.
fn lexical_root(dir: &Path, top: PathBuf) -> PathBuf {
    if is_within(&top, dir) {
        return top;
    }
    let Ok(real) = dir.canonicalize() else {
        return top;
    };
    let Ok(suffix) = real.strip_prefix(&top) else {
        return top;
    };
    if !dir.ends_with(suffix) {
        return top;
    }
    match dir.ancestors().nth(suffix.components().count()) {
        Some(lexical) => {
            debug!(real = %top.display(), lexical = %lexical.display(), "repository reached through a symlink");
            lexical.to_path_buf()
        }
        None => top,
    }
}

/// Closest existing directory at or above `path`.
fn existing_dir(path: &Path) -> Option<PathBuf> {
    path.ancestors().find(|p| p.is_dir()).map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory repository: every existing directory under `root` belongs to it.
    struct FakeVcs {
        root: PathBuf,
        untracked: HashSet<PathBuf>,
        ignored: Vec<String>,
        listings: AtomicUsize,
        discoveries: AtomicUsize,
    }

    impl VersionControl for FakeVcs {
        fn discover(&self, dir: &Path) -> Result<Option<PathBuf>> {
            self.discoveries.fetch_add(1, Ordering::SeqCst);
            Ok(is_within(&self.root, dir).then(|| self.root.clone()))
        }

        fn is_ignored(&self, repo: &Path, path: &Path) -> Result<bool> {
            Ok(self
                .ignored
                .iter()
                .any(|rel| is_within(&repo.join(rel.trim_end_matches('/')), path)))
        }

        fn listing(&self, _repo: &Path) -> Result<RepoListing> {
            self.listings.fetch_add(1, Ordering::SeqCst);
            Ok(RepoListing {
                untracked: self.untracked.clone(),
                ignored: self.ignored.clone(),
            })
        }
    }

    fn fixture() -> (tempfile::TempDir, Arc<FakeVcs>) {
        let dir = tempfile::tempdir().unwrap();
        let root = absolute(dir.path());
        std::fs::create_dir_all(root.join("src")).unwrap();
        let vcs = Arc::new(FakeVcs {
            untracked: [root.join("src/scratch.rs")].into_iter().collect(),
            ignored: vec!["target/".to_string()],
            root,
            listings: AtomicUsize::new(0),
            discoveries: AtomicUsize::new(0),
        });
        (dir, vcs)
    }

    #[test]
    fn git_internals_rejected_without_repo_lookup() {
        let (_dir, vcs) = fixture();
        let f = VcsFilter::new(vcs.clone(), true, Duration::ZERO);
        let d = f.check(Path::new("/x/.git/index"), EntryKind::File).unwrap();
        assert_eq!(d.reason.as_deref(), Some("GIT repo internals"));
        assert_eq!(vcs.discoveries.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn untracked_and_ignored_files_rejected() {
        let (_dir, vcs) = fixture();
        let root = vcs.root.clone();
        let f = VcsFilter::new(vcs, true, Duration::ZERO);

        let untracked = f.check(&root.join("src/scratch.rs"), EntryKind::File).unwrap();
        assert_eq!(untracked.reason.as_deref(), Some("Untracked GIT file"));

        let ignored = f.check(&root.join("target/debug/app"), EntryKind::File).unwrap();
        assert_eq!(ignored.reason.as_deref(), Some("file is in .gitignore"));

        assert!(f.check(&root.join("src/main.rs"), EntryKind::File).unwrap().keep);
    }

    #[test]
    fn untracked_kept_when_disabled() {
        let (_dir, vcs) = fixture();
        let root = vcs.root.clone();
        let f = VcsFilter::new(vcs, false, Duration::ZERO);
        assert!(f.check(&root.join("src/scratch.rs"), EntryKind::File).unwrap().keep);
    }

    #[test]
    fn repo_resolved_once_listing_refreshed_every_time() {
        let (_dir, vcs) = fixture();
        let root = vcs.root.clone();
        let f = VcsFilter::new(vcs.clone(), true, Duration::ZERO);

        for _ in 0..3 {
            f.check(&root.join("src/main.rs"), EntryKind::File).unwrap();
        }
        assert_eq!(vcs.discoveries.load(Ordering::SeqCst), 1);
        assert_eq!(vcs.listings.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn ttl_bounds_listing_refreshes() {
        let (_dir, vcs) = fixture();
        let root = vcs.root.clone();
        let f = VcsFilter::new(vcs.clone(), true, Duration::from_secs(60));

        for _ in 0..3 {
            f.check(&root.join("src/main.rs"), EntryKind::File).unwrap();
        }
        assert_eq!(vcs.listings.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn paths_outside_any_repo_are_kept() {
        let (_dir, vcs) = fixture();
        let other = tempfile::tempdir().unwrap();
        let f = VcsFilter::new(vcs, true, Duration::ZERO);
        assert!(f.check(&other.path().join("a.txt"), EntryKind::File).unwrap().keep);
    }

    #[test]
    fn exclusions_are_root_relative() {
        let (_dir, vcs) = fixture();
        let root = vcs.root.clone();
        let f = VcsFilter::new(vcs, true, Duration::ZERO);

        let ex = f.exclusions_under(&root);
        assert_eq!(ex, vec!["/src/scratch.rs".to_string(), "/target/".to_string()]);

        let ex = f.exclusions_under(&root.join("src"));
        assert_eq!(ex, vec!["/scratch.rs".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn repository_root_takes_the_symlinked_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let real = dir.path().join("real");
        std::fs::create_dir_all(real.join("src")).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        let top = real.canonicalize().unwrap();

        assert_eq!(lexical_root(&link.join("src"), top.clone()), link);
        assert_eq!(lexical_root(&link, top.clone()), link);
        assert_eq!(lexical_root(&top.join("src"), top.clone()), top);
    }
}
