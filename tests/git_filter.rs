// tests/git_filter.rs
//
// Version-control filtering against a real `git` repository. Every test
// returns early when git is missing.

use std::path::Path;
use std::process::Command;

use devsync::filter::{ChangeFilter, FilterChain, VcsFilter};
use devsync::types::EntryKind;
use devsync::watch::BasenamePatterns;
use devsync_test_utils::init_tracing;

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .status()
        .unwrap();
    assert!(status.success(), "git {args:?} failed");
}

/// tracked.rs and .gitignore staged, scratch.rs untracked, debug.log and
/// build/ ignored.
fn repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    git(root, &["init", "-q"]);
    std::fs::write(root.join(".gitignore"), "*.log\nbuild/\n").unwrap();
    std::fs::write(root.join("tracked.rs"), "fn main() {}\n").unwrap();
    std::fs::write(root.join("scratch.rs"), "// wip\n").unwrap();
    std::fs::write(root.join("debug.log"), "noise\n").unwrap();
    std::fs::create_dir_all(root.join("build")).unwrap();
    std::fs::write(root.join("build/out.bin"), "bin").unwrap();
    git(root, &["add", ".gitignore", "tracked.rs"]);
    dir
}

fn reason(filter: &VcsFilter, path: &Path) -> Option<String> {
    let d = filter.check(path, EntryKind::File).unwrap();
    assert_eq!(d.keep, d.reason.is_none(), "{path:?}");
    d.reason.as_deref().map(str::to_string)
}

fn assert_git_decisions(root: &Path) {
    let f = VcsFilter::git(true);
    assert_eq!(reason(&f, &root.join("tracked.rs")), None);
    assert_eq!(
        reason(&f, &root.join("scratch.rs")).as_deref(),
        Some("Untracked GIT file")
    );
    assert_eq!(
        reason(&f, &root.join("debug.log")).as_deref(),
        Some("file is in .gitignore")
    );
    assert_eq!(
        reason(&f, &root.join("build/out.bin")).as_deref(),
        Some("file is in .gitignore")
    );
    assert_eq!(
        reason(&f, &root.join(".git/HEAD")).as_deref(),
        Some("GIT repo internals")
    );

    let chain = FilterChain::standard(BasenamePatterns::empty(), VcsFilter::git(true));
    let ex = chain.exclusions(root);
    for rule in ["/scratch.rs", "/debug.log", "/build/"] {
        assert!(ex.contains(&rule.to_string()), "{rule} missing from {ex:?}");
    }
    assert!(!ex.contains(&"/tracked.rs".to_string()), "{ex:?}");
}

#[test]
fn ignored_untracked_and_internal_paths_are_filtered() {
    init_tracing();
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let dir = repo();
    assert_git_decisions(dir.path());
}

#[test]
fn untracked_files_are_kept_when_disabled() {
    init_tracing();
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let dir = repo();
    let f = VcsFilter::git(false);
    assert_eq!(reason(&f, &dir.path().join("scratch.rs")), None);
    assert_eq!(
        reason(&f, &dir.path().join("debug.log")).as_deref(),
        Some("file is in .gitignore")
    );
}

#[cfg(unix)]
#[test]
fn repository_reached_through_a_symlink_is_filtered_the_same() {
    init_tracing();
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let dir = repo();
    let outer = tempfile::tempdir().unwrap();
    let link = outer.path().join("project");
    std::os::unix::fs::symlink(dir.path(), &link).unwrap();
    assert_git_decisions(&link);
}

#[test]
fn paths_outside_a_repository_are_kept() {
    init_tracing();
    if !git_available() {
        eprintln!("git not installed; skipping");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.txt"), "n").unwrap();
    let f = VcsFilter::git(true);
    assert_eq!(reason(&f, &dir.path().join("notes.txt")), None);
}
