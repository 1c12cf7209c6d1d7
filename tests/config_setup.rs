// tests/config_setup.rs

use devsync::config::{
    Destination, ProjectConfig, Targets, candidate_dirs, read_project_config, resolve_targets,
    validate_setup,
};
use devsync::errors::SyncError;
use devsync_test_utils::ConfigBuilder;

fn targets(sources: &[&str], dest: &str) -> Targets {
    Targets {
        sources: sources.iter().map(|s| s.to_string()).collect(),
        destination: Some(dest.to_string()),
    }
}

fn s(p: &std::path::Path) -> String {
    p.to_string_lossy().into_owned()
}

#[test]
fn more_specific_file_wins_for_scalars_and_lists_union() {
    let outer = tempfile::tempdir().unwrap();
    let inner = outer.path().join("svc");
    std::fs::create_dir_all(&inner).unwrap();

    ConfigBuilder::new()
        .destination("kube://api:/srv")
        .ignore_file("*.log")
        .additional_source("shared")
        .write_to(outer.path())
        .unwrap();
    ConfigBuilder::new()
        .destination("me@box:/srv/app")
        .ignore_file("*.log")
        .ignore_file("node_modules")
        .pod_timeout(90)
        .ignore_untracked(false)
        .write_to(&inner)
        .unwrap();

    let cfg = read_project_config(&[outer.path().to_path_buf(), inner.clone()]);
    assert_eq!(cfg.destination.as_deref(), Some("me@box:/srv/app"));
    assert_eq!(cfg.ignore_files, vec!["*.log", "node_modules"]);
    assert_eq!(cfg.additional_sources, vec![outer.path().join("shared")]);
    assert_eq!(cfg.pod_timeout, 90);
    assert!(!cfg.ignore_untracked);
}

#[test]
fn config_destination_is_used_for_a_single_source_argument() {
    let dir = tempfile::tempdir().unwrap();
    ConfigBuilder::new()
        .destination("kube://registry/api:/srv")
        .write_to(dir.path())
        .unwrap();

    let src = s(dir.path());
    let cfg = read_project_config(&candidate_dirs(&[src.clone()])[1..]);
    let t = resolve_targets(&[src.clone()], &cfg);
    assert_eq!(t.sources, vec![src]);

    let setup = validate_setup(&t, &cfg).unwrap();
    assert_eq!(
        setup.destination,
        Destination::RemoteExec {
            image_prefix: "registry/api".to_string(),
            dir: "/srv".to_string(),
        }
    );
}

#[test]
fn missing_sources_are_dropped_and_reported() {
    let dir = tempfile::tempdir().unwrap();
    let present = s(dir.path());
    let absent = s(&dir.path().join("nope"));
    let dest = tempfile::tempdir().unwrap();

    let setup = validate_setup(
        &targets(&[&present, &absent], &s(dest.path())),
        &ProjectConfig::default(),
    )
    .unwrap();
    assert_eq!(setup.roots.len(), 1);
    assert_eq!(setup.roots[0].path(), dir.path());
    assert_eq!(setup.missing, vec![absent]);
}

#[test]
fn no_existing_source_is_a_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let absent = s(&dir.path().join("nope"));
    let err = validate_setup(&targets(&[&absent], "/tmp/out"), &ProjectConfig::default())
        .unwrap_err();
    match err {
        SyncError::Validation(msg) => {
            assert!(msg.starts_with("No source file/dirs found"));
            assert!(msg.contains(&absent));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn nested_destination_and_source_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let inside = s(&dir.path().join("out"));
    let err = validate_setup(&targets(&[&s(dir.path())], &inside), &ProjectConfig::default())
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(ref m) if m.contains("is inside source")));

    let src = dir.path().join("project");
    std::fs::create_dir_all(&src).unwrap();
    let err = validate_setup(&targets(&[&s(&src)], &s(dir.path())), &ProjectConfig::default())
        .unwrap_err();
    assert!(matches!(err, SyncError::Validation(ref m) if m.contains("is inside destination")));
}

#[test]
fn unknown_scheme_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = validate_setup(
        &targets(&[&s(dir.path())], "s3://bucket/path"),
        &ProjectConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, SyncError::UnknownBackend(ref scheme) if scheme == "s3"));
}

#[test]
fn remote_destinations_skip_nesting_checks() {
    let dir = tempfile::tempdir().unwrap();
    let setup = validate_setup(
        &targets(&[&s(dir.path())], "me@box:/srv/app"),
        &ProjectConfig::default(),
    )
    .unwrap();
    assert_eq!(setup.destination.backend_name(), "rsync");
    assert_eq!(setup.destination.local_path(), None);
}
