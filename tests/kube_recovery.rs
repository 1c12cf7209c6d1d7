// tests/kube_recovery.rs
//
// Drives the cluster backend's startup against a scripted `kubectl` that
// serves canned JSON and records every call. Unix only (shell script).
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use devsync::backend::kube::cluster::Kubectl;
use devsync::backend::{BackendOptions, KubeBackend, SyncBackend};
use devsync_test_utils::{SharedBuffer, init_tracing, with_timeout};

const CRASHING_PODS: &str = r#"{"items": [{
  "metadata": {"name": "api-crash", "namespace": "dev"},
  "spec": {"containers": [{"name": "api", "image": "registry/api:1", "command": ["python", "app.py"]}]},
  "status": {"containerStatuses": [{"name": "api", "image": "registry/api:1", "ready": false,
             "state": {"waiting": {"reason": "CrashLoopBackOff"}}}]}
}]}"#;

const RECOVERED_PODS: &str = r#"{"items": [{
  "metadata": {"name": "api-5f6", "namespace": "dev"},
  "spec": {"containers": [{"name": "api", "image": "registry/api:1",
           "command": ["/bin/sh", "-c", "echo uncrash && sleep 10m"]}]},
  "status": {"containerStatuses": [{"name": "api", "image": "registry/api:1", "ready": true,
             "state": {"running": {}}}]}
}]}"#;

const DEPLOYMENTS: &str = r#"{"items": [{
  "metadata": {"name": "api", "namespace": "dev"},
  "spec": {"template": {"spec": {"containers": [{"name": "api", "image": "registry/api:1"}]}}}
}]}"#;

/// Pods come from `pods_after.json` once a patch happened (if that file
/// exists); exec fails for the crashing pod only.
fn fake_kubectl(dir: &Path, recovers: bool) -> PathBuf {
    std::fs::write(dir.join("pods_before.json"), CRASHING_PODS).unwrap();
    if recovers {
        std::fs::write(dir.join("pods_after.json"), RECOVERED_PODS).unwrap();
    }
    std::fs::write(dir.join("deployments.json"), DEPLOYMENTS).unwrap();

    let script = format!(
        r#"#!/bin/sh
DIR='{dir}'
echo "$*" >> "$DIR/calls.log"
case "$1" in
  get)
    if [ "$2" = "pods" ]; then
      if [ -f "$DIR/patched" ] && [ -f "$DIR/pods_after.json" ]; then
        cat "$DIR/pods_after.json"
      else
        cat "$DIR/pods_before.json"
      fi
    else
      cat "$DIR/deployments.json"
    fi ;;
  patch)
    touch "$DIR/patched" ;;
  exec)
    if [ "$4" = "api-crash" ]; then
      echo 'error: container not running' >&2
      exit 1
    fi ;;
esac
exit 0
"#,
        dir = dir.display()
    );
    let path = dir.join("kubectl");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn backend(kubectl: PathBuf, pod_timeout: Duration) -> KubeBackend {
    let options = BackendOptions {
        pod_timeout,
        ..BackendOptions::default()
    };
    KubeBackend::new("registry/api".to_string(), "/srv".to_string(), options)
        .unwrap()
        .with_kubectl(Kubectl::default().with_program(kubectl))
}

fn patches(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .unwrap()
        .lines()
        .filter(|l| l.starts_with("patch "))
        .map(str::to_string)
        .collect()
}

// Both scenarios live in one test: the script is written and then executed,
// and a concurrent fork from another test thread could hold it open.
#[tokio::test]
async fn crashing_containers_are_parked_or_restored() {
    init_tracing();

    // Pod rolls after the patch: recovered, then detected and reported.
    let dir = tempfile::tempdir().unwrap();
    let kube = backend(fake_kubectl(dir.path(), true), Duration::from_secs(5));
    let mut out = SharedBuffer::new();
    with_timeout(kube.on_monitor_start(&[], &mut out))
        .await
        .unwrap();

    let lines = out.lines();
    assert!(
        lines.contains(&"Pod api-crash, is crashing, attempting deployment recovery".to_string()),
        "{lines:?}"
    );
    assert!(lines.contains(&"Deployment recovered".to_string()), "{lines:?}");
    assert!(
        lines.contains(&"\u{1f7e0}  api-5f6 - ready: still sleeping, having recovered from crashed state".to_string()),
        "{lines:?}"
    );
    let p = patches(dir.path());
    assert_eq!(p.len(), 1, "{p:?}");
    assert!(p[0].contains("echo uncrash && sleep 10m"), "{p:?}");

    // Pod never rolls: the original command is put back.
    let dir = tempfile::tempdir().unwrap();
    let kube = backend(fake_kubectl(dir.path(), false), Duration::from_secs(1));
    let mut out = SharedBuffer::new();
    with_timeout(kube.on_monitor_start(&[], &mut out))
        .await
        .unwrap();

    let lines = out.lines();
    assert!(lines.contains(&"Pod api-crash recovery failed".to_string()), "{lines:?}");
    assert!(
        lines.contains(&"\u{1f534}  api-crash - ready: false - Waiting - CrashLoopBackOff".to_string()),
        "{lines:?}"
    );
    let p = patches(dir.path());
    assert_eq!(p.len(), 2, "{p:?}");
    assert!(p[0].contains("echo uncrash"), "{p:?}");
    assert!(p[1].contains(r#""command":["python","app.py"]"#), "{p:?}");
}
