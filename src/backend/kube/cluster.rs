// src/backend/kube/cluster.rs

//! Thin `kubectl` wrapper: pod/deployment listings parsed from `-o json`,
//! container exec and deployment command patches.

use std::path::PathBuf;
use std::process::Stdio;

use serde::Deserialize;
use serde_json::json;
use tokio::process::Command;
use tracing::debug;

use crate::errors::{Result, SyncError};

#[derive(Debug, Clone, Deserialize)]
struct List<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Metadata {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PodSpec {
    #[serde(default)]
    pub containers: Vec<ContainerSpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContainerSpec {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct StateReason {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ContainerState {
    #[serde(default)]
    pub waiting: Option<StateReason>,
    #[serde(default)]
    pub terminated: Option<StateReason>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub last_state: ContainerState,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pod {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: PodSpec,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PodTemplate {
    #[serde(default)]
    pub spec: PodSpec,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DeploymentSpec {
    #[serde(default)]
    pub template: PodTemplate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Deployment {
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: DeploymentSpec,
}

/// One running container whose image matched the prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerRef {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub image: String,
    pub ready: bool,
    /// Why the container is not ready, when known.
    pub reason: Option<String>,
    /// Not ready and currently waiting or terminated, i.e. not just starting.
    pub crashing: bool,
    /// Command from the pod spec.
    pub command: Vec<String>,
}

impl ContainerRef {
    /// Human-readable not-ready reason.
    pub fn not_ready_reason(&self) -> String {
        self.reason.clone().unwrap_or_else(|| "Unknown".to_string())
    }
}

pub fn parse_pods(json: &str) -> Result<Vec<Pod>> {
    let list: List<Pod> = serde_json::from_str(json)
        .map_err(|e| SyncError::Other(anyhow::anyhow!("parsing kubectl pod list: {e}")))?;
    Ok(list.items)
}

pub fn parse_deployments(json: &str) -> Result<Vec<Deployment>> {
    let list: List<Deployment> = serde_json::from_str(json)
        .map_err(|e| SyncError::Other(anyhow::anyhow!("parsing kubectl deployment list: {e}")))?;
    Ok(list.items)
}

/// Containers (with a status) whose image starts with `image_prefix`.
pub fn matching_containers(pods: &[Pod], image_prefix: &str) -> Vec<ContainerRef> {
    let mut out = Vec::new();
    for pod in pods {
        for status in &pod.status.container_statuses {
            if !status.image.starts_with(image_prefix) {
                continue;
            }
            let command = pod
                .spec
                .containers
                .iter()
                .find(|c| c.name == status.name)
                .map(|c| c.command.clone())
                .unwrap_or_default();
            let reason = if status.ready {
                None
            } else {
                let state = &status.state;
                let last = &status.last_state;
                state
                    .waiting
                    .as_ref()
                    .and_then(|w| w.reason.clone())
                    .map(|r| format!("Waiting - {r}"))
                    .or_else(|| {
                        state
                            .terminated
                            .as_ref()
                            .and_then(|t| t.reason.clone())
                            .map(|r| format!("Terminated - {r}"))
                    })
                    .or_else(|| {
                        last.waiting
                            .as_ref()
                            .and_then(|w| w.reason.clone())
                            .map(|r| format!("Waiting - {r}"))
                    })
            };
            let crashing = !status.ready
                && (status.state.waiting.is_some() || status.state.terminated.is_some());
            out.push(ContainerRef {
                namespace: pod.metadata.namespace.clone(),
                pod: pod.metadata.name.clone(),
                container: status.name.clone(),
                image: status.image.clone(),
                ready: status.ready,
                reason,
                crashing,
                command,
            });
        }
    }
    out
}

/// Strategic-merge patch setting (or clearing) one container's command.
pub fn command_patch(container: &str, command: Option<&[String]>) -> serde_json::Value {
    json!({
        "spec": {
            "template": {
                "spec": {
                    "containers": [
                        { "name": container, "command": command }
                    ]
                }
            }
        }
    })
}

/// Result of a command run inside a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub success: bool,
    pub output: String,
}

impl ExecResult {
    /// Exec into a container that cannot run the binary reports success with
    /// this text on some runtimes.
    pub fn usable(&self) -> bool {
        self.success && !self.output.contains("runtime exec failed")
    }
}

#[derive(Debug, Clone)]
pub struct Kubectl {
    program: PathBuf,
    server: Option<String>,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Kubectl {
    pub fn new(server: Option<String>) -> Self {
        Self {
            program: PathBuf::from("kubectl"),
            server,
        }
    }

    /// Use a different `kubectl` executable.
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(server) = &self.server {
            cmd.arg("--server").arg(server);
        }
        cmd.stdin(Stdio::null());
        cmd
    }

    async fn run(&self, args: &[String], target: &str) -> Result<String> {
        debug!(?args, "running kubectl");
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .map_err(|e| SyncError::backend("kubectl", target, format!("failed to start: {e}")))?;
        if !output.status.success() {
            return Err(SyncError::backend(
                "kubectl",
                target,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn list_pods(&self) -> Result<Vec<Pod>> {
        let args = ["get", "pods", "-A", "-o", "json"].map(String::from);
        let json = self.run(&args, "pods").await?;
        parse_pods(&json)
    }

    pub async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>> {
        let args = ["get", "deployments", "-n", namespace, "-o", "json"].map(String::from);
        let json = self.run(&args, namespace).await?;
        parse_deployments(&json)
    }

    pub async fn patch_command(
        &self,
        namespace: &str,
        deployment: &str,
        container: &str,
        command: Option<&[String]>,
    ) -> Result<()> {
        let patch = command_patch(container, command).to_string();
        let args = [
            "patch",
            "deployment",
            deployment,
            "-n",
            namespace,
            "--type",
            "strategic",
            "-p",
            patch.as_str(),
        ]
        .map(String::from);
        self.run(&args, deployment).await.map(|_| ())
    }

    /// Run `argv` in a container. A failing command is not an error; a
    /// failing `kubectl` start is.
    pub async fn exec(&self, target: &ContainerRef, argv: &[String]) -> Result<ExecResult> {
        let output = self
            .command()
            .args([
                "exec",
                "-n",
                target.namespace.as_str(),
                target.pod.as_str(),
                "-c",
                target.container.as_str(),
                "--",
            ])
            .args(argv)
            .output()
            .await
            .map_err(|e| SyncError::backend("kubectl", &target.pod, format!("failed to start: {e}")))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ExecResult {
            success: output.status.success(),
            output: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PODS: &str = r#"{
      "items": [
        {
          "metadata": {"name": "api-7d9", "namespace": "dev"},
          "spec": {"containers": [{"name": "api", "image": "registry/api:1", "command": ["python", "app.py"]}]},
          "status": {"containerStatuses": [{"name": "api", "image": "registry/api:1", "ready": true, "state": {"running": {}}}]}
        },
        {
          "metadata": {"name": "api-x2k", "namespace": "dev"},
          "spec": {"containers": [{"name": "api", "image": "registry/api:1"}]},
          "status": {"containerStatuses": [{"name": "api", "image": "registry/api:1", "ready": false,
                     "state": {"waiting": {"reason": "CrashLoopBackOff"}}}]}
        },
        {
          "metadata": {"name": "db-0", "namespace": "dev"},
          "spec": {"containers": [{"name": "db", "image": "postgres:16"}]},
          "status": {}
        }
      ]
    }"#;

    #[test]
    fn matches_by_image_prefix() {
        let pods = parse_pods(PODS).unwrap();
        let found = matching_containers(&pods, "registry/api");
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].pod, "api-7d9");
        assert!(found[0].ready);
        assert_eq!(found[0].command, vec!["python", "app.py"]);

        assert!(!found[0].crashing);

        assert!(!found[1].ready);
        assert!(found[1].crashing);
        assert_eq!(found[1].not_ready_reason(), "Waiting - CrashLoopBackOff");

        assert!(matching_containers(&pods, "postgres").is_empty());
    }

    #[test]
    fn patch_sets_and_clears_command() {
        let cmd = vec!["/bin/sh".to_string(), "-c".to_string(), "echo devsync".to_string()];
        let set = command_patch("api", Some(&cmd));
        assert_eq!(
            set["spec"]["template"]["spec"]["containers"][0]["command"][2],
            "echo devsync"
        );

        let clear = command_patch("api", None);
        assert!(clear["spec"]["template"]["spec"]["containers"][0]["command"].is_null());
    }

    #[test]
    fn exec_failure_text_is_unusable() {
        let r = ExecResult {
            success: true,
            output: "OCI runtime exec failed: exec failed".to_string(),
        };
        assert!(!r.usable());
    }
}
