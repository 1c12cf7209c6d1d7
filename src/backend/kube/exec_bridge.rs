// src/backend/kube/exec_bridge.rs

//! Remote-shell helper for rsync.
//!
//! rsync is started with `--rsh="<devsync> kube-exec"` and a destination of
//! the form `devsync:<dir>`. It then invokes the helper as
//! `<devsync> kube-exec [-l user] devsync rsync --server ...`; the helper drops
//! the host part and runs the rest inside the container selected through
//! environment variables.

use std::process::{Command, Stdio};

use anyhow::{Context, anyhow};

use crate::backend::kube::cluster::ContainerRef;

pub const ENV_POD: &str = "DEVSYNC_KUBE_POD";
pub const ENV_NAMESPACE: &str = "DEVSYNC_KUBE_NAMESPACE";
pub const ENV_CONTAINER: &str = "DEVSYNC_KUBE_CONTAINER";
pub const ENV_SERVER: &str = "DEVSYNC_KUBE_SERVER";

/// Host name rsync sees; never resolved.
pub const BRIDGE_HOST: &str = "devsync";

/// Container selection passed from the backend to the helper process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeTarget {
    pub pod: String,
    pub namespace: String,
    pub container: String,
    pub server: Option<String>,
}

impl BridgeTarget {
    pub fn for_container(c: &ContainerRef, server: Option<&str>) -> Self {
        Self {
            pod: c.pod.clone(),
            namespace: c.namespace.clone(),
            container: c.container.clone(),
            server: server.map(str::to_string),
        }
    }

    /// Environment for the helper process.
    pub fn env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            (ENV_POD.to_string(), self.pod.clone()),
            (ENV_NAMESPACE.to_string(), self.namespace.clone()),
            (ENV_CONTAINER.to_string(), self.container.clone()),
        ];
        if let Some(server) = &self.server {
            env.push((ENV_SERVER.to_string(), server.clone()));
        }
        env
    }

    /// Read the selection back from a lookup function (the process
    /// environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} is not set"));
        Ok(Self {
            pod: get(ENV_POD)?,
            namespace: get(ENV_NAMESPACE)?,
            container: get(ENV_CONTAINER)?,
            server: lookup(ENV_SERVER).filter(|s| !s.is_empty()),
        })
    }

    /// `kubectl` arguments for running `args` (as passed by rsync) in the
    /// container.
    pub fn kubectl_args(&self, args: &[String]) -> Vec<String> {
        let mut rest = args;
        // rsync passes "-l <user>" before the host when the target has a user.
        while let [flag, _, tail @ ..] = rest {
            if flag != "-l" {
                break;
            }
            rest = tail;
        }
        // Host.
        if let [_, tail @ ..] = rest {
            rest = tail;
        }

        let mut out = Vec::new();
        if let Some(server) = &self.server {
            out.push("--server".to_string());
            out.push(server.clone());
        }
        out.extend(
            [
                "exec",
                "-i",
                "-n",
                self.namespace.as_str(),
                self.pod.as_str(),
                "-c",
                self.container.as_str(),
                "--",
            ]
            .map(String::from),
        );
        out.extend(rest.iter().cloned());
        out
    }
}

/// Value for rsync's `--rsh`: this executable with the hidden subcommand.
pub fn helper_command() -> anyhow::Result<String> {
    let exe = std::env::current_exe().context("locating the devsync executable")?;
    Ok(format!("{} kube-exec", exe.display()))
}

/// Entry point of `devsync kube-exec`. Returns kubectl's exit code.
pub fn run_bridge(args: &[String]) -> anyhow::Result<i32> {
    let target = BridgeTarget::from_lookup(|k| std::env::var(k).ok())?;
    let status = Command::new("kubectl")
        .args(target.kubectl_args(args))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .context("running kubectl exec")?;
    Ok(status.code().unwrap_or(1))
}
