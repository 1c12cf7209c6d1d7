// src/backend/kube/mod.rs

//! Sync into running cluster containers.
//!
//! Every operation re-lists pods, so containers that restart or scale while
//! watching are picked up. Not-ready containers are skipped with a printed
//! reason; containers without rsync get it installed through the detected
//! image distro before the first copy.
//!
//! On start, crash-looping containers that refuse exec are parked on a
//! sleeping placeholder command until their pod rolls, so the remaining
//! startup steps (distro detection, rsync install, supervisor) can reach
//! them. If the pod does not roll within the pod timeout the original
//! command is put back.

pub mod cluster;
pub mod distro;
pub mod exec_bridge;

use std::collections::BTreeSet;
use std::future::Future;
use std::io::Write;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::backend::rsync::{Transport, change_invocation, project_invocation, run_rsync};
use crate::backend::{
    BackendFuture, BackendOptions, Output, ProjectSyncRequest, SyncBackend, SyncRequest,
};
use crate::errors::{Result, SyncError};
use crate::types::WatchedRoot;
use crate::watch::path_utils::display_path;

use cluster::{ContainerRef, Kubectl, matching_containers};
use distro::{Distro, check_can_exec, is_recovering, is_supervised, recovery_command};
use exec_bridge::{BRIDGE_HOST, BridgeTarget, helper_command};

const POD_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Copies into every ready container whose image starts with a prefix.
#[derive(Debug)]
pub struct KubeBackend {
    image_prefix: String,
    dir: String,
    kubectl: Kubectl,
    options: BackendOptions,
    helper: String,
    distro: Mutex<Distro>,
    supervised: AtomicBool,
}

impl KubeBackend {
    pub fn new(image_prefix: String, dir: String, options: BackendOptions) -> Result<Self> {
        let helper = helper_command()?;
        Ok(Self {
            image_prefix,
            dir,
            kubectl: Kubectl::new(options.kube_host.clone()),
            options,
            helper,
            distro: Mutex::new(Distro::Generic),
            supervised: AtomicBool::new(false),
        })
    }

    /// Talk to the cluster through a different `kubectl`.
    pub fn with_kubectl(mut self, kubectl: Kubectl) -> Self {
        self.kubectl = kubectl;
        self
    }

    pub fn image_prefix(&self) -> &str {
        &self.image_prefix
    }

    fn distro(&self) -> Distro {
        self.distro.lock().map(|d| *d).unwrap_or_default()
    }

    fn rsync_destination(&self) -> String {
        format!("{BRIDGE_HOST}:{}", self.dir)
    }

    fn transport_for(&self, c: &ContainerRef) -> Transport {
        Transport {
            rsh: Some(self.helper.clone()),
            env: BridgeTarget::for_container(c, self.kubectl.server()).env(),
        }
    }

    async fn containers(&self) -> Result<Vec<ContainerRef>> {
        let pods = self.kubectl.list_pods().await?;
        Ok(matching_containers(&pods, &self.image_prefix))
    }

    /// Ready containers with a usable rsync; the rest are reported on `out`.
    async fn sync_targets(&self, label: &str, out: Output<'_>) -> Result<Vec<ContainerRef>> {
        let mut targets = Vec::new();
        for c in self.containers().await? {
            if !c.ready {
                writeln!(
                    out,
                    "{label} will not sync in {}, container isn't ready: {}",
                    c.pod,
                    c.not_ready_reason()
                )?;
                continue;
            }
            if !self.ensure_rsync(&c).await {
                writeln!(out, "{label} failed to rsync into {}", c.pod)?;
                continue;
            }
            targets.push(c);
        }
        Ok(targets)
    }

    /// Check for rsync in the container, installing it once if missing.
    async fn ensure_rsync(&self, c: &ContainerRef) -> bool {
        let distro = self.distro();
        match self.kubectl.exec(c, &distro.check_rsync()).await {
            Ok(r) if r.usable() => return true,
            Ok(_) => {}
            Err(err) => {
                warn!(pod = %c.pod, error = %err, "rsync check failed");
                return false;
            }
        }

        info!(pod = %c.pod, "installing rsync in container");
        if let Err(err) = self.kubectl.exec(c, &distro.install_rsync()).await {
            warn!(pod = %c.pod, error = %err, "rsync install failed");
            return false;
        }
        matches!(self.kubectl.exec(c, &distro.check_rsync()).await, Ok(r) if r.usable())
    }

    /// Check the first matching container for a known package manager.
    async fn detect_distro(&self, containers: &[ContainerRef]) -> Distro {
        let Some(c) = containers.iter().find(|c| c.ready) else {
            return Distro::Generic;
        };
        for distro in Distro::DETECTION_ORDER {
            match self.kubectl.exec(c, &distro.check_package_manager()).await {
                Ok(r) if r.usable() => return distro,
                Ok(_) => {}
                Err(err) => debug!(error = %err, "package manager check failed"),
            }
        }
        Distro::Generic
    }

    /// Deployments in the container's namespace whose template runs it.
    async fn owning_deployments(&self, c: &ContainerRef) -> Result<Vec<String>> {
        let deployments = self.kubectl.list_deployments(&c.namespace).await?;
        Ok(deployments
            .into_iter()
            .filter(|d| {
                d.spec.template.spec.containers.iter().any(|spec| {
                    spec.name == c.container && spec.image.starts_with(&self.image_prefix)
                })
            })
            .map(|d| d.metadata.name)
            .collect())
    }

    /// Set the command of every deployment owning `c`. Returns their names.
    async fn set_deployment_command(
        &self,
        c: &ContainerRef,
        command: Option<&[String]>,
    ) -> Result<Vec<String>> {
        let names = self.owning_deployments(c).await?;
        for name in &names {
            self.kubectl
                .patch_command(&c.namespace, name, &c.container, command)
                .await?;
        }
        Ok(names)
    }

    /// Park crash-looping containers that refuse exec on the recovery
    /// command. Returns true if any deployment was patched.
    async fn stabilize(&self, containers: &[ContainerRef], out: Output<'_>) -> Result<bool> {
        let mut patched = false;
        for c in containers {
            if c.ready || !c.crashing {
                continue;
            }
            match self.kubectl.exec(c, &check_can_exec()).await {
                Ok(r) if r.usable() => continue,
                Ok(_) => {}
                Err(err) => debug!(pod = %c.pod, error = %err, "exec check failed"),
            }

            writeln!(out, "Pod {}, is crashing, attempting deployment recovery", c.pod)?;
            let recovery = recovery_command();
            let deployments = self.set_deployment_command(c, Some(recovery.as_slice())).await?;
            if deployments.is_empty() {
                warn!(pod = %c.pod, "no deployment owns the crashing container");
                continue;
            }
            patched = true;

            writeln!(out, "\u{231b}  Please wait...")?;
            let pending = self.wait_for_pods_gone(BTreeSet::from([c.pod.clone()])).await;
            if pending.is_empty() {
                info!(pod = %c.pod, "deployment recovered");
                writeln!(out, "Deployment recovered")?;
            } else {
                writeln!(out, "Pod {} recovery failed", c.pod)?;
                let original = (!c.command.is_empty()).then_some(c.command.as_slice());
                self.set_deployment_command(c, original).await?;
            }
        }
        Ok(patched)
    }

    /// Poll until none of `pending` is listed any more or the pod timeout
    /// passes. Returns the pods still present.
    async fn wait_for_pods_gone(&self, mut pending: BTreeSet<String>) -> BTreeSet<String> {
        let deadline = Instant::now() + self.options.pod_timeout;
        while !pending.is_empty() && Instant::now() < deadline {
            sleep(POD_POLL_INTERVAL).await;
            match self.kubectl.list_pods().await {
                Ok(pods) => {
                    let live: BTreeSet<&str> =
                        pods.iter().map(|p| p.metadata.name.as_str()).collect();
                    pending.retain(|name| live.contains(name.as_str()));
                }
                Err(err) => warn!(error = %err, "listing pods while waiting failed"),
            }
        }
        pending
    }

    /// Patch the deployments owning matching containers. Returns the names of
    /// the pods expected to roll.
    async fn toggle_supervisor(
        &self,
        containers: &[ContainerRef],
        install: bool,
        out: Output<'_>,
    ) -> Result<BTreeSet<String>> {
        let command = self
            .distro()
            .supervise_command(self.options.container_command.as_deref());
        let mut pods = BTreeSet::new();
        let mut patched = BTreeSet::new();

        for c in containers {
            if is_supervised(&c.command) == install {
                continue;
            }
            for name in self.owning_deployments(c).await? {
                if !patched.insert((c.namespace.clone(), name.clone())) {
                    continue;
                }
                let cmd = install.then_some(command.as_slice());
                self.kubectl
                    .patch_command(&c.namespace, &name, &c.container, cmd)
                    .await?;
            }
            pods.insert(c.pod.clone());
        }

        if !patched.is_empty() {
            let names: Vec<&str> = patched.iter().map(|(_, n)| n.as_str()).collect();
            let verb = if install {
                "Supervisor installing on"
            } else {
                "Supervisor uninstalling from"
            };
            writeln!(out, "{verb} {}", names.join(" "))?;
        }
        Ok(pods)
    }

    /// Wait for the given pods to disappear, bounded by the pod timeout.
    async fn wait_for_roll(&self, pending: BTreeSet<String>, out: Output<'_>) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        writeln!(out, "\u{231b}  Please wait...")?;
        let pending = self.wait_for_pods_gone(pending).await;
        if !pending.is_empty() {
            let names: Vec<&str> = pending.iter().map(String::as_str).collect();
            writeln!(out, "Time-out waiting for pods: {}", names.join(", "))?;
        }
        Ok(())
    }

    /// One line per matching container.
    async fn print_status(&self, out: Output<'_>) -> Result<()> {
        for c in self.containers().await? {
            let (icon, msg) = if !c.ready {
                ("\u{1f534}", format!("false - {}", c.not_ready_reason()))
            } else if is_supervised(&c.command) {
                ("\u{1f7e0}", "supervisor is running".to_string())
            } else if is_recovering(&c.command) {
                (
                    "\u{1f7e0}",
                    "still sleeping, having recovered from crashed state".to_string(),
                )
            } else {
                ("\u{1f7e2}", "true".to_string())
            };
            writeln!(out, "{icon}  {} - ready: {msg}", c.pod)?;
        }
        writeln!(out)?;
        Ok(())
    }
}

impl SyncBackend for KubeBackend {
    fn name(&self) -> &'static str {
        "kube"
    }

    fn sync<'a>(&'a self, request: &'a SyncRequest, out: Output<'a>) -> BackendFuture<'a> {
        Box::pin(async move {
            let label = display_path(&request.rel_path);
            let dest = &self.rsync_destination();
            let targets = self.sync_targets(label, &mut *out).await?;
            sync_each(targets, label, out, |c| async move {
                let transport = self.transport_for(&c);
                let inv = change_invocation(request, dest, &transport);
                run_rsync(request.root.path(), &inv, &transport, label).await
            })
            .await
        })
    }

    fn sync_project<'a>(
        &'a self,
        request: &'a ProjectSyncRequest,
        out: Output<'a>,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            let dest = &self.rsync_destination();
            let targets = self.sync_targets("./", &mut *out).await?;
            sync_each(targets, "./", out, |c| async move {
                let transport = self.transport_for(&c);
                for pr in &request.roots {
                    let inv = project_invocation(&pr.exclusions, dest, &transport);
                    run_rsync(pr.root.path(), &inv, &transport, pr.root.display_name()).await?;
                }
                Ok::<(), SyncError>(())
            })
            .await
        })
    }

    fn on_monitor_start<'a>(
        &'a self,
        _roots: &'a [WatchedRoot],
        out: Output<'a>,
    ) -> BackendFuture<'a> {
        Box::pin(async move {
            let mut containers = self.containers().await?;
            if containers.is_empty() {
                writeln!(out, "None of the deployment containers match the given image")?;
                return Ok(());
            }
            if self.stabilize(&containers, &mut *out).await? {
                containers = self.containers().await?;
            }

            let distro = self.detect_distro(&containers).await;
            if let Ok(mut d) = self.distro.lock() {
                *d = distro;
            }
            if distro == Distro::Generic {
                writeln!(
                    out,
                    "Failed to detect container image OS variant. Assuming bash, rsync and supervisor are already installed"
                )?;
            }
            writeln!(out, "Assuming OS in container image: {}", distro.name())?;

            if self.options.supervisor {
                let pods = self.toggle_supervisor(&containers, true, &mut *out).await?;
                self.supervised.store(true, Ordering::Release);
                self.wait_for_roll(pods, &mut *out).await?;
            }
            self.print_status(out).await
        })
    }

    fn on_monitor_exit<'a>(&'a self, out: Output<'a>) -> BackendFuture<'a> {
        Box::pin(async move {
            if !self.supervised.swap(false, Ordering::AcqRel) {
                return Ok(());
            }
            let containers = self.containers().await?;
            let pods = self.toggle_supervisor(&containers, false, &mut *out).await?;
            self.wait_for_roll(pods, &mut *out).await?;
            self.print_status(out).await
        })
    }
}

/// Run `op` against every container. Each failure is printed on `out` and the
/// remaining containers are still attempted; failures come back as one
/// recoverable error naming the pods.
async fn sync_each<F, Fut>(
    containers: Vec<ContainerRef>,
    label: &str,
    out: Output<'_>,
    mut op: F,
) -> Result<()>
where
    F: FnMut(ContainerRef) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let total = containers.len();
    let mut failed = Vec::new();
    for c in containers {
        let pod = c.pod.clone();
        if let Err(err) = op(c).await {
            warn!(pod = %pod, error = %err, "sync into container failed");
            writeln!(out, "{err}")?;
            failed.push(pod);
        }
    }

    if failed.is_empty() {
        return Ok(());
    }
    Err(SyncError::backend(
        "rsync",
        label,
        format!(
            "failed in {} of {total} containers: {}",
            failed.len(),
            failed.join(", ")
        ),
    ))
}
