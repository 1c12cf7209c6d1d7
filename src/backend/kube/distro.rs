// src/backend/kube/distro.rs

//! Container image OS variants and the commands we run in each.

/// Marker at the start of a supervised container command. A container whose
/// command contains it is considered supervised.
pub const SUPERVISED_MARKER: &str = "echo devsync";

/// Marker of the placeholder command a crash-looping deployment is parked on
/// while it recovers.
pub const RECOVERY_MARKER: &str = "echo uncrash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Distro {
    /// apk-based.
    Alpine,
    /// dnf-based.
    CentOs,
    /// Anything else; bash, rsync and supervisor must already be installed.
    #[default]
    Generic,
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl Distro {
    /// Variants tried in order when sniffing an image.
    pub const DETECTION_ORDER: [Distro; 2] = [Distro::Alpine, Distro::CentOs];

    pub fn name(self) -> &'static str {
        match self {
            Distro::Alpine => "Alpine linux (or apk-based Alpine clone)",
            Distro::CentOs => "CentOS linux (or dnf-based CentOS clone)",
            Distro::Generic => "Generic linux (with bash, rsync and supervisor installed)",
        }
    }

    fn shell(self) -> &'static str {
        match self {
            Distro::Alpine => "/bin/sh",
            Distro::CentOs | Distro::Generic => "/bin/bash",
        }
    }

    fn install_prefix(self, packages: &str) -> Option<String> {
        match self {
            Distro::Alpine => Some(format!("apk --no-cache add {packages}")),
            Distro::CentOs => Some(format!("dnf install -y {packages}")),
            Distro::Generic => None,
        }
    }

    /// Command the deployment runs while supervised. `container_command`
    /// replaces the supervisor daemon.
    pub fn supervise_command(self, container_command: Option<&str>) -> Vec<String> {
        let (packages, run) = match container_command {
            Some(cmd) => ("rsync", cmd.to_string()),
            None => ("supervisor rsync", "supervisord -n".to_string()),
        };
        let mut script = SUPERVISED_MARKER.to_string();
        if let Some(install) = self.install_prefix(packages) {
            script.push_str(" && ");
            script.push_str(&install);
        }
        script.push_str(" && ");
        script.push_str(&run);
        vec![self.shell().to_string(), "-c".to_string(), script]
    }

    pub fn install_rsync(self) -> Vec<String> {
        match self {
            Distro::Alpine => argv(&["apk", "--no-cache", "add", "rsync"]),
            Distro::CentOs => argv(&["dnf", "install", "-y", "rsync"]),
            Distro::Generic => argv(&["true"]),
        }
    }

    pub fn check_rsync(self) -> Vec<String> {
        argv(&["rsync", "--version"])
    }

    pub fn check_package_manager(self) -> Vec<String> {
        match self {
            Distro::Alpine => argv(&["apk", "--version"]),
            Distro::CentOs => argv(&["dnf", "--version"]),
            Distro::Generic => argv(&["true"]),
        }
    }
}

/// Keeps a container alive without running its entrypoint, so it can be
/// exec'd into and repaired.
pub fn recovery_command() -> Vec<String> {
    vec![
        "/bin/sh".to_string(),
        "-c".to_string(),
        format!("{RECOVERY_MARKER} && sleep 10m"),
    ]
}

/// Cheapest command proving a container accepts exec.
pub fn check_can_exec() -> Vec<String> {
    argv(&["true"])
}

fn has_marker(command: &[String], marker: &str) -> bool {
    command.iter().any(|arg| arg.starts_with(marker))
}

/// True if a container command was installed by us.
pub fn is_supervised(command: &[String]) -> bool {
    has_marker(command, SUPERVISED_MARKER)
}

/// True if the container runs the recovery placeholder.
pub fn is_recovering(command: &[String]) -> bool {
    has_marker(command, RECOVERY_MARKER)
}
