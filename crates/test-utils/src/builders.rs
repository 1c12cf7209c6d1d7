use std::path::Path;

/// Builder for a `devsync.toml` file.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    additional_sources: Vec<String>,
    destination: Option<String>,
    pod_timeout: Option<u64>,
    container_command: Option<String>,
    ignore_files: Vec<String>,
    ignore_untracked: Option<bool>,
}

fn quote(s: &str) -> String {
    format!("{s:?}")
}

fn list(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|s| quote(s)).collect();
    format!("[{}]", quoted.join(", "))
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn additional_source(mut self, path: &str) -> Self {
        self.additional_sources.push(path.to_string());
        self
    }

    pub fn destination(mut self, dest: &str) -> Self {
        self.destination = Some(dest.to_string());
        self
    }

    pub fn pod_timeout(mut self, secs: u64) -> Self {
        self.pod_timeout = Some(secs);
        self
    }

    pub fn container_command(mut self, cmd: &str) -> Self {
        self.container_command = Some(cmd.to_string());
        self
    }

    pub fn ignore_file(mut self, pattern: &str) -> Self {
        self.ignore_files.push(pattern.to_string());
        self
    }

    pub fn ignore_untracked(mut self, val: bool) -> Self {
        self.ignore_untracked = Some(val);
        self
    }

    pub fn to_toml(&self) -> String {
        let mut out = String::from("[devsync]\n");
        if !self.additional_sources.is_empty() {
            out.push_str(&format!(
                "additional_sources = {}\n",
                list(&self.additional_sources)
            ));
        }
        if let Some(dest) = &self.destination {
            out.push_str(&format!("destination = {}\n", quote(dest)));
        }
        if let Some(t) = self.pod_timeout {
            out.push_str(&format!("pod_timeout = {t}\n"));
        }
        if let Some(cmd) = &self.container_command {
            out.push_str(&format!("container_command = {}\n", quote(cmd)));
        }
        if !self.ignore_files.is_empty() {
            out.push_str(&format!("ignore_files = {}\n", list(&self.ignore_files)));
        }
        if let Some(flag) = self.ignore_untracked {
            out.push_str(&format!("ignore_untracked = {flag}\n"));
        }
        out
    }

    /// Write `devsync.toml` into `dir`.
    pub fn write_to(&self, dir: &Path) -> std::io::Result<()> {
        std::fs::write(dir.join(devsync::config::CONFIG_FILE_NAME), self.to_toml())
    }
}
