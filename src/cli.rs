// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `devsync`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "devsync",
    version,
    about = "Watch source trees and propagate every file change to a destination.",
    long_about = None
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Watch SOURCE dirs and sync changes to DESTINATION.
    ///
    /// DESTINATION is a local path, an ssh-style `user@host:path`, or
    /// `kube://<image-prefix>:<dir>` for every running container whose image
    /// starts with the prefix. Without a SOURCE the current directory is
    /// watched.
    Sync(SyncArgs),

    /// Print the version and exit.
    Version,

    /// Remote-shell helper used by rsync for kube destinations.
    #[command(hide = true)]
    KubeExec {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct SyncArgs {
    /// Source dirs followed by the destination.
    #[arg(value_name = "SOURCE... DESTINATION")]
    pub targets: Vec<String>,

    /// Try to install supervisor in matching containers.
    #[arg(long, overrides_with = "no_supervisor")]
    pub supervisor: bool,

    #[arg(long, overrides_with = "supervisor", hide = true)]
    pub no_supervisor: bool,

    /// Kubernetes api host server address/hostname.
    #[arg(long, value_name = "HOST")]
    pub kube_host: Option<String>,

    /// Pod reconfiguration timeout in seconds (default 30, or the
    /// configured `pod_timeout`).
    #[arg(long, value_name = "SECONDS")]
    pub pod_timeout: Option<u64>,

    /// Run a full sync when watching starts (default).
    #[arg(long, overrides_with = "no_full_sync")]
    pub full_sync: bool,

    /// Skip the initial full sync.
    #[arg(long, overrides_with = "full_sync")]
    pub no_full_sync: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEVSYNC_LOG` or `warn` is used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

impl SyncArgs {
    pub fn supervisor(&self) -> bool {
        self.supervisor && !self.no_supervisor
    }

    pub fn full_sync(&self) -> bool {
        !self.no_full_sync
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
