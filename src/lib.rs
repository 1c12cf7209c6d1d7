// src/lib.rs

pub mod backend;
pub mod cli;
pub mod config;
pub mod console;
pub mod engine;
pub mod errors;
pub mod filter;
pub mod lifecycle;
pub mod logging;
pub mod monitor;
pub mod types;
pub mod watch;

use std::io::IsTerminal;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{Backend, BackendOptions, SyncBackend};
use crate::cli::{CliArgs, Command, SyncArgs};
use crate::config::{
    Setup, candidate_dirs, read_project_config, resolve_targets, validate_setup,
};
use crate::console::{Console, KeySource, RawTerminal};
use crate::engine::Dispatcher;
use crate::errors::{Result, SyncError};
use crate::filter::{FilterChain, VcsFilter};
use crate::monitor::Monitor;
use crate::watch::BasenamePatterns;

/// High-level entry point used by `main.rs`. Returns the process exit code.
pub async fn run(args: CliArgs) -> anyhow::Result<i32> {
    match args.command {
        Command::Sync(sync) => {
            logging::init_logging(sync.log_level)?;
            run_sync(sync).await?;
            Ok(0)
        }
        Command::Version => {
            println!("devsync {}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
        Command::KubeExec { args } => {
            let code =
                tokio::task::spawn_blocking(move || backend::kube::exec_bridge::run_bridge(&args))
                    .await??;
            Ok(code)
        }
    }
}

/// Load configuration, validate the targets and watch until stopped.
///
/// This wires together:
/// - config discovery and merge
/// - startup validation
/// - backend selection
/// - the watch session (watchers, debouncers, key reader, Ctrl-C)
pub async fn run_sync(args: SyncArgs) -> Result<()> {
    let config = read_project_config(&candidate_dirs(&args.targets));
    debug!(?config, "merged project config");

    let targets = resolve_targets(&args.targets, &config);
    let setup = validate_setup(&targets, &config)?;
    print_setup(&setup);

    let options = BackendOptions {
        supervisor: args.supervisor(),
        kube_host: args.kube_host.clone(),
        pod_timeout: args
            .pod_timeout
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| config.pod_timeout()),
        container_command: config.container_command.clone(),
    };
    let backend: Arc<dyn SyncBackend> =
        Arc::new(Backend::from_destination(&setup.destination, options)?);

    let user_patterns = BasenamePatterns::new(&config.ignore_files)
        .map_err(|e| SyncError::Config(format!("invalid ignore_files pattern: {e:#}")))?;
    let filter = Arc::new(FilterChain::standard(
        user_patterns,
        VcsFilter::git(config.ignore_untracked),
    ));

    let monitor = Monitor::new(
        setup.roots,
        Dispatcher::new(backend, filter),
        Console::stdout(),
    )
    .with_initial_full_sync(args.full_sync());

    let keys: Option<Box<dyn KeySource>> = if std::io::stdin().is_terminal() {
        Some(Box::new(RawTerminal))
    } else {
        info!("stdin is not a terminal; key commands disabled");
        None
    };

    let reason = monitor.run(keys).await?;
    debug!(%reason, "sync session ended");
    Ok(())
}

fn print_setup(setup: &Setup) {
    if !setup.missing.is_empty() {
        println!("Source file/dirs not found: {}", setup.missing.join(", "));
        let used: Vec<&str> = setup.roots.iter().map(|r| r.display_name()).collect();
        println!("Using source file/dirs {}", used.join(", "));
    }
    println!(
        "Destination, {}: '{}'",
        setup.destination.backend_name(),
        setup.destination
    );
}
