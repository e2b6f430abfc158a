//! # TerraClaw — scheduled deploy/destroy daemon
//!
//! Deploys and destroys infrastructure-as-code workspaces on cron schedules.
//!
//! Usage:
//!   terraclaw                            # Run with ~/.terraclaw/config.toml
//!   terraclaw --config ./dev.toml        # Custom config file
//!   terraclaw --interval 10              # Override poll cadence
//!   terraclaw --workspaces ./ws.json     # Override definitions file

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use terraclaw_core::DaemonConfig;
use terraclaw_daemon::{DaemonEngine, FileSource};
use terraclaw_provisioner::ShellProvisioner;
use terraclaw_registry::{RegistryDb, TemplateRegistry};
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "terraclaw",
    version,
    about = "⏰ TerraClaw — scheduled deploy/destroy daemon for IaC workspaces"
)]
struct Cli {
    /// Config file path (default: ~/.terraclaw/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Workspace definitions file, overriding the configured path
    #[arg(short, long)]
    workspaces: Option<String>,

    /// Poll interval in seconds, overriding the configured value
    #[arg(short, long)]
    interval: Option<u64>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn expand_path(p: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(p).to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "terraclaw=debug,terraclaw_daemon=debug,terraclaw_registry=debug,terraclaw_provisioner=debug"
    } else {
        "terraclaw=info,terraclaw_daemon=info,terraclaw_registry=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    // Load config, then apply CLI overrides
    let mut config = match &cli.config {
        Some(path) => DaemonConfig::load_from(&expand_path(path))
            .with_context(|| format!("loading config from {path}"))?,
        None => DaemonConfig::load().context("loading config")?,
    };
    if let Some(workspaces) = &cli.workspaces {
        config.workspaces_file = expand_path(workspaces);
    }
    if let Some(interval) = cli.interval {
        config.poll_interval_secs = interval;
    }

    std::fs::create_dir_all(&config.home_dir)
        .with_context(|| format!("creating home dir {}", config.home_dir.display()))?;

    // First run: seed an empty definitions file. A file that goes missing
    // later is an error, not an empty list, so the daemon never mistakes an
    // unmounted volume for "all workspaces removed".
    if !config.workspaces_file.exists() {
        if let Some(parent) = config.workspaces_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&config.workspaces_file, "[]\n")
            .with_context(|| format!("creating {}", config.workspaces_file.display()))?;
        tracing::info!("📝 Created empty definitions file {}", config.workspaces_file.display());
    }

    println!("⏰ TerraClaw v{}", env!("CARGO_PKG_VERSION"));
    println!("   📂 Home:        {}", config.home_dir.display());
    println!("   📋 Workspaces:  {}", config.workspaces_file.display());
    println!("   🔁 Poll every:  {}s", config.poll_interval_secs);
    println!();

    let registry = Arc::new(TemplateRegistry::new(
        RegistryDb::open(&config.registry_db()).context("opening template registry")?,
        config.templates_dir(),
        std::time::Duration::from_secs(config.fetch_timeout_secs),
    ));
    let source = Box::new(FileSource::new(config.workspaces_file.clone()));

    let engine = Arc::new(
        DaemonEngine::new(config, source, registry, Arc::new(ShellProvisioner::new()))
            .context("starting engine")?,
    );

    let shutdown = Arc::new(Notify::new());
    let loop_task = tokio::spawn(engine.clone().run(shutdown.clone()));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("✅ Shutdown requested");
    shutdown.notify_one();
    loop_task.await.context("joining scheduler loop")?;

    Ok(())
}
