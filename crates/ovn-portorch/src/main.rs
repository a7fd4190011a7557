//! portorchd entry point.
//!
//! Loads the configuration, wires the collaborators, makes sure the default
//! HA chassis group exists and runs the maintenance loop until SIGINT.

use anyhow::Context;
use clap::Parser;
use ovn_portorch::audit::{init_logging, init_logging_pretty};
use ovn_portorch::config::DEFAULT_CONFIG_PATH;
use ovn_portorch::daemon::PortOrchDaemon;
use ovn_portorch::ha_chassis_group::{HaChassisGroupOrch, HaChassisGroupOrchConfig};
use ovn_portorch::lsp::Collaborators;
use ovn_portorch::memory::{
    MemoryBackend, MemoryChassisDirectory, MemoryRevisionLedger, MemoryTenantStore,
};
use ovn_portorch::{Dispatcher, PortOrchConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

/// OVN logical switch port reconciler
#[derive(Parser, Debug)]
#[command(name = "portorchd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    pretty_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.pretty_logs {
        init_logging_pretty(&args.log_level);
    } else {
        init_logging(&args.log_level);
    }

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("portorchd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = PortOrchConfig::load_or_default(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    config.validate().context("invalid configuration")?;

    info!("Starting portorchd");
    info!("Default HA chassis group: {}", config.ovn.default_ha_chassis_group);
    info!("vhost-user socket dir: {}", config.ovn.vhost_sock_dir.display());

    let backend = Arc::new(MemoryBackend::new());
    let collaborators = Collaborators {
        tenant: Arc::new(MemoryTenantStore::new()),
        ledger: Arc::new(MemoryRevisionLedger::new()),
        backend: backend.clone(),
        chassis: Arc::new(MemoryChassisDirectory::new()),
    };

    let mut ha_orch = HaChassisGroupOrch::new(HaChassisGroupOrchConfig {
        default_group: config.ovn.default_ha_chassis_group.clone(),
        retry: config.retry.policy(),
    });
    ha_orch.set_backend(backend);
    ha_orch
        .ensure_default_group()
        .await
        .context("creating default HA chassis group")?;

    let dispatcher = Arc::new(Dispatcher::new(&config, collaborators));
    let mut daemon = PortOrchDaemon::new(config.maintenance_interval(), dispatcher);
    daemon.register_orch(Box::new(ha_orch));

    if !daemon.init().await {
        anyhow::bail!("daemon initialization left pending work");
    }

    daemon
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown requested");
        })
        .await;

    info!("portorchd exiting");
    Ok(())
}
