//! `bluelink` command-line interface.

mod cli;
mod commands;
mod config;
mod format;
mod util;

use anyhow::{Context, Result};
use bluelink_core::{BtleTransport, LinkConfig, LinkManager, spawn_event_logger};
use bluelink_store::SnapshotStore;
use clap::Parser;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{ConnectArgs, cmd_config, cmd_connect, cmd_scan, cmd_snapshots};
use config::{
    Config, DEFAULT_CONNECT_SECS, DEFAULT_SCAN_SECS, resolve_device, resolve_timeout,
};
use util::require_device;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // When quiet mode is enabled, suppress info-level logging
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load(&config_path)?;
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan { timeout, format } => {
            let duration = resolve_timeout(timeout, config.scan_timeout, DEFAULT_SCAN_SECS);
            let (manager, task) = start_manager(LinkConfig::default()).await?;
            let result = cmd_scan(&manager, duration, format, output, cli.quiet).await;
            stop_manager(manager, task).await;
            result
        }
        Commands::Connect {
            device,
            timeout,
            format,
            save,
        } => {
            let device = require_device(resolve_device(device, &config))?;
            let connect_timeout =
                resolve_timeout(timeout, config.connect_timeout, DEFAULT_CONNECT_SECS);
            let scan_timeout = resolve_timeout(None, config.scan_timeout, DEFAULT_SCAN_SECS);

            let mut store = if save {
                let path = config.store_path();
                Some(
                    SnapshotStore::open(&path)
                        .with_context(|| format!("Failed to open {}", path.display()))?,
                )
            } else {
                None
            };

            let (manager, task) =
                start_manager(LinkConfig::new().connect_timeout(connect_timeout)).await?;
            let args = ConnectArgs {
                device: &device,
                scan_timeout,
                format,
                output,
                quiet: cli.quiet,
            };
            let result = cmd_connect(&manager, args, store.as_mut()).await;
            stop_manager(manager, task).await;
            result
        }
        Commands::Snapshots { action } => {
            let path = config.store_path();
            let mut store = SnapshotStore::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            cmd_snapshots(&mut store, action, output, cli.quiet)
        }
        Commands::Config { action } => cmd_config(action, &config_path, &config, output),
    }
}

/// Open the first Bluetooth adapter and start a manager on it.
async fn start_manager(link_config: LinkConfig) -> Result<(LinkManager, JoinHandle<()>)> {
    let (transport, events) = BtleTransport::new()
        .await
        .context("Failed to open a Bluetooth adapter")?;
    let (manager, task) = LinkManager::spawn(transport, events, link_config)?;
    spawn_event_logger(&manager);
    Ok((manager, task))
}

/// Shut the manager down and wait for it to release the adapter.
async fn stop_manager(manager: LinkManager, task: JoinHandle<()>) {
    manager.shutdown();
    if let Err(e) = task.await {
        tracing::warn!("Link manager task failed: {}", e);
    }
}
