//! Scan command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bluelink_core::LinkManager;

use crate::cli::OutputFormat;
use crate::format::{format_scan_json, format_scan_text};
use crate::util::write_output;

/// How long to wait for the adapter to report a usable state.
pub(crate) const ADAPTER_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn cmd_scan(
    manager: &LinkManager,
    duration: Duration,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
) -> Result<()> {
    manager
        .wait_for_adapter(ADAPTER_TIMEOUT)
        .await
        .context("Bluetooth adapter is not available")?;

    if !quiet && format == OutputFormat::Text {
        eprintln!("Scanning for {} seconds...", duration.as_secs());
    }

    manager
        .start_scan()
        .await
        .context("Failed to start scanning")?;
    tokio::time::sleep(duration).await;
    manager.stop_scan().await.context("Failed to stop scanning")?;

    let mut devices = manager.devices();
    // Strongest signal first; devices without RSSI last
    devices.sort_by_key(|d| std::cmp::Reverse(d.rssi.unwrap_or(i16::MIN)));

    let content = match format {
        OutputFormat::Json => format_scan_json(&devices)?,
        OutputFormat::Text => format_scan_text(&devices),
    };
    write_output(output, &content)
}
