//! Connect command implementation.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bluelink_core::{DeviceId, EventReceiver, LinkEvent, LinkManager};
use bluelink_store::{Sample, SnapshotRecord, SnapshotStore};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cli::OutputFormat;
use crate::commands::scan::ADAPTER_TIMEOUT;
use crate::format::{format_catalog_json, format_catalog_text};
use crate::util::write_output;

pub struct ConnectArgs<'a> {
    pub device: &'a str,
    /// How long to scan for the device before giving up.
    pub scan_timeout: Duration,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
}

/// Scan for the device, connect, print its catalog, and disconnect.
///
/// When `store` is given, the signal strength seen for the device between the start
/// of the scan and the end of discovery is kept as a snapshot.
pub async fn cmd_connect(
    manager: &LinkManager,
    args: ConnectArgs<'_>,
    store: Option<&mut SnapshotStore>,
) -> Result<()> {
    let id = DeviceId::new(args.device);
    let mut events = manager.subscribe();
    let started = Instant::now();

    manager
        .wait_for_adapter(ADAPTER_TIMEOUT)
        .await
        .context("Bluetooth adapter is not available")?;

    if !args.quiet && args.format == OutputFormat::Text {
        eprintln!("Looking for {}...", id);
    }
    manager
        .start_scan()
        .await
        .context("Failed to start scanning")?;
    let found = manager.wait_for_device(id.clone(), args.scan_timeout).await;
    manager.stop_scan().await.context("Failed to stop scanning")?;
    let device = found.with_context(|| format!("Device {} was not found", id))?;

    if !args.quiet && args.format == OutputFormat::Text {
        eprintln!("Connecting to {}...", device.display_name());
    }
    let pending = manager
        .connect(id.clone())
        .await
        .with_context(|| format!("Failed to connect to {}", id))?;
    let catalog = pending
        .await
        .with_context(|| format!("Failed to connect to {}", id))?;
    info!(
        "Connected to {}: {} service(s)",
        id,
        catalog.len()
    );

    // Pick up the latest name and advertisement seen during the scan
    let device = manager
        .devices()
        .into_iter()
        .find(|d| d.id == id)
        .unwrap_or(device);

    let content = match args.format {
        OutputFormat::Json => format_catalog_json(&device, &catalog)?,
        OutputFormat::Text => format_catalog_text(&device, &catalog),
    };
    write_output(args.output, &content)?;

    if let Some(store) = store {
        let samples = collect_rssi_samples(&mut events, &id, started);
        let record = SnapshotRecord::for_device(&device, samples);
        let record_id = record.id;
        store.add(record).context("Failed to save snapshot")?;
        if !args.quiet {
            eprintln!("Saved snapshot {}", record_id);
        }
    }

    manager
        .disconnect()
        .await
        .with_context(|| format!("Failed to disconnect from {}", id))?;
    Ok(())
}

/// Drain buffered events and turn the device's RSSI readings into samples.
fn collect_rssi_samples(events: &mut EventReceiver, id: &DeviceId, started: Instant) -> Vec<Sample> {
    let mut samples = Vec::new();
    loop {
        match events.try_recv() {
            Ok(LinkEvent::DeviceDiscovered { device, .. } | LinkEvent::DeviceUpdated { device, .. })
                if device.id == *id =>
            {
                if let Some(rssi) = device.rssi {
                    let offset = u32::try_from(started.elapsed().as_secs()).unwrap_or(u32::MAX);
                    samples.push(Sample::new(offset, f64::from(rssi)));
                }
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(skipped)) => {
                debug!("Skipped {} event(s) while collecting samples", skipped);
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluelink_core::mock::{MockPeripheral, MockTransport, TransportRequest};
    use bluelink_core::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
    use bluelink_core::{AdapterState, Capability, CharacteristicEntry, LinkConfig};

    fn manager_with(peripheral: MockPeripheral) -> (LinkManager, MockTransport) {
        let (transport, events) = MockTransport::builder()
            .adapter_state(AdapterState::PoweredOn)
            .peripheral(peripheral)
            .build();
        let (manager, _task) =
            LinkManager::spawn(transport.clone(), events, LinkConfig::default()).unwrap();
        (manager, transport)
    }

    fn band() -> MockPeripheral {
        MockPeripheral::new("AA:01").name("Band").rssi(-48).service(
            BATTERY_SERVICE,
            vec![CharacteristicEntry::new(BATTERY_LEVEL).with(Capability::Read)],
        )
    }

    fn args<'a>(device: &'a str, output: &'a PathBuf) -> ConnectArgs<'a> {
        ConnectArgs {
            device,
            scan_timeout: Duration::from_secs(5),
            format: OutputFormat::Json,
            output: Some(output),
            quiet: true,
        }
    }

    #[tokio::test]
    async fn test_connect_prints_catalog_and_disconnects() {
        let (manager, transport) = manager_with(band());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        cmd_connect(&manager, args("AA:01", &path), None).await.unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["device"]["name"], "Band");
        assert_eq!(
            value["catalog"]["services"][0]["uuid"],
            BATTERY_SERVICE.to_string()
        );
        assert!(
            transport
                .requests()
                .contains(&TransportRequest::Disconnect(DeviceId::new("AA:01")))
        );
        assert!(manager.session().is_none());
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_connect_save_stores_rssi_snapshot() {
        let (manager, _transport) = manager_with(band());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut store = SnapshotStore::open(dir.path().join("snapshots.json")).unwrap();

        cmd_connect(&manager, args("AA:01", &path), Some(&mut store))
            .await
            .unwrap();

        assert_eq!(store.len(), 1);
        let record = &store.records()[0];
        assert_eq!(record.device_name, "Band");
        assert_eq!(record.device_id, DeviceId::new("AA:01"));
        assert_eq!(record.summary().unwrap().max, -48.0);
        manager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_unknown_device_times_out() {
        let (manager, transport) = manager_with(band());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let err = cmd_connect(&manager, args("BB:02", &path), None)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("not found"));
        assert!(!manager.is_scanning());
        assert!(
            !transport
                .requests()
                .iter()
                .any(|r| matches!(r, TransportRequest::Connect(_)))
        );
        manager.shutdown();
    }

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        let (manager, _transport) = manager_with(band().connect_error("peer refused"));
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let err = cmd_connect(&manager, args("AA:01", &path), None)
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("peer refused"));
        assert!(!path.exists());
        manager.shutdown();
    }
}
