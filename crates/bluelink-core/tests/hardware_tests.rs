//! Hardware integration tests for bluelink-core
//!
//! These tests require actual BLE hardware and should be run with:
//! ```
//! cargo test --package bluelink-core --test hardware_tests -- --ignored --nocapture
//! ```
//!
//! Configure the peripheral via environment variable:
//! - `BLUELINK_DEVICE`: identifier of a connectable peripheral (address, or the
//!   CoreBluetooth UUID on macOS)
//!
//! Example:
//! ```
//! BLUELINK_DEVICE="AA:BB:CC:DD:EE:FF" cargo test --package bluelink-core --test hardware_tests -- --ignored --nocapture
//! ```

use std::env;
use std::time::Duration;

use bluelink_core::{AdapterState, BtleTransport, LinkConfig, LinkManager, SessionPhase};

/// Default timeout for BLE operations
const BLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Get device identifier from environment
fn get_device() -> Option<String> {
    env::var("BLUELINK_DEVICE").ok().filter(|s| !s.is_empty())
}

async fn start_manager() -> LinkManager {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("bluelink_core=debug")
        .try_init();

    let (transport, events) = BtleTransport::new().await.expect("no Bluetooth adapter");
    let (manager, _task) =
        LinkManager::spawn(transport, events, LinkConfig::default()).expect("valid config");
    manager
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_adapter_powered_on() {
    let manager = start_manager().await;
    let state = manager
        .wait_for_adapter(Duration::from_secs(5))
        .await
        .expect("adapter not ready");
    assert_eq!(state, AdapterState::PoweredOn);
    manager.shutdown();
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_scan_finds_devices() {
    let manager = start_manager().await;
    manager.wait_for_adapter(Duration::from_secs(5)).await.unwrap();
    manager.start_scan().await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    manager.stop_scan().await.unwrap();

    let devices = manager.devices();
    println!("Found {} devices", devices.len());
    for device in &devices {
        println!(
            "  {} {} ({:?} dBm)",
            device.id,
            device.display_name(),
            device.rssi
        );
    }

    let mut ids: Vec<_> = devices.iter().map(|d| d.id.clone()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), devices.len(), "device list contains duplicates");
    manager.shutdown();
}

#[tokio::test]
#[ignore = "requires BLE hardware"]
async fn test_connect_and_enumerate() {
    let Some(id) = get_device() else {
        println!("BLUELINK_DEVICE not set, skipping");
        return;
    };

    let manager = start_manager().await;
    manager.wait_for_adapter(Duration::from_secs(5)).await.unwrap();
    manager.start_scan().await.unwrap();
    manager.wait_for_device(id.as_str(), BLE_TIMEOUT).await.unwrap();
    manager.stop_scan().await.unwrap();

    let catalog = manager.connect(id.as_str()).await.unwrap().await.unwrap();
    println!("{} services", catalog.len());
    for service in catalog.services() {
        println!("  {} ({} characteristics)", service.uuid, service.characteristics.len());
    }
    assert_eq!(
        manager.session().map(|s| s.phase),
        Some(SessionPhase::Ready)
    );

    manager.disconnect().await.unwrap();
    assert!(manager.session().is_none());
    manager.shutdown();
}
