//! Connection lifecycle manager for Bluetooth Low Energy peripherals.
//!
//! This crate owns everything between a callback-driven BLE stack and an
//! application: the adapter state, the list of discovered devices, a single
//! connection session with service/characteristic discovery, and the most recent
//! asynchronous failure.
//!
//! # Features
//!
//! - **Device discovery**: de-duplicated device list in first-seen order
//! - **One connection at a time**: concurrent connects are rejected, not raced
//! - **Service enumeration**: services and characteristics with Read/Write/Notify flags
//! - **Adapter loss recovery**: power-off and permission loss tear down cleanly
//! - **Observable state**: `watch` snapshots plus a broadcast event stream
//! - **Testable**: every platform interaction goes through the [`Transport`] trait
//!
//! # Architecture
//!
//! ```text
//! LinkManager handles ──commands──┐
//!                                 ├──> actor task ──> ConnectionLifecycle ──> Transport
//! Transport ─────TransportEvent───┘          │
//!                                            ├──> watch<LinkState>
//!                                            └──> broadcast<LinkEvent>
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use bluelink_core::{BtleTransport, LinkConfig, LinkManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (transport, events) = BtleTransport::new().await?;
//!     let (manager, _task) = LinkManager::spawn(transport, events, LinkConfig::default())?;
//!
//!     manager.wait_for_adapter(Duration::from_secs(5)).await?;
//!     manager.start_scan().await?;
//!     tokio::time::sleep(Duration::from_secs(5)).await;
//!
//!     for device in manager.devices() {
//!         println!("{} {}", device.id, device.display_name());
//!     }
//!
//!     if let Some(device) = manager.devices().into_iter().next() {
//!         let catalog = manager.connect(device.id).await?.await?;
//!         println!("{} services", catalog.len());
//!         manager.disconnect().await?;
//!     }
//!
//!     manager.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Testing
//!
//! [`mock::MockTransport`] scripts a stack in memory:
//!
//! ```
//! use bluelink_core::mock::{MockPeripheral, MockTransport};
//! use bluelink_core::{LinkConfig, LinkManager};
//! use bluelink_types::AdapterState;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> bluelink_core::Result<()> {
//! let (transport, events) = MockTransport::builder()
//!     .adapter_state(AdapterState::PoweredOn)
//!     .peripheral(MockPeripheral::new("AA:BB").name("Sensor"))
//!     .build();
//! let (manager, _task) = LinkManager::spawn(transport, events, LinkConfig::default())?;
//!
//! manager.wait_for_adapter(std::time::Duration::from_secs(1)).await?;
//! manager.start_scan().await?;
//! # Ok(())
//! # }
//! ```

pub mod btle;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod manager;
pub mod mock;
pub mod pending;
pub mod registry;
pub mod transport;
pub mod util;

// Re-export types and uuid modules from bluelink-types
pub use bluelink_types::types;
pub use bluelink_types::uuids;

// Core exports
pub use btle::BtleTransport;
pub use error::{ConnectionFailureReason, Error, ErrorKind, ErrorRecord, Result};
pub use events::{
    DisconnectReason, EventDispatcher, EventReceiver, EventSender, LinkEvent, event_channel,
};
pub use lifecycle::{ConnectionLifecycle, LinkState, SessionInfo};
pub use manager::{LinkConfig, LinkManager, spawn_event_logger};
pub use mock::{MockPeripheral, MockTransport, MockTransportBuilder, TransportRequest};
pub use pending::PendingConnection;
pub use registry::{DeviceRegistry, Upsert};
pub use transport::{Transport, TransportEvent};
pub use util::{create_identifier, format_peripheral_id};

// Re-export from bluelink-types
pub use bluelink_types::{
    AdapterState, AdvertisementData, Capability, CharacteristicEntry, Device, DeviceId,
    ServiceCatalog, ServiceEntry, SessionPhase,
};
