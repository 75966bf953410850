//! Seam between the connection lifecycle and a platform BLE stack.
//!
//! Platform stacks are callback driven: a request is issued and its outcome arrives
//! later as a separate callback. A [`Transport`] therefore only *issues* requests and
//! returns immediately; every outcome is delivered as a [`TransportEvent`] on a single
//! channel that the manager consumes in order.
//!
//! Implementations provided by this crate:
//!
//! - [`crate::btle::BtleTransport`] for real adapters (btleplug)
//! - [`crate::mock::MockTransport`] for tests

use uuid::Uuid;

use bluelink_types::{AdapterState, AdvertisementData, CharacteristicEntry, DeviceId};

use crate::error::Result;

/// Requests the lifecycle issues to the platform stack.
///
/// Methods must not block. An `Err` means the request could not even be issued; once
/// a request is accepted its outcome is reported as a [`TransportEvent`].
pub trait Transport: Send + 'static {
    /// Scan for all peripherals with duplicate-advertisement suppression.
    fn start_scan(&mut self) -> Result<()>;

    /// Stop an active scan.
    fn stop_scan(&mut self) -> Result<()>;

    /// Open a link to a discovered peripheral.
    ///
    /// Reported as [`TransportEvent::ConnectResult`].
    fn connect(&mut self, id: &DeviceId) -> Result<()>;

    /// Close a link or cancel a pending connect.
    ///
    /// A confirmation may or may not follow as [`TransportEvent::Disconnected`].
    fn disconnect(&mut self, id: &DeviceId) -> Result<()>;

    /// Discover the primary services of a connected peripheral.
    ///
    /// Reported as [`TransportEvent::ServicesDiscovered`].
    fn discover_services(&mut self, id: &DeviceId) -> Result<()>;

    /// Discover the characteristics of one service.
    ///
    /// Reported as [`TransportEvent::CharacteristicsDiscovered`].
    fn discover_characteristics(&mut self, id: &DeviceId, service: &Uuid) -> Result<()>;
}

/// Callback delivered by the platform stack.
///
/// Failures carry the stack's own description as a string; the lifecycle decides
/// which [`crate::Error`] they become.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The adapter changed state.
    StateChanged(AdapterState),
    /// An advertisement was received.
    Discovered {
        /// Peripheral identifier.
        id: DeviceId,
        /// Advertised local name.
        name: Option<String>,
        /// Signal strength in dBm.
        rssi: Option<i16>,
        /// Advertisement payload.
        advertisement: AdvertisementData,
    },
    /// Outcome of [`Transport::connect`].
    ConnectResult {
        /// Peripheral identifier.
        id: DeviceId,
        /// `Err` holds the stack's failure description.
        result: std::result::Result<(), String>,
    },
    /// The link dropped without being asked to, or a disconnect was confirmed.
    Disconnected {
        /// Peripheral identifier.
        id: DeviceId,
        /// Error supplied by the stack, if any.
        error: Option<String>,
    },
    /// Outcome of [`Transport::discover_services`].
    ServicesDiscovered {
        /// Peripheral identifier.
        id: DeviceId,
        /// Service UUIDs, in no particular order.
        result: std::result::Result<Vec<Uuid>, String>,
    },
    /// Outcome of [`Transport::discover_characteristics`].
    CharacteristicsDiscovered {
        /// Peripheral identifier.
        id: DeviceId,
        /// The service that was queried.
        service: Uuid,
        /// Characteristics in reported order.
        result: std::result::Result<Vec<CharacteristicEntry>, String>,
    },
}

impl TransportEvent {
    /// The peripheral the event refers to, if any.
    pub fn device_id(&self) -> Option<&DeviceId> {
        match self {
            TransportEvent::StateChanged(_) => None,
            TransportEvent::Discovered { id, .. }
            | TransportEvent::ConnectResult { id, .. }
            | TransportEvent::Disconnected { id, .. }
            | TransportEvent::ServicesDiscovered { id, .. }
            | TransportEvent::CharacteristicsDiscovered { id, .. } => Some(id),
        }
    }
}
