//! Core types for adapter state, discovered devices and GATT catalogs.

use core::fmt;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ParseError;

/// Readiness of the local Bluetooth adapter.
///
/// Transitions are pushed by the platform transport; nothing in bluelink ever
/// requests one. Every command except state inspection requires
/// [`AdapterState::PoweredOn`].
///
/// # Examples
///
/// ```
/// use bluelink_types::AdapterState;
///
/// assert!(AdapterState::PoweredOn.is_ready());
/// assert!(!AdapterState::Unknown.is_ready());
/// assert_eq!(AdapterState::try_from(5).unwrap(), AdapterState::PoweredOn);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AdapterState {
    /// No state notification received yet, or the adapter is resetting.
    #[default]
    Unknown,
    /// The radio is switched off.
    PoweredOff,
    /// The application is not allowed to use Bluetooth.
    Unauthorized,
    /// The platform has no usable BLE central role.
    Unsupported,
    /// Ready for scanning and connections.
    PoweredOn,
}

impl AdapterState {
    /// Whether commands may be issued in this state.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, AdapterState::PoweredOn)
    }

    /// Whether entering this state tears down scanning, the registry and any session.
    ///
    /// `Unknown` is deliberately excluded: it is reported while the adapter resets and
    /// is handled separately by the lifecycle.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AdapterState::PoweredOff | AdapterState::Unauthorized | AdapterState::Unsupported
        )
    }
}

/// Raw manager-state codes as reported by CoreBluetooth style stacks
/// (`0` unknown, `1` resetting, `2` unsupported, `3` unauthorized, `4` off, `5` on).
impl TryFrom<u8> for AdapterState {
    type Error = ParseError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 | 1 => Ok(AdapterState::Unknown),
            2 => Ok(AdapterState::Unsupported),
            3 => Ok(AdapterState::Unauthorized),
            4 => Ok(AdapterState::PoweredOff),
            5 => Ok(AdapterState::PoweredOn),
            other => Err(ParseError::UnknownAdapterState(other)),
        }
    }
}

impl fmt::Display for AdapterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterState::Unknown => write!(f, "unknown"),
            AdapterState::PoweredOff => write!(f, "powered off"),
            AdapterState::Unauthorized => write!(f, "unauthorized"),
            AdapterState::Unsupported => write!(f, "unsupported"),
            AdapterState::PoweredOn => write!(f, "powered on"),
        }
    }
}

/// Stable identifier of a remote peripheral.
///
/// On macOS this is the CoreBluetooth peripheral UUID, elsewhere the MAC address.
/// Display names are never used for identity because they are not unique.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct DeviceId(String);

impl DeviceId {
    /// Create an identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Advertisement payload from the most recent sighting of a device.
///
/// bluelink never interprets these bytes; they are kept so callers can.
/// Maps are ordered so two identical sightings compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AdvertisementData {
    /// Manufacturer specific data keyed by company identifier.
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    /// Service data keyed by service UUID.
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
    /// Advertised service UUIDs.
    pub services: Vec<Uuid>,
    /// Advertised transmit power in dBm.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub tx_power_level: Option<i16>,
}

impl AdvertisementData {
    /// True when the advertisement carried nothing beyond the address.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manufacturer_data.is_empty()
            && self.service_data.is_empty()
            && self.services.is_empty()
            && self.tx_power_level.is_none()
    }
}

/// A peripheral seen during discovery.
///
/// Equality of registry entries is decided by [`Device::id`] alone; the other
/// fields describe the latest sighting.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Stable identifier.
    pub id: DeviceId,
    /// Advertised local name, if any sighting carried one.
    pub name: Option<String>,
    /// Signal strength of the latest sighting in dBm.
    pub rssi: Option<i16>,
    /// Latest advertisement payload.
    pub advertisement: AdvertisementData,
    /// Number of sightings since the device entered the registry.
    pub sightings: u32,
}

impl Device {
    /// Create a device entry from its first sighting.
    pub fn new(
        id: DeviceId,
        name: Option<String>,
        rssi: Option<i16>,
        advertisement: AdvertisementData,
    ) -> Self {
        Self {
            id,
            name,
            rssi,
            advertisement,
            sightings: 1,
        }
    }

    /// Name for display, falling back to `"Unknown"`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown")
    }

    /// Fold a later sighting into this entry.
    ///
    /// A sighting without a name keeps the previously known name, since scan
    /// responses carrying the name do not accompany every advertisement.
    pub fn record_sighting(
        &mut self,
        name: Option<String>,
        rssi: Option<i16>,
        advertisement: AdvertisementData,
    ) {
        if name.is_some() {
            self.name = name;
        }
        self.rssi = rssi;
        self.advertisement = advertisement;
        self.sightings = self.sightings.saturating_add(1);
    }
}

/// Operation a characteristic supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Capability {
    /// Value can be read.
    Read,
    /// Value can be written (with or without response).
    Write,
    /// Value changes can be subscribed to (notify or indicate).
    Notify,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Read => write!(f, "read"),
            Capability::Write => write!(f, "write"),
            Capability::Notify => write!(f, "notify"),
        }
    }
}

/// A characteristic discovered within a service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CharacteristicEntry {
    /// Characteristic UUID.
    pub uuid: Uuid,
    /// Supported operations.
    pub capabilities: BTreeSet<Capability>,
}

impl CharacteristicEntry {
    /// Create a characteristic with no capabilities.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            capabilities: BTreeSet::new(),
        }
    }

    /// Add a capability.
    #[must_use]
    pub fn with(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    /// Whether the characteristic supports `capability`.
    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }
}

/// A service and the characteristics discovered for it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ServiceEntry {
    /// Service UUID.
    pub uuid: Uuid,
    /// Characteristics in the order the peripheral reported them.
    ///
    /// Empty when characteristic discovery for this service failed.
    pub characteristics: Vec<CharacteristicEntry>,
}

impl ServiceEntry {
    /// Create a service entry with no characteristics yet.
    pub fn new(uuid: Uuid) -> Self {
        Self {
            uuid,
            characteristics: Vec::new(),
        }
    }
}

/// Services and characteristics of a connected device.
///
/// Filled progressively while the session is discovering; complete once the
/// session reaches [`SessionPhase::Ready`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ServiceCatalog {
    services: Vec<ServiceEntry>,
}

impl ServiceCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service if it is not already present.
    ///
    /// Returns `false` for a duplicate.
    pub fn add_service(&mut self, uuid: Uuid) -> bool {
        if self.service(&uuid).is_some() {
            return false;
        }
        self.services.push(ServiceEntry::new(uuid));
        true
    }

    /// Replace the characteristics of a known service.
    ///
    /// Returns `false` if the service is not in the catalog.
    pub fn set_characteristics(
        &mut self,
        service: &Uuid,
        characteristics: Vec<CharacteristicEntry>,
    ) -> bool {
        match self.services.iter_mut().find(|s| s.uuid == *service) {
            Some(entry) => {
                entry.characteristics = characteristics;
                true
            }
            None => false,
        }
    }

    /// All services in discovery order.
    pub fn services(&self) -> &[ServiceEntry] {
        &self.services
    }

    /// Look up a service by UUID.
    pub fn service(&self, uuid: &Uuid) -> Option<&ServiceEntry> {
        self.services.iter().find(|s| s.uuid == *uuid)
    }

    /// Number of services.
    pub fn len(&self) -> usize {
        self.services.len()
    }

    /// True if no services were discovered.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Total number of characteristics across all services.
    pub fn characteristic_count(&self) -> usize {
        self.services.iter().map(|s| s.characteristics.len()).sum()
    }

    /// Find a characteristic anywhere in the catalog, with its owning service.
    pub fn find_characteristic(&self, uuid: &Uuid) -> Option<(&ServiceEntry, &CharacteristicEntry)> {
        self.services.iter().find_map(|service| {
            service
                .characteristics
                .iter()
                .find(|c| c.uuid == *uuid)
                .map(|c| (service, c))
        })
    }

    /// All characteristics supporting `capability`, in catalog order.
    pub fn characteristics_with(&self, capability: Capability) -> Vec<&CharacteristicEntry> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .filter(|c| c.supports(capability))
            .collect()
    }
}

/// Phase of the active connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "phase", rename_all = "snake_case"))]
pub enum SessionPhase {
    /// Connect request issued, waiting for the link.
    Connecting,
    /// Linked, waiting for the service list.
    ServiceDiscovery,
    /// Waiting for per-service characteristic results.
    CharacteristicDiscovery {
        /// Services that have not reported yet.
        remaining: usize,
    },
    /// Catalog complete.
    Ready,
}

impl SessionPhase {
    /// True for every phase before [`SessionPhase::Ready`].
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        !self.is_ready()
    }

    /// True once discovery is complete.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, SessionPhase::Ready)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Connecting => write!(f, "connecting"),
            SessionPhase::ServiceDiscovery => write!(f, "discovering services"),
            SessionPhase::CharacteristicDiscovery { remaining } => {
                write!(f, "discovering characteristics ({} remaining)", remaining)
            }
            SessionPhase::Ready => write!(f, "ready"),
        }
    }
}
