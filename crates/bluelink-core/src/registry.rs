//! Registry of devices seen since the last clear.
//!
//! Devices keep the list position of their first sighting. Later sightings update
//! the entry in place so a list view does not reshuffle on every RSSI change.

use std::collections::HashMap;

use bluelink_types::{AdvertisementData, Device, DeviceId};

/// Outcome of [`DeviceRegistry::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new device was appended at this position.
    Inserted(usize),
    /// An existing device at this position was updated.
    Updated(usize),
}

/// Ordered, de-duplicated set of discovered devices keyed by [`DeviceId`].
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: Vec<Device>,
    index: HashMap<DeviceId, usize>,
}

impl DeviceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting.
    pub fn upsert(
        &mut self,
        id: DeviceId,
        name: Option<String>,
        rssi: Option<i16>,
        advertisement: AdvertisementData,
    ) -> Upsert {
        if let Some(&position) = self.index.get(&id) {
            self.devices[position].record_sighting(name, rssi, advertisement);
            return Upsert::Updated(position);
        }

        let position = self.devices.len();
        self.index.insert(id.clone(), position);
        self.devices.push(Device::new(id, name, rssi, advertisement));
        Upsert::Inserted(position)
    }

    /// Look up a device.
    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.index.get(id).map(|&position| &self.devices[position])
    }

    /// Whether a device is present.
    pub fn contains(&self, id: &DeviceId) -> bool {
        self.index.contains_key(id)
    }

    /// List position of a device.
    pub fn position(&self, id: &DeviceId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Devices in first-seen order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Iterate devices in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter()
    }

    /// Number of devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True if no devices are registered.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Forget every device.
    pub fn clear(&mut self) {
        self.devices.clear();
        self.index.clear();
    }
}
