//! Conversions between btleplug types and bluelink types.

use std::collections::BTreeSet;

use btleplug::api::{CharPropFlags, PeripheralProperties};
use btleplug::platform::PeripheralId;

use bluelink_types::{AdvertisementData, Capability, DeviceId};

/// Address reported by platforms that hide the Bluetooth address (macOS).
const HIDDEN_ADDRESS: &str = "00:00:00:00:00:00";

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// The stable identifier for a peripheral.
///
/// Uses the Bluetooth address where the platform exposes it, and the platform's
/// peripheral ID where it does not.
pub fn create_identifier(address: &str, peripheral_id: &PeripheralId) -> DeviceId {
    if is_hidden_address(address) {
        DeviceId::new(format_peripheral_id(peripheral_id))
    } else {
        DeviceId::new(address)
    }
}

fn is_hidden_address(address: &str) -> bool {
    address.is_empty() || address == HIDDEN_ADDRESS
}

/// Map GATT characteristic properties to capabilities.
///
/// Write-without-response counts as Write; Indicate counts as Notify.
pub fn capabilities_from_flags(flags: CharPropFlags) -> BTreeSet<Capability> {
    let mut capabilities = BTreeSet::new();
    if flags.contains(CharPropFlags::READ) {
        capabilities.insert(Capability::Read);
    }
    if flags.intersects(CharPropFlags::WRITE | CharPropFlags::WRITE_WITHOUT_RESPONSE) {
        capabilities.insert(Capability::Write);
    }
    if flags.intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE) {
        capabilities.insert(Capability::Notify);
    }
    capabilities
}

/// Copy the advertisement payload out of peripheral properties.
pub fn advertisement_from_properties(properties: &PeripheralProperties) -> AdvertisementData {
    AdvertisementData {
        manufacturer_data: properties
            .manufacturer_data
            .iter()
            .map(|(id, data)| (*id, data.clone()))
            .collect(),
        service_data: properties
            .service_data
            .iter()
            .map(|(uuid, data)| (*uuid, data.clone()))
            .collect(),
        services: properties.services.clone(),
        tx_power_level: properties.tx_power_level,
    }
}
