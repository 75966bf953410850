//! Bluetooth SIG base UUID helpers and well-known GATT assigned numbers.
//!
//! Services and characteristics are identified by 128-bit UUIDs. Those assigned by
//! the Bluetooth SIG share a common base and are usually written as 16-bit short forms.

use uuid::{Uuid, uuid};

use crate::error::{ParseError, ParseResult};

/// Bluetooth SIG base UUID (`0000xxxx-0000-1000-8000-00805f9b34fb`).
pub const BLUETOOTH_BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

// --- Standard Services ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = from_short(0x1800);

/// Generic Attribute Profile (GATT) service.
pub const GATT_SERVICE: Uuid = from_short(0x1801);

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = from_short(0x180A);

/// Battery service.
pub const BATTERY_SERVICE: Uuid = from_short(0x180F);

/// Heart Rate service.
pub const HEART_RATE_SERVICE: Uuid = from_short(0x180D);

/// Environmental Sensing service.
pub const ENVIRONMENTAL_SENSING_SERVICE: Uuid = from_short(0x181A);

// --- Standard Characteristics ---

/// Device name characteristic.
pub const DEVICE_NAME: Uuid = from_short(0x2A00);

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = from_short(0x2A19);

/// Model number string characteristic.
pub const MODEL_NUMBER: Uuid = from_short(0x2A24);

/// Serial number string characteristic.
pub const SERIAL_NUMBER: Uuid = from_short(0x2A25);

/// Firmware revision string characteristic.
pub const FIRMWARE_REVISION: Uuid = from_short(0x2A26);

/// Manufacturer name string characteristic.
pub const MANUFACTURER_NAME: Uuid = from_short(0x2A29);

/// Heart rate measurement characteristic.
pub const HEART_RATE_MEASUREMENT: Uuid = from_short(0x2A37);

/// Temperature characteristic.
pub const TEMPERATURE: Uuid = from_short(0x2A6E);

/// Expand a 16-bit assigned number onto the Bluetooth base UUID.
pub const fn from_short(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID.as_u128() | ((short as u128) << 96))
}

/// Return the 16-bit short form if `uuid` lies on the Bluetooth base UUID.
pub fn short_form(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    let base_mask: u128 = !(0xFFFF_FFFFu128 << 96);
    if value & base_mask == BLUETOOTH_BASE_UUID.as_u128() && value >> 112 == 0 {
        Some((value >> 96) as u16)
    } else {
        None
    }
}

/// Human-readable name for the assigned numbers listed in this module.
pub fn well_known_name(uuid: &Uuid) -> Option<&'static str> {
    let name = match short_form(uuid)? {
        0x1800 => "Generic Access",
        0x1801 => "Generic Attribute",
        0x180A => "Device Information",
        0x180D => "Heart Rate",
        0x180F => "Battery",
        0x181A => "Environmental Sensing",
        0x2A00 => "Device Name",
        0x2A19 => "Battery Level",
        0x2A24 => "Model Number",
        0x2A25 => "Serial Number",
        0x2A26 => "Firmware Revision",
        0x2A29 => "Manufacturer Name",
        0x2A37 => "Heart Rate Measurement",
        0x2A6E => "Temperature",
        _ => return None,
    };
    Some(name)
}

/// Parse either a full UUID or a 16-bit short form such as `180f` / `0x180F`.
///
/// # Examples
///
/// ```
/// use bluelink_types::uuid::{parse_uuid, BATTERY_SERVICE};
///
/// assert_eq!(parse_uuid("0x180F").unwrap(), BATTERY_SERVICE);
/// assert_eq!(parse_uuid("0000180f-0000-1000-8000-00805f9b34fb").unwrap(), BATTERY_SERVICE);
/// assert!(parse_uuid("not-a-uuid").is_err());
/// ```
pub fn parse_uuid(input: &str) -> ParseResult<Uuid> {
    let trimmed = input.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex.len() <= 4 && !hex.is_empty() {
        return u16::from_str_radix(hex, 16)
            .map(from_short)
            .map_err(|_| ParseError::InvalidValue(format!("invalid short UUID '{}'", input)));
    }

    Uuid::parse_str(trimmed)
        .map_err(|e| ParseError::InvalidValue(format!("invalid UUID '{}': {}", input, e)))
}
