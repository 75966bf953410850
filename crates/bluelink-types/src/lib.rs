//! Platform-agnostic types for the bluelink BLE connection manager.
//!
//! This crate provides the data shared by the connection lifecycle
//! (bluelink-core), the snapshot store (bluelink-store) and front ends.
//!
//! # Features
//!
//! - Adapter readiness and session phases
//! - Discovered devices and their advertisement payloads
//! - Service/characteristic catalogs with capability flags
//! - Snapshot records with min/avg/max summaries
//! - Well-known GATT UUID helpers
//!
//! # Example
//!
//! ```
//! use bluelink_types::{Capability, CharacteristicEntry, ServiceCatalog};
//! use bluelink_types::uuid::{BATTERY_LEVEL, BATTERY_SERVICE};
//!
//! let mut catalog = ServiceCatalog::new();
//! catalog.add_service(BATTERY_SERVICE);
//! catalog.set_characteristics(
//!     &BATTERY_SERVICE,
//!     vec![CharacteristicEntry::new(BATTERY_LEVEL).with(Capability::Read)],
//! );
//! assert_eq!(catalog.characteristic_count(), 1);
//! ```

pub mod error;
pub mod snapshot;
pub mod types;
pub mod uuid;

pub use error::{ParseError, ParseResult};
pub use snapshot::{Sample, SampleSummary, SnapshotRecord};
pub use types::{
    AdapterState, AdvertisementData, Capability, CharacteristicEntry, Device, DeviceId,
    ServiceCatalog, ServiceEntry, SessionPhase,
};
pub use uuid as uuids;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uuid::{BATTERY_LEVEL, BATTERY_SERVICE, DEVICE_INFO_SERVICE, SERIAL_NUMBER};

    // --- AdapterState ---

    #[test]
    fn test_adapter_state_readiness() {
        assert!(AdapterState::PoweredOn.is_ready());
        for state in [
            AdapterState::Unknown,
            AdapterState::PoweredOff,
            AdapterState::Unauthorized,
            AdapterState::Unsupported,
        ] {
            assert!(!state.is_ready(), "{state} should not be ready");
        }
    }

    #[test]
    fn test_adapter_state_failure_states() {
        assert!(AdapterState::PoweredOff.is_failure());
        assert!(AdapterState::Unauthorized.is_failure());
        assert!(AdapterState::Unsupported.is_failure());
        assert!(!AdapterState::Unknown.is_failure());
        assert!(!AdapterState::PoweredOn.is_failure());
    }

    #[test]
    fn test_adapter_state_from_raw_codes() {
        assert_eq!(AdapterState::try_from(0).unwrap(), AdapterState::Unknown);
        assert_eq!(AdapterState::try_from(1).unwrap(), AdapterState::Unknown);
        assert_eq!(AdapterState::try_from(2).unwrap(), AdapterState::Unsupported);
        assert_eq!(AdapterState::try_from(3).unwrap(), AdapterState::Unauthorized);
        assert_eq!(AdapterState::try_from(4).unwrap(), AdapterState::PoweredOff);
        assert_eq!(AdapterState::try_from(5).unwrap(), AdapterState::PoweredOn);

        let err = AdapterState::try_from(9).unwrap_err();
        assert!(err.to_string().contains('9'));
    }

    #[test]
    fn test_adapter_state_default_is_unknown() {
        assert_eq!(AdapterState::default(), AdapterState::Unknown);
    }

    // --- Device ---

    #[test]
    fn test_device_sighting_keeps_known_name() {
        let mut device = Device::new(
            DeviceId::new("AA"),
            Some("Sensor".to_string()),
            Some(-70),
            AdvertisementData::default(),
        );

        device.record_sighting(None, Some(-60), AdvertisementData::default());

        assert_eq!(device.name.as_deref(), Some("Sensor"));
        assert_eq!(device.rssi, Some(-60));
        assert_eq!(device.sightings, 2);
    }

    #[test]
    fn test_device_sighting_replaces_name_and_advertisement() {
        let mut device = Device::new(DeviceId::new("AA"), None, None, AdvertisementData::default());
        let mut adv = AdvertisementData::default();
        adv.manufacturer_data.insert(0x004C, vec![1, 2, 3]);

        device.record_sighting(Some("Renamed".to_string()), None, adv.clone());

        assert_eq!(device.display_name(), "Renamed");
        assert_eq!(device.rssi, None);
        assert_eq!(device.advertisement, adv);
        assert!(!device.advertisement.is_empty());
    }

    #[test]
    fn test_device_id_conversions() {
        let id: DeviceId = "AA:BB:CC:DD:EE:FF".into();
        assert_eq!(id.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(id.to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(DeviceId::from(String::from("x")), DeviceId::new("x"));
    }

    // --- ServiceCatalog ---

    #[test]
    fn test_catalog_rejects_duplicate_services() {
        let mut catalog = ServiceCatalog::new();
        assert!(catalog.add_service(BATTERY_SERVICE));
        assert!(!catalog.add_service(BATTERY_SERVICE));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_catalog_set_characteristics_unknown_service() {
        let mut catalog = ServiceCatalog::new();
        assert!(!catalog.set_characteristics(&BATTERY_SERVICE, vec![]));
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_catalog_lookup() {
        let mut catalog = ServiceCatalog::new();
        catalog.add_service(BATTERY_SERVICE);
        catalog.add_service(DEVICE_INFO_SERVICE);
        catalog.set_characteristics(
            &BATTERY_SERVICE,
            vec![
                CharacteristicEntry::new(BATTERY_LEVEL)
                    .with(Capability::Read)
                    .with(Capability::Notify),
            ],
        );
        catalog.set_characteristics(
            &DEVICE_INFO_SERVICE,
            vec![CharacteristicEntry::new(SERIAL_NUMBER).with(Capability::Read)],
        );

        assert_eq!(catalog.characteristic_count(), 2);
        let (service, characteristic) = catalog.find_characteristic(&BATTERY_LEVEL).unwrap();
        assert_eq!(service.uuid, BATTERY_SERVICE);
        assert!(characteristic.supports(Capability::Notify));
        assert!(!characteristic.supports(Capability::Write));

        assert_eq!(catalog.characteristics_with(Capability::Read).len(), 2);
        assert_eq!(catalog.characteristics_with(Capability::Notify).len(), 1);
        assert!(catalog.characteristics_with(Capability::Write).is_empty());
    }

    // --- SessionPhase ---

    #[test]
    fn test_session_phase_flags() {
        assert!(SessionPhase::Connecting.is_in_flight());
        assert!(SessionPhase::ServiceDiscovery.is_in_flight());
        assert!(SessionPhase::CharacteristicDiscovery { remaining: 2 }.is_in_flight());
        assert!(SessionPhase::Ready.is_ready());
        assert!(!SessionPhase::Ready.is_in_flight());
    }

    #[test]
    fn test_session_phase_display() {
        assert_eq!(
            SessionPhase::CharacteristicDiscovery { remaining: 3 }.to_string(),
            "discovering characteristics (3 remaining)"
        );
    }

    // --- Serialization ---

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_shapes() {
        assert_eq!(
            serde_json::to_string(&AdapterState::PoweredOff).unwrap(),
            "\"powered_off\""
        );
        assert_eq!(
            serde_json::to_string(&SessionPhase::CharacteristicDiscovery { remaining: 1 }).unwrap(),
            r#"{"phase":"characteristic_discovery","remaining":1}"#
        );
        assert_eq!(serde_json::to_string(&DeviceId::new("id")).unwrap(), "\"id\"");
        assert_eq!(serde_json::to_string(&Capability::Notify).unwrap(), "\"notify\"");
    }
}
