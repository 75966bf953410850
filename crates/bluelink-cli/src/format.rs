//! Output formatting for text and JSON output.

use std::fmt::Write as _;

use anyhow::Result;
use bluelink_types::{Device, ServiceCatalog, SnapshotRecord, uuids};
use serde::Serialize;
use uuid::Uuid;

/// Timestamp format used in text output.
const TIME_FORMAT: &[time::format_description::BorrowedFormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

fn as_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut out = serde_json::to_string_pretty(value)?;
    out.push('\n');
    Ok(out)
}

/// UUID with its assigned name when it has one.
fn describe_uuid(uuid: &Uuid) -> String {
    match uuids::well_known_name(uuid) {
        Some(name) => format!("{} ({})", uuid, name),
        None => uuid.to_string(),
    }
}

fn format_rssi(rssi: Option<i16>) -> String {
    rssi.map_or_else(|| "-".to_string(), |r| format!("{} dBm", r))
}

// ========== Scan ==========

#[must_use]
pub fn format_scan_text(devices: &[Device]) -> String {
    if devices.is_empty() {
        return "No devices found.\n".to_string();
    }

    let name_width = devices
        .iter()
        .map(|d| d.display_name().chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());
    let id_width = devices
        .iter()
        .map(|d| d.id.as_str().len())
        .max()
        .unwrap_or(0)
        .max("Identifier".len());

    let mut out = format!("Found {} device(s)\n\n", devices.len());
    let _ = writeln!(
        out,
        "{:<name_width$}  {:<id_width$}  {:>8}  Services",
        "Name", "Identifier", "RSSI"
    );
    for device in devices {
        let _ = writeln!(
            out,
            "{:<name_width$}  {:<id_width$}  {:>8}  {}",
            device.display_name(),
            device.id,
            format_rssi(device.rssi),
            device.advertisement.services.len()
        );
    }
    out
}

pub fn format_scan_json(devices: &[Device]) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        devices: &'a [Device],
    }

    as_json(&ScanResult {
        count: devices.len(),
        devices,
    })
}

// ========== Connect ==========

#[must_use]
pub fn format_catalog_text(device: &Device, catalog: &ServiceCatalog) -> String {
    let mut out = format!(
        "{} [{}]\n{} service(s), {} characteristic(s)\n",
        device.display_name(),
        device.id,
        catalog.len(),
        catalog.characteristic_count()
    );

    for service in catalog.services() {
        let _ = writeln!(out, "\nService {}", describe_uuid(&service.uuid));
        if service.characteristics.is_empty() {
            out.push_str("  (no characteristics)\n");
        }
        for characteristic in &service.characteristics {
            let capabilities: Vec<String> = characteristic
                .capabilities
                .iter()
                .map(ToString::to_string)
                .collect();
            let _ = writeln!(
                out,
                "  {}  [{}]",
                describe_uuid(&characteristic.uuid),
                capabilities.join(", ")
            );
        }
    }
    out
}

pub fn format_catalog_json(device: &Device, catalog: &ServiceCatalog) -> Result<String> {
    #[derive(Serialize)]
    struct ConnectResult<'a> {
        device: &'a Device,
        catalog: &'a ServiceCatalog,
    }

    as_json(&ConnectResult { device, catalog })
}

// ========== Snapshots ==========

fn format_time(record: &SnapshotRecord) -> String {
    record
        .captured_at
        .format(TIME_FORMAT)
        .unwrap_or_else(|_| record.captured_at.to_string())
}

#[must_use]
pub fn format_snapshot_list_text(records: &[&SnapshotRecord]) -> String {
    if records.is_empty() {
        return "No snapshots stored.\n".to_string();
    }

    let mut out = String::new();
    for record in records {
        let summary = record
            .summary()
            .map(|s| format!("avg {:.1} over {} sample(s)", s.avg, s.count))
            .unwrap_or_else(|| "no samples".to_string());
        let _ = writeln!(
            out,
            "{}  {}  {} [{}]  {}",
            record.id,
            format_time(record),
            record.device_name,
            record.device_id,
            summary
        );
    }
    out
}

pub fn format_snapshot_list_json(records: &[&SnapshotRecord]) -> Result<String> {
    as_json(records)
}

#[must_use]
pub fn format_snapshot_text(record: &SnapshotRecord) -> String {
    let mut out = format!(
        "Snapshot {}\nDevice:   {} [{}]\nCaptured: {}\nSamples:  {}\n",
        record.id,
        record.device_name,
        record.device_id,
        format_time(record),
        record.samples.len()
    );

    if let Some(summary) = record.summary() {
        let _ = writeln!(
            out,
            "Min/Avg/Max: {:.1} / {:.1} / {:.1}",
            summary.min, summary.avg, summary.max
        );
    }

    if !record.samples.is_empty() {
        out.push_str("\n  Offset     Value\n");
        for sample in &record.samples {
            let _ = writeln!(out, "  {:>5}s  {:>8.1}", sample.offset_secs, sample.value);
        }
    }
    out
}

pub fn format_snapshot_json(record: &SnapshotRecord) -> Result<String> {
    as_json(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluelink_types::uuids::{BATTERY_LEVEL, BATTERY_SERVICE};
    use bluelink_types::{
        AdvertisementData, Capability, CharacteristicEntry, DeviceId, Sample,
    };
    use time::macros::datetime;

    fn device(name: Option<&str>, id: &str, rssi: Option<i16>) -> Device {
        Device::new(
            DeviceId::new(id),
            name.map(str::to_string),
            rssi,
            AdvertisementData::default(),
        )
    }

    fn record(samples: Vec<Sample>) -> SnapshotRecord {
        SnapshotRecord::new(
            "Thermo",
            DeviceId::new("AA:BB"),
            datetime!(2025-03-04 05:06:07 UTC),
            samples,
        )
    }

    #[test]
    fn test_scan_text_empty() {
        assert_eq!(format_scan_text(&[]), "No devices found.\n");
    }

    #[test]
    fn test_scan_text_lists_devices() {
        let devices = vec![
            device(Some("Thermometer"), "AA:BB:CC:DD:EE:01", Some(-61)),
            device(None, "AA:BB:CC:DD:EE:02", None),
        ];
        let text = format_scan_text(&devices);
        assert!(text.starts_with("Found 2 device(s)"));
        assert!(text.contains("Thermometer"));
        assert!(text.contains("-61 dBm"));
        assert!(text.contains("AA:BB:CC:DD:EE:02"));
    }

    #[test]
    fn test_scan_json_shape() {
        let devices = vec![device(Some("Thermometer"), "AA", Some(-61))];
        let value: serde_json::Value =
            serde_json::from_str(&format_scan_json(&devices).unwrap()).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["devices"][0]["id"], "AA");
        assert_eq!(value["devices"][0]["rssi"], -61);
    }

    #[test]
    fn test_catalog_text_uses_known_names() {
        let mut catalog = ServiceCatalog::new();
        catalog.add_service(BATTERY_SERVICE);
        catalog.set_characteristics(
            &BATTERY_SERVICE,
            vec![
                CharacteristicEntry::new(BATTERY_LEVEL)
                    .with(Capability::Read)
                    .with(Capability::Notify),
            ],
        );

        let text = format_catalog_text(&device(Some("Band"), "AA", None), &catalog);
        assert!(text.contains("1 service(s), 1 characteristic(s)"));
        assert!(text.contains("(Battery)"));
        assert!(text.contains("Battery Level"));
        assert!(text.contains("read, notify"));
    }

    #[test]
    fn test_catalog_text_marks_empty_service() {
        let mut catalog = ServiceCatalog::new();
        catalog.add_service(BATTERY_SERVICE);
        let text = format_catalog_text(&device(None, "AA", None), &catalog);
        assert!(text.contains("(no characteristics)"));
    }

    #[test]
    fn test_snapshot_list_text() {
        let first = record(vec![Sample::new(0, 20.0), Sample::new(1, 22.0)]);
        let second = record(vec![]);
        let text = format_snapshot_list_text(&[&first, &second]);
        assert!(text.contains("2025-03-04 05:06:07"));
        assert!(text.contains("avg 21.0 over 2 sample(s)"));
        assert!(text.contains("no samples"));
        assert_eq!(format_snapshot_list_text(&[]), "No snapshots stored.\n");
    }

    #[test]
    fn test_snapshot_detail_text() {
        let snapshot = record(vec![Sample::new(0, -70.0), Sample::new(2, -60.0)]);
        let text = format_snapshot_text(&snapshot);
        assert!(text.contains(&snapshot.id.to_string()));
        assert!(text.contains("Min/Avg/Max: -70.0 / -65.0 / -60.0"));
        assert!(text.contains("    2s"));
    }

    #[test]
    fn test_snapshot_json_roundtrips() {
        let snapshot = record(vec![Sample::new(0, 1.5)]);
        let json = format_snapshot_json(&snapshot).unwrap();
        let parsed: SnapshotRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, snapshot);
    }
}
