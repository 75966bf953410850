//! Data snapshots retrieved from a connected device.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{Device, DeviceId};

/// One sampled value inside a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Sample {
    /// Seconds since the start of the snapshot.
    pub offset_secs: u32,
    /// Sampled value.
    pub value: f64,
}

impl Sample {
    /// Create a sample.
    pub fn new(offset_secs: u32, value: f64) -> Self {
        Self { offset_secs, value }
    }
}

/// Min/avg/max over the samples of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SampleSummary {
    /// Smallest value.
    pub min: f64,
    /// Arithmetic mean.
    pub avg: f64,
    /// Largest value.
    pub max: f64,
    /// Number of finite samples considered.
    pub count: usize,
}

impl SampleSummary {
    /// Summarise finite values; `None` when there are none.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for value in values.into_iter().filter(|v| v.is_finite()) {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        (count > 0).then(|| SampleSummary {
            min,
            avg: sum / count as f64,
            max,
            count,
        })
    }
}

/// A snapshot downloaded from a device after its session reached ready.
///
/// The store treats the sample payload as opaque; only [`SnapshotRecord::summary`]
/// looks inside it.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SnapshotRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// Device display name at capture time.
    pub device_name: String,
    /// Device identifier at capture time.
    pub device_id: DeviceId,
    /// When the snapshot was captured.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub captured_at: OffsetDateTime,
    /// Sampled values.
    pub samples: Vec<Sample>,
}

impl SnapshotRecord {
    /// Create a record with a fresh random id.
    pub fn new(
        device_name: impl Into<String>,
        device_id: DeviceId,
        captured_at: OffsetDateTime,
        samples: Vec<Sample>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_name: device_name.into(),
            device_id,
            captured_at,
            samples,
        }
    }

    /// Create a record for a discovered device, captured now.
    pub fn for_device(device: &Device, samples: Vec<Sample>) -> Self {
        Self::new(
            device.display_name(),
            device.id.clone(),
            OffsetDateTime::now_utc(),
            samples,
        )
    }

    /// Min/avg/max over the samples.
    pub fn summary(&self) -> Option<SampleSummary> {
        SampleSummary::from_values(self.samples.iter().map(|s| s.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn test_summary_of_samples() {
        let record = SnapshotRecord::new(
            "Thermo",
            DeviceId::new("AA:BB"),
            datetime!(2025-01-01 12:00 UTC),
            vec![Sample::new(0, 20.0), Sample::new(60, 22.0), Sample::new(120, 24.0)],
        );

        let summary = record.summary().unwrap();
        assert_eq!(summary.min, 20.0);
        assert_eq!(summary.max, 24.0);
        assert!((summary.avg - 22.0).abs() < f64::EPSILON);
        assert_eq!(summary.count, 3);
    }

    #[test]
    fn test_summary_empty() {
        assert!(SampleSummary::from_values(Vec::new()).is_none());
    }

    #[test]
    fn test_summary_skips_non_finite() {
        let summary = SampleSummary::from_values([1.0, f64::NAN, 3.0, f64::INFINITY]).unwrap();
        assert_eq!(summary.count, 2);
        assert_eq!(summary.avg, 2.0);
    }

    #[test]
    fn test_for_device_uses_display_name() {
        let device = Device::new(DeviceId::new("id-1"), None, Some(-40), Default::default());
        let record = SnapshotRecord::for_device(&device, vec![]);
        assert_eq!(record.device_name, "Unknown");
        assert_eq!(record.device_id, DeviceId::new("id-1"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_record_json_uses_rfc3339() {
        let record = SnapshotRecord::new(
            "Thermo",
            DeviceId::new("AA:BB"),
            datetime!(2025-01-01 12:00 UTC),
            vec![Sample::new(0, 1.5)],
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"captured_at\":\"2025-01-01T12:00:00Z\""));
        assert!(json.contains("\"device_id\":\"AA:BB\""));

        let back: SnapshotRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
