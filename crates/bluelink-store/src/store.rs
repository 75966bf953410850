//! Main store implementation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use bluelink_types::{DeviceId, SnapshotRecord};

use crate::error::{Error, Result};

/// Outcome of [`SnapshotStore::import_from`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Records added to the store.
    pub imported: usize,
    /// Records skipped because a record with the same id already existed.
    pub skipped: usize,
}

/// JSON-file store for snapshot records.
///
/// The whole collection is one JSON array, kept newest-first and rewritten in full
/// on every change.
#[derive(Debug)]
pub struct SnapshotStore {
    path: Option<PathBuf>,
    records: Vec<SnapshotRecord>,
}

impl SnapshotStore {
    /// Open or create a store at the given path.
    ///
    /// A missing file is an empty store; the file and its directory are created on
    /// the first change.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut records = match read_document(path) {
            Ok(records) => records,
            Err(Error::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
                debug!("No snapshot file at {}, starting empty", path.display());
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        sort_newest_first(&mut records);
        info!(
            "Opened snapshot store at {} ({} records)",
            path.display(),
            records.len()
        );

        Ok(Self {
            path: Some(path.to_path_buf()),
            records,
        })
    }

    /// Open the default store location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_store_path())
    }

    /// A store that is never written to disk (for testing).
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Vec::new(),
        }
    }

    /// The backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// All records, newest first.
    pub fn records(&self) -> &[SnapshotRecord] {
        &self.records
    }

    /// Look up a record.
    pub fn get(&self, id: &Uuid) -> Option<&SnapshotRecord> {
        self.records.iter().find(|r| r.id == *id)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records captured from one device, newest first.
    pub fn for_device<'a>(
        &'a self,
        device_id: &'a DeviceId,
    ) -> impl Iterator<Item = &'a SnapshotRecord> + 'a {
        self.records.iter().filter(move |r| r.device_id == *device_id)
    }

    /// Add a record, replacing any record with the same id.
    pub fn add(&mut self, record: SnapshotRecord) -> Result<()> {
        let mut records = self.records.clone();
        records.retain(|r| r.id != record.id);
        debug!("Adding snapshot {} for {}", record.id, record.device_id);
        records.push(record);
        self.commit(records)
    }

    /// Remove a record. Returns `false` if it did not exist.
    pub fn remove(&mut self, id: &Uuid) -> Result<bool> {
        if self.get(id).is_none() {
            return Ok(false);
        }
        let records = self.records.iter().filter(|r| r.id != *id).cloned().collect();
        self.commit(records)?;
        debug!("Removed snapshot {}", id);
        Ok(true)
    }

    /// Remove every record.
    pub fn clear(&mut self) -> Result<()> {
        info!("Clearing {} snapshot(s)", self.records.len());
        self.commit(Vec::new())
    }

    /// Write the current document to another file.
    pub fn export_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        write_document(path, &self.records)?;
        info!("Exported {} snapshot(s) to {}", self.records.len(), path.display());
        Ok(())
    }

    /// Merge records from an exported document.
    ///
    /// Records whose id is already present are skipped.
    pub fn import_from<P: AsRef<Path>>(&mut self, path: P) -> Result<ImportResult> {
        let path = path.as_ref();
        let incoming = read_document(path)?;

        let mut result = ImportResult::default();
        let mut records = self.records.clone();
        for record in incoming {
            if records.iter().any(|r| r.id == record.id) {
                result.skipped += 1;
            } else {
                records.push(record);
                result.imported += 1;
            }
        }

        if result.imported > 0 {
            self.commit(records)?;
        }
        info!(
            "Imported {} snapshot(s) from {} ({} skipped)",
            result.imported,
            path.display(),
            result.skipped
        );
        Ok(result)
    }

    /// Sort, persist, then adopt `records`.
    ///
    /// The in-memory collection only changes once the file write succeeded.
    fn commit(&mut self, mut records: Vec<SnapshotRecord>) -> Result<()> {
        sort_newest_first(&mut records);
        if let Some(path) = &self.path {
            write_document(path, &records)?;
        }
        self.records = records;
        Ok(())
    }
}

/// Newest first; ties broken by id so the order is deterministic.
fn sort_newest_first(records: &mut [SnapshotRecord]) {
    records.sort_by(|a, b| {
        b.captured_at
            .cmp(&a.captured_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn read_document(path: &Path) -> Result<Vec<SnapshotRecord>> {
    let bytes = fs::read(path)?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        warn!("Snapshot file {} is empty", path.display());
        return Ok(Vec::new());
    }
    serde_json::from_slice(&bytes).map_err(|source| Error::Serialization {
        path: path.to_path_buf(),
        source,
    })
}

/// Write via a temporary sibling and rename, so readers never see a partial file.
fn write_document(path: &Path, records: &[SnapshotRecord]) -> Result<()> {
    let json = serde_json::to_vec_pretty(records).map_err(|source| Error::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluelink_types::Sample;
    use time::OffsetDateTime;
    use time::macros::datetime;

    fn record(device: &str, captured_at: OffsetDateTime) -> SnapshotRecord {
        SnapshotRecord {
            id: Uuid::new_v4(),
            device_name: format!("Device {device}"),
            device_id: DeviceId::new(device),
            captured_at,
            samples: vec![Sample::new(0, 1.0), Sample::new(60, 3.0)],
        }
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshots.json");

        let store = SnapshotStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(!path.parent().unwrap().exists());
        assert!(!path.exists(), "nothing written until the first change");
    }

    #[test]
    fn test_first_change_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("snapshots.json");

        let mut store = SnapshotStore::open(&path).unwrap();
        assert!(!path.parent().unwrap().exists());

        store.add(record("AA:01", datetime!(2025-01-01 10:00 UTC))).unwrap();
        assert!(path.exists());
        assert_eq!(SnapshotStore::open(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_open_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        fs::write(&path, "{ not json").unwrap();

        assert!(matches!(
            SnapshotStore::open(&path),
            Err(Error::Serialization { .. })
        ));
    }

    #[test]
    fn test_add_sorts_newest_first_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        let mut store = SnapshotStore::open(&path).unwrap();

        let old = record("A", datetime!(2024-01-01 10:00 UTC));
        let new = record("B", datetime!(2024-06-01 10:00 UTC));
        store.add(old.clone()).unwrap();
        store.add(new.clone()).unwrap();

        assert_eq!(store.records()[0].id, new.id);
        assert_eq!(store.records()[1].id, old.id);

        let reopened = SnapshotStore::open(&path).unwrap();
        assert_eq!(reopened.records(), store.records());
    }

    #[test]
    fn test_document_is_a_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        let mut store = SnapshotStore::open(&path).unwrap();
        store.add(record("A", datetime!(2024-01-01 10:00 UTC))).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        let array = value.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["captured_at"], "2024-01-01T10:00:00Z");
        assert_eq!(array[0]["device_id"], "A");
    }

    #[test]
    fn test_ties_are_ordered_by_id() {
        let at = datetime!(2024-03-01 12:00 UTC);
        let mut store = SnapshotStore::in_memory();
        let a = record("A", at);
        let b = record("B", at);
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        let mut expected = vec![a.id, b.id];
        expected.sort();
        let actual: Vec<Uuid> = store.records().iter().map(|r| r.id).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_add_same_id_replaces() {
        let mut store = SnapshotStore::in_memory();
        let mut rec = record("A", datetime!(2024-01-01 10:00 UTC));
        store.add(rec.clone()).unwrap();
        rec.device_name = "Renamed".into();
        store.add(rec.clone()).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&rec.id).unwrap().device_name, "Renamed");
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        let mut store = SnapshotStore::open(&path).unwrap();
        let a = record("A", datetime!(2024-01-01 10:00 UTC));
        let b = record("B", datetime!(2024-01-02 10:00 UTC));
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        assert!(store.remove(&a.id).unwrap());
        assert!(!store.remove(&a.id).unwrap());
        assert_eq!(SnapshotStore::open(&path).unwrap().len(), 1);

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(SnapshotStore::open(&path).unwrap().is_empty());
    }

    #[test]
    fn test_for_device() {
        let mut store = SnapshotStore::in_memory();
        store.add(record("A", datetime!(2024-01-01 10:00 UTC))).unwrap();
        store.add(record("B", datetime!(2024-01-02 10:00 UTC))).unwrap();
        store.add(record("A", datetime!(2024-01-03 10:00 UTC))).unwrap();

        let device = DeviceId::new("A");
        let found: Vec<_> = store.for_device(&device).collect();
        assert_eq!(found.len(), 2);
        assert!(found[0].captured_at > found[1].captured_at);
    }

    #[test]
    fn test_export_then_import_merges() {
        let dir = tempfile::tempdir().unwrap();
        let export = dir.path().join("export.json");

        let mut source = SnapshotStore::in_memory();
        let shared = record("A", datetime!(2024-01-01 10:00 UTC));
        let fresh = record("B", datetime!(2024-02-01 10:00 UTC));
        source.add(shared.clone()).unwrap();
        source.add(fresh.clone()).unwrap();
        source.export_to(&export).unwrap();

        let target_path = dir.path().join("target.json");
        let mut target = SnapshotStore::open(&target_path).unwrap();
        target.add(shared.clone()).unwrap();

        let result = target.import_from(&export).unwrap();
        assert_eq!(
            result,
            ImportResult {
                imported: 1,
                skipped: 1
            }
        );
        assert_eq!(target.len(), 2);
        assert_eq!(target.records()[0].id, fresh.id);
        assert_eq!(SnapshotStore::open(&target_path).unwrap().len(), 2);
    }

    #[test]
    fn test_import_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SnapshotStore::in_memory();
        assert!(matches!(
            store.import_from(dir.path().join("nope.json")),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn test_failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");
        let mut store = SnapshotStore::open(&path).unwrap();
        // A directory in place of the temporary file makes the write fail.
        fs::create_dir(dir.path().join("snapshots.json.tmp")).unwrap();

        assert!(store.add(record("A", datetime!(2024-01-01 10:00 UTC))).is_err());
        assert!(store.is_empty());
    }
}
