//! Snapshot store commands.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use bluelink_store::SnapshotStore;
use bluelink_types::DeviceId;

use crate::cli::{OutputFormat, SnapshotAction};
use crate::format::{
    format_snapshot_json, format_snapshot_list_json, format_snapshot_list_text,
    format_snapshot_text,
};
use crate::util::{confirm, write_output};

pub fn cmd_snapshots(
    store: &mut SnapshotStore,
    action: SnapshotAction,
    output: Option<&PathBuf>,
    quiet: bool,
) -> Result<()> {
    match action {
        SnapshotAction::List { device, format } => {
            let device_id = device.map(DeviceId::new);
            let records: Vec<_> = match &device_id {
                Some(id) => store.for_device(id).collect(),
                None => store.records().iter().collect(),
            };
            let content = match format {
                OutputFormat::Json => format_snapshot_list_json(&records)?,
                OutputFormat::Text => format_snapshot_list_text(&records),
            };
            write_output(output, &content)
        }
        SnapshotAction::Show { id, format } => {
            let Some(record) = store.get(&id) else {
                bail!("No snapshot with id {}", id);
            };
            let content = match format {
                OutputFormat::Json => format_snapshot_json(record)?,
                OutputFormat::Text => format_snapshot_text(record),
            };
            write_output(output, &content)
        }
        SnapshotAction::Remove { id } => {
            if !store.remove(&id).context("Failed to remove snapshot")? {
                bail!("No snapshot with id {}", id);
            }
            if !quiet {
                eprintln!("Removed snapshot {}", id);
            }
            Ok(())
        }
        SnapshotAction::Clear { yes } => {
            if store.is_empty() {
                if !quiet {
                    eprintln!("No snapshots to clear.");
                }
                return Ok(());
            }
            let count = store.len();
            if !yes && !confirm(&format!("Delete {} snapshot(s)?", count))? {
                eprintln!("Aborted.");
                return Ok(());
            }
            store.clear().context("Failed to clear snapshots")?;
            if !quiet {
                eprintln!("Deleted {} snapshot(s).", count);
            }
            Ok(())
        }
        SnapshotAction::Export { path } => {
            store
                .export_to(&path)
                .with_context(|| format!("Failed to export to {}", path.display()))?;
            if !quiet {
                eprintln!("Exported {} snapshot(s) to {}", store.len(), path.display());
            }
            Ok(())
        }
        SnapshotAction::Import { path } => {
            let result = store
                .import_from(&path)
                .with_context(|| format!("Failed to import from {}", path.display()))?;
            if !quiet {
                eprintln!(
                    "Imported {} snapshot(s), skipped {} already present",
                    result.imported, result.skipped
                );
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluelink_types::{Sample, SnapshotRecord};
    use time::macros::datetime;

    fn store_with_records(dir: &tempfile::TempDir) -> (SnapshotStore, SnapshotRecord) {
        let mut store = SnapshotStore::open(dir.path().join("snapshots.json")).unwrap();
        let first = SnapshotRecord::new(
            "Band",
            DeviceId::new("AA:01"),
            datetime!(2025-01-01 10:00 UTC),
            vec![Sample::new(0, -50.0)],
        );
        let second = SnapshotRecord::new(
            "Thermo",
            DeviceId::new("AA:02"),
            datetime!(2025-01-02 10:00 UTC),
            vec![],
        );
        store.add(first.clone()).unwrap();
        store.add(second).unwrap();
        (store, first)
    }

    #[test]
    fn test_list_filters_by_device() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, first) = store_with_records(&dir);
        let out = dir.path().join("list.txt");

        cmd_snapshots(
            &mut store,
            SnapshotAction::List {
                device: Some("AA:01".to_string()),
                format: OutputFormat::Text,
            },
            Some(&out),
            true,
        )
        .unwrap();

        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.contains(&first.id.to_string()));
        assert!(!text.contains("Thermo"));
    }

    #[test]
    fn test_show_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = store_with_records(&dir);
        let result = cmd_snapshots(
            &mut store,
            SnapshotAction::Show {
                id: uuid::Uuid::new_v4(),
                format: OutputFormat::Text,
            },
            None,
            true,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_remove_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, first) = store_with_records(&dir);

        cmd_snapshots(&mut store, SnapshotAction::Remove { id: first.id }, None, true).unwrap();
        assert_eq!(store.len(), 1);
        assert!(cmd_snapshots(&mut store, SnapshotAction::Remove { id: first.id }, None, true).is_err());

        cmd_snapshots(&mut store, SnapshotAction::Clear { yes: true }, None, true).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_export_then_import_skips_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = store_with_records(&dir);
        let backup = dir.path().join("backup.json");

        cmd_snapshots(&mut store, SnapshotAction::Export { path: backup.clone() }, None, true)
            .unwrap();

        let mut other = SnapshotStore::open(dir.path().join("other.json")).unwrap();
        cmd_snapshots(&mut other, SnapshotAction::Import { path: backup.clone() }, None, true)
            .unwrap();
        assert_eq!(other.len(), 2);

        cmd_snapshots(&mut other, SnapshotAction::Import { path: backup }, None, true).unwrap();
        assert_eq!(other.len(), 2);
    }
}
