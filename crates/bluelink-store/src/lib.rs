//! Local persistence for bluelink data snapshots.
//!
//! Snapshots retrieved from peripherals are kept in a single JSON document: an
//! array of [`SnapshotRecord`]s, newest first, rewritten in full on every change.
//! The same document format is used to move snapshots between installations.
//!
//! # Features
//!
//! - Load on open, missing file means empty store
//! - Atomic rewrite (temporary file + rename) on add/remove/clear
//! - Per-device queries
//! - Export/import with duplicate detection by record id
//!
//! # Example
//!
//! ```no_run
//! use bluelink_store::SnapshotStore;
//!
//! let mut store = SnapshotStore::open_default()?;
//! for record in store.records() {
//!     println!("{} {}", record.captured_at, record.device_name);
//! }
//! let result = store.import_from("backup.json")?;
//! println!("imported {}, skipped {}", result.imported, result.skipped);
//! # Ok::<(), bluelink_store::Error>(())
//! ```

mod error;
mod store;

pub use bluelink_types::{Sample, SampleSummary, SnapshotRecord};
pub use error::{Error, Result};
pub use store::{ImportResult, SnapshotStore};

/// Default snapshot file path following platform conventions.
///
/// - Linux: `~/.local/share/bluelink/snapshots.json`
/// - macOS: `~/Library/Application Support/bluelink/snapshots.json`
/// - Windows: `C:\Users\<user>\AppData\Local\bluelink\snapshots.json`
pub fn default_store_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("bluelink")
        .join("snapshots.json")
}
