//! Error types for bluelink-store.

use std::path::PathBuf;

/// Result type for bluelink-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in bluelink-store.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Failed to create the store directory.
    #[error("Failed to create store directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A snapshot document could not be parsed or written.
    #[error("Serialization error in {path}: {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
