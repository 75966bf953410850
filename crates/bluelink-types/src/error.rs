//! Error types for data parsing in bluelink-types.

use thiserror::Error;

/// Errors that can occur when converting raw platform values into bluelink types.
///
/// This error type is platform-agnostic and does not include
/// BLE transport errors (those belong in bluelink-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A value could not be interpreted.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Raw adapter state code not known to this crate.
    #[error("Unknown adapter state code: {0}")]
    UnknownAdapterState(u8),
}

/// Result type alias using bluelink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
