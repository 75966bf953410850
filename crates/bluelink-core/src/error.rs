//! Error types for bluelink-core.
//!
//! This module defines every error the connection lifecycle can produce, and the
//! [`ErrorRecord`] kept in the manager's single-slot "last error".
//!
//! # Propagation
//!
//! | Error | Returned to caller | Written to error slot |
//! |-------|--------------------|-----------------------|
//! | [`Error::AdapterNotReady`] | synchronously | never |
//! | [`Error::ConnectionInProgress`] | synchronously | never |
//! | [`Error::DeviceNotFound`] | synchronously | never |
//! | [`Error::AdapterPoweredOff`] / `Unauthorized` / `Unsupported` | via pending connection | yes |
//! | [`Error::ConnectionFailed`] | via pending connection | yes |
//! | [`Error::Transport`] | via pending connection or command | yes |
//! | [`Error::Timeout`] | via pending connection | yes |
//! | [`Error::ServiceDiscoveryFailed`] | broadcast event only | never |
//! | [`Error::Cancelled`] | via pending connection | never |
//!
//! Nothing is retried automatically; retrying is the caller's decision.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use bluelink_types::{AdapterState, DeviceId};

/// Errors that can occur while driving the adapter and connection lifecycle.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error from the platform stack.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// A command was issued while the adapter was not powered on.
    #[error("Bluetooth adapter not ready (state: {state})")]
    AdapterNotReady {
        /// The adapter state at the time of the command.
        state: AdapterState,
    },

    /// The adapter was switched off.
    #[error("Bluetooth adapter is powered off")]
    AdapterPoweredOff,

    /// The application lost or was never granted Bluetooth permission.
    #[error("Bluetooth access is not authorized")]
    AdapterUnauthorized,

    /// The adapter does not support the BLE central role.
    #[error("Bluetooth LE is not supported on this adapter")]
    AdapterUnsupported,

    /// The device is not in the discovered-device registry.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// The transport reported a failed or lost connection attempt.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device that failed to connect.
        device_id: Option<DeviceId>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// A connection attempt is already in flight.
    #[error("Connection to {device_id} already in progress")]
    ConnectionInProgress {
        /// The device currently being connected.
        device_id: DeviceId,
    },

    /// Characteristic discovery for one service failed (non-fatal).
    #[error("Characteristic discovery failed for service {service}: {reason}")]
    ServiceDiscoveryFailed {
        /// The service whose characteristics are unavailable.
        service: Uuid,
        /// Transport supplied description.
        reason: String,
    },

    /// Passthrough of an underlying transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The operation was cancelled before it completed.
    #[error("Operation cancelled")]
    Cancelled,

    /// The manager task is no longer running.
    #[error("Link manager has stopped")]
    ManagerStopped,

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// The link dropped before discovery finished.
    Disconnected,
    /// Service discovery for the whole device failed.
    ServiceDiscovery(String),
    /// Generic BLE error reported by the transport.
    BleError(String),
    /// Other/unknown error.
    Other(String),
}

impl fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "device disconnected during setup"),
            Self::ServiceDiscovery(msg) => write!(f, "service discovery failed: {}", msg),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// The error reported when the adapter enters `state`, if that state is a failure.
    pub fn for_adapter_state(state: AdapterState) -> Option<Self> {
        match state {
            AdapterState::PoweredOff => Some(Self::AdapterPoweredOff),
            AdapterState::Unauthorized => Some(Self::AdapterUnauthorized),
            AdapterState::Unsupported => Some(Self::AdapterUnsupported),
            AdapterState::Unknown | AdapterState::PoweredOn => None,
        }
    }

    /// Create an adapter-not-ready error.
    pub fn not_ready(state: AdapterState) -> Self {
        Self::AdapterNotReady { state }
    }

    /// Create a device not found error.
    pub fn device_not_found(id: impl Into<DeviceId>) -> Self {
        Self::DeviceNotFound(id.into())
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<DeviceId>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Create a transport passthrough error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Classify this error for the error slot and for events.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Bluetooth(_) => ErrorKind::Transport,
            Self::AdapterNotReady { .. } => ErrorKind::AdapterNotReady,
            Self::AdapterPoweredOff => ErrorKind::AdapterPoweredOff,
            Self::AdapterUnauthorized => ErrorKind::AdapterUnauthorized,
            Self::AdapterUnsupported => ErrorKind::AdapterUnsupported,
            Self::DeviceNotFound(_) => ErrorKind::DeviceNotFound,
            Self::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Self::ConnectionInProgress { .. } => ErrorKind::ConnectionInProgress,
            Self::ServiceDiscoveryFailed { .. } => ErrorKind::ServiceDiscoveryFailed,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::ManagerStopped => ErrorKind::ManagerStopped,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

/// Copyable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`Error::AdapterNotReady`].
    AdapterNotReady,
    /// See [`Error::AdapterPoweredOff`].
    AdapterPoweredOff,
    /// See [`Error::AdapterUnauthorized`].
    AdapterUnauthorized,
    /// See [`Error::AdapterUnsupported`].
    AdapterUnsupported,
    /// See [`Error::DeviceNotFound`].
    DeviceNotFound,
    /// See [`Error::ConnectionFailed`].
    ConnectionFailed,
    /// See [`Error::ConnectionInProgress`].
    ConnectionInProgress,
    /// See [`Error::ServiceDiscoveryFailed`].
    ServiceDiscoveryFailed,
    /// See [`Error::Transport`] and [`Error::Bluetooth`].
    Transport,
    /// See [`Error::Timeout`].
    Timeout,
    /// See [`Error::Cancelled`].
    Cancelled,
    /// See [`Error::ManagerStopped`].
    ManagerStopped,
    /// See [`Error::InvalidConfig`].
    InvalidConfig,
    /// See [`Error::Io`].
    Io,
}

/// Snapshot of the most recent asynchronous failure, as shown to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Classification of the failure.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl From<&Error> for ErrorRecord {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Result type alias using bluelink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("AA:BB");
        assert_eq!(err.to_string(), "Device not found: AA:BB");

        let err = Error::not_ready(AdapterState::PoweredOff);
        assert!(err.to_string().contains("powered off"));

        let err = Error::ConnectionInProgress {
            device_id: DeviceId::new("AA:BB"),
        };
        assert!(err.to_string().contains("AA:BB"));

        let err = Error::timeout("connect", Duration::from_secs(10));
        assert!(err.to_string().contains("connect"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_connection_failure_reasons() {
        let err = Error::connection_failed(None, ConnectionFailureReason::Disconnected);
        assert!(err.to_string().contains("disconnected during setup"));

        let err = Error::connection_failed(
            Some(DeviceId::new("x")),
            ConnectionFailureReason::BleError("peer rejected".to_string()),
        );
        assert!(err.to_string().contains("BLE error: peer rejected"));
    }

    #[test]
    fn test_errors_for_adapter_states() {
        assert!(matches!(
            Error::for_adapter_state(AdapterState::PoweredOff),
            Some(Error::AdapterPoweredOff)
        ));
        assert!(matches!(
            Error::for_adapter_state(AdapterState::Unauthorized),
            Some(Error::AdapterUnauthorized)
        ));
        assert!(matches!(
            Error::for_adapter_state(AdapterState::Unsupported),
            Some(Error::AdapterUnsupported)
        ));
        assert!(Error::for_adapter_state(AdapterState::Unknown).is_none());
        assert!(Error::for_adapter_state(AdapterState::PoweredOn).is_none());
    }

    #[test]
    fn test_error_kind_and_record() {
        let err = Error::transport("gatt status 133");
        assert_eq!(err.kind(), ErrorKind::Transport);

        let record = ErrorRecord::from(&err);
        assert_eq!(record.kind, ErrorKind::Transport);
        assert_eq!(record.message, "Transport error: gatt status 133");
        assert_eq!(record.to_string(), record.message);
    }

    #[test]
    fn test_btleplug_error_conversion() {
        fn _assert_from_impl<T: From<btleplug::Error>>() {}
        _assert_from_impl::<Error>();
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert_eq!(err.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_error_kind_serde() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::AdapterPoweredOff).unwrap(),
            "\"adapter_powered_off\""
        );
    }
}
