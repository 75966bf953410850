//! Lifecycle event system.
//!
//! Every state change the lifecycle makes is also broadcast as a [`LinkEvent`], so
//! observers that need a history (logs, UI toasts) do not have to diff
//! [`crate::LinkState`] snapshots.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use bluelink_types::{AdapterState, Device, DeviceId};

use crate::error::ErrorRecord;

/// Events emitted by the connection lifecycle.
///
/// All events are serializable for logging, persistence, and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum LinkEvent {
    /// The adapter changed state.
    AdapterStateChanged { state: AdapterState },
    /// A scan session started (the device list was reset).
    ScanStarted,
    /// Scanning stopped, by request or because the adapter went away.
    ScanStopped,
    /// A device was added to the registry.
    DeviceDiscovered { device: Device, position: usize },
    /// A known device was seen again.
    DeviceUpdated { device: Device, position: usize },
    /// A connection attempt started.
    Connecting { device: DeviceId },
    /// The link is up; service discovery started.
    Connected { device: DeviceId },
    /// The service list arrived.
    ServicesDiscovered { device: DeviceId, count: usize },
    /// Characteristic discovery failed for one service (non-fatal).
    ServiceDiscoveryFailed {
        device: DeviceId,
        service: Uuid,
        error: String,
    },
    /// Discovery is complete.
    Ready {
        device: DeviceId,
        services: usize,
        characteristics: usize,
    },
    /// The session ended.
    Disconnected {
        device: DeviceId,
        reason: DisconnectReason,
    },
    /// The error slot was set.
    Error { error: ErrorRecord },
}

/// Reason a session ended.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// Disconnect requested by the caller.
    UserRequested,
    /// Replaced by a connect to another device.
    Superseded,
    /// The peripheral or the stack dropped the link.
    Remote,
    /// The adapter left the powered-on state.
    AdapterUnavailable,
    /// Setup did not finish in time.
    Timeout,
    /// Connect or discovery failed.
    Failed(String),
}

/// Sender for lifecycle events.
pub type EventSender = broadcast::Sender<LinkEvent>;

/// Receiver for lifecycle events.
pub type EventReceiver = broadcast::Receiver<LinkEvent>;

/// Create a new event channel with the given capacity.
pub fn event_channel(capacity: usize) -> (EventSender, EventReceiver) {
    broadcast::channel(capacity)
}

/// Event dispatcher for sending events to multiple receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: LinkEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dispatcher_fan_out() {
        let dispatcher = EventDispatcher::new(8);
        let mut a = dispatcher.subscribe();
        let mut b = dispatcher.subscribe();
        assert_eq!(dispatcher.receiver_count(), 2);

        dispatcher.send(LinkEvent::ScanStarted);

        assert_eq!(a.recv().await.unwrap(), LinkEvent::ScanStarted);
        assert_eq!(b.recv().await.unwrap(), LinkEvent::ScanStarted);
    }

    #[test]
    fn test_send_without_receivers_is_ignored() {
        let dispatcher = EventDispatcher::default();
        dispatcher.send(LinkEvent::ScanStopped);
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = LinkEvent::Disconnected {
            device: DeviceId::new("AA"),
            reason: DisconnectReason::Remote,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"disconnected\""));
        assert!(json.contains("\"device\":\"AA\""));
    }
}
