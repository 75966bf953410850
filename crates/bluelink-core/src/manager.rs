//! Actor that owns the connection lifecycle.
//!
//! [`LinkManager::spawn`] moves a [`ConnectionLifecycle`] into a background task. The
//! task multiplexes caller commands, transport callbacks and the connect deadline in a
//! single `tokio::select!` loop, so every input is processed in full before the next
//! one is looked at. After each input the task publishes a fresh [`LinkState`] on a
//! `watch` channel; individual changes are broadcast as [`LinkEvent`]s.
//!
//! [`LinkManager`] is a cheap handle: clone it into every consumer.
//!
//! ```ignore
//! let (transport, events) = BtleTransport::new().await?;
//! let (manager, _task) = LinkManager::spawn(transport, events, LinkConfig::default())?;
//!
//! manager.wait_for_adapter(Duration::from_secs(5)).await?;
//! manager.start_scan().await?;
//! let device = manager.wait_for_device("AA:BB:CC:DD:EE:FF", Duration::from_secs(10)).await?;
//! let catalog = manager.connect(device.id).await?.await?;
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bluelink_types::{AdapterState, Device, DeviceId};

use crate::error::{Error, ErrorRecord, Result};
use crate::events::{EventDispatcher, EventReceiver, LinkEvent};
use crate::lifecycle::{ConnectionLifecycle, LinkState, SessionInfo};
use crate::pending::PendingConnection;
use crate::transport::{Transport, TransportEvent};

/// Configuration for the link manager.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Capacity of the [`LinkEvent`] broadcast channel.
    pub event_capacity: usize,
    /// Capacity of the command queue.
    pub command_capacity: usize,
    /// Upper bound on connection setup, from the connect request until the session
    /// is ready. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            event_capacity: 100,
            command_capacity: 32,
            connect_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl LinkConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event channel capacity.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the command queue capacity.
    #[must_use]
    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity;
        self
    }

    /// Set the connection setup timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Wait for connection setup indefinitely.
    #[must_use]
    pub fn no_connect_timeout(mut self) -> Self {
        self.connect_timeout = None;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be greater than 0"));
        }
        if self.command_capacity == 0 {
            return Err(Error::invalid_config(
                "command_capacity must be greater than 0",
            ));
        }
        if self.connect_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::invalid_config("connect_timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Commands sent from [`LinkManager`] handles to the actor task.
#[derive(Debug)]
enum Command {
    StartScan(oneshot::Sender<Result<()>>),
    StopScan(oneshot::Sender<Result<()>>),
    ClearDevices(oneshot::Sender<()>),
    ClearError(oneshot::Sender<()>),
    Connect(DeviceId, oneshot::Sender<Result<PendingConnection>>),
    Disconnect(oneshot::Sender<()>),
}

/// Handle to the link manager task.
#[derive(Debug, Clone)]
pub struct LinkManager {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<LinkState>,
    events: EventDispatcher,
    cancel: CancellationToken,
}

impl LinkManager {
    /// Start the manager task.
    ///
    /// `transport_events` must be the channel on which `transport` reports its
    /// callbacks. Must be called from within a Tokio runtime.
    pub fn spawn<T: Transport>(
        transport: T,
        transport_events: mpsc::Receiver<TransportEvent>,
        config: LinkConfig,
    ) -> Result<(Self, JoinHandle<()>)> {
        config.validate()?;

        let events = EventDispatcher::new(config.event_capacity);
        let lifecycle = ConnectionLifecycle::new(transport, events.clone());
        let (state_tx, state_rx) = watch::channel(lifecycle.state());
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let cancel = CancellationToken::new();

        let actor = Actor {
            lifecycle,
            commands: command_rx,
            transport_events,
            transport_open: true,
            state: state_tx,
            cancel: cancel.clone(),
            connect_timeout: config.connect_timeout,
            deadline: None,
        };
        let handle = tokio::spawn(actor.run());

        Ok((
            Self {
                commands: command_tx,
                state: state_rx,
                events,
                cancel,
            },
            handle,
        ))
    }

    // --- Observation ---

    /// The most recently published state.
    pub fn state(&self) -> LinkState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified whenever the state changes.
    pub fn watch(&self) -> watch::Receiver<LinkState> {
        self.state.clone()
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Current adapter state.
    pub fn adapter_state(&self) -> AdapterState {
        self.state.borrow().adapter_state
    }

    /// Whether a scan is active.
    pub fn is_scanning(&self) -> bool {
        self.state.borrow().scanning
    }

    /// Discovered devices in first-seen order.
    pub fn devices(&self) -> Vec<Device> {
        self.state.borrow().devices.clone()
    }

    /// The connection session, if any.
    pub fn session(&self) -> Option<SessionInfo> {
        self.state.borrow().session.clone()
    }

    /// The error slot.
    pub fn last_error(&self) -> Option<ErrorRecord> {
        self.state.borrow().last_error.clone()
    }

    /// Whether the manager task is still accepting commands.
    pub fn is_running(&self) -> bool {
        !self.commands.is_closed()
    }

    // --- Commands ---

    /// Start scanning. See [`ConnectionLifecycle::start_scan`].
    #[tracing::instrument(skip(self))]
    pub async fn start_scan(&self) -> Result<()> {
        self.request(Command::StartScan).await?
    }

    /// Stop scanning.
    #[tracing::instrument(skip(self))]
    pub async fn stop_scan(&self) -> Result<()> {
        self.request(Command::StopScan).await?
    }

    /// Empty the device list.
    #[tracing::instrument(skip(self))]
    pub async fn clear_discovered_devices(&self) -> Result<()> {
        self.request(Command::ClearDevices).await
    }

    /// Dismiss the error slot.
    #[tracing::instrument(skip(self))]
    pub async fn clear_error(&self) -> Result<()> {
        self.request(Command::ClearError).await
    }

    /// Connect to a discovered device.
    ///
    /// Returns once the request is accepted; await the [`PendingConnection`] for the
    /// service catalog.
    #[tracing::instrument(skip(self, id), fields(device = tracing::field::Empty))]
    pub async fn connect(&self, id: impl Into<DeviceId>) -> Result<PendingConnection> {
        let id = id.into();
        tracing::Span::current().record("device", tracing::field::display(&id));
        self.request(|tx| Command::Connect(id, tx)).await?
    }

    /// End the session, if any.
    #[tracing::instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<()> {
        self.request(Command::Disconnect).await
    }

    /// Wait until the adapter state is known.
    ///
    /// Returns `PoweredOn`, or the error matching a failure state.
    pub async fn wait_for_adapter(&self, timeout: Duration) -> Result<AdapterState> {
        let mut rx = self.state.clone();
        let state = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| s.adapter_state != AdapterState::Unknown)
                .await
                .map(|s| s.adapter_state)
                .map_err(|_| Error::ManagerStopped)
        })
        .await
        .map_err(|_| Error::timeout("wait for adapter", timeout))??;

        match Error::for_adapter_state(state) {
            Some(error) => Err(error),
            None => Ok(state),
        }
    }

    /// Wait until `id` appears in the device list.
    pub async fn wait_for_device(
        &self,
        id: impl Into<DeviceId>,
        timeout: Duration,
    ) -> Result<Device> {
        let id = id.into();
        let mut rx = self.state.clone();
        tokio::time::timeout(timeout, async {
            let state = rx
                .wait_for(|s| s.devices.iter().any(|d| d.id == id))
                .await
                .map_err(|_| Error::ManagerStopped)?;
            state
                .devices
                .iter()
                .find(|d| d.id == id)
                .cloned()
                .ok_or_else(|| Error::device_not_found(id.clone()))
        })
        .await
        .map_err(|_| Error::timeout(format!("wait for device {id}"), timeout))?
    }

    /// Stop the manager task.
    ///
    /// Any session is disconnected and an active scan stopped before the task exits.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn request<R>(&self, command: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| Error::ManagerStopped)?;
        rx.await.map_err(|_| Error::ManagerStopped)
    }
}

/// The task side of the manager.
struct Actor<T: Transport> {
    lifecycle: ConnectionLifecycle<T>,
    commands: mpsc::Receiver<Command>,
    transport_events: mpsc::Receiver<TransportEvent>,
    transport_open: bool,
    state: watch::Sender<LinkState>,
    cancel: CancellationToken,
    connect_timeout: Option<Duration>,
    /// Session serial and instant at which its setup expires.
    deadline: Option<(u64, Instant)>,
}

impl<T: Transport> Actor<T> {
    async fn run(mut self) {
        info!("Link manager started");

        loop {
            let deadline = self.deadline.map(|(_, at)| at);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("Link manager cancelled");
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("All link manager handles dropped");
                        break;
                    }
                },
                event = self.transport_events.recv(), if self.transport_open => match event {
                    Some(event) => self.lifecycle.handle_event(event),
                    None => {
                        warn!("Transport event channel closed");
                        self.transport_open = false;
                    }
                },
                _ = wait_until(deadline) => self.expire(),
            }

            self.settle();
        }

        self.lifecycle.disconnect();
        if let Err(e) = self.lifecycle.stop_scan() {
            warn!("Failed to stop scan during shutdown: {}", e);
        }
        self.publish();
        info!("Link manager stopped");
    }

    /// Apply a command, publishing the resulting state before replying so a caller
    /// that awaited the command observes its effect.
    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartScan(reply) => {
                let result = self.lifecycle.start_scan();
                self.settle();
                let _ = reply.send(result);
            }
            Command::StopScan(reply) => {
                let result = self.lifecycle.stop_scan();
                self.settle();
                let _ = reply.send(result);
            }
            Command::ClearDevices(reply) => {
                self.lifecycle.clear_discovered_devices();
                self.settle();
                let _ = reply.send(());
            }
            Command::ClearError(reply) => {
                self.lifecycle.clear_error();
                self.settle();
                let _ = reply.send(());
            }
            Command::Connect(id, reply) => {
                let result = self.lifecycle.connect(&id);
                self.settle();
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                self.lifecycle.disconnect();
                self.settle();
                let _ = reply.send(());
            }
        }
    }

    fn settle(&mut self) {
        self.track_deadline();
        self.publish();
    }

    /// Arm the deadline for a newly started session, or disarm it once setup ends.
    fn track_deadline(&mut self) {
        let Some(timeout) = self.connect_timeout else {
            return;
        };
        let in_flight = self
            .lifecycle
            .phase()
            .is_some_and(|phase| phase.is_in_flight());
        match (self.lifecycle.session_serial(), in_flight) {
            (Some(serial), true) => {
                if self.deadline.map(|(s, _)| s) != Some(serial) {
                    self.deadline = Some((serial, Instant::now() + timeout));
                }
            }
            _ => self.deadline = None,
        }
    }

    fn expire(&mut self) {
        let (Some((serial, _)), Some(timeout)) = (self.deadline.take(), self.connect_timeout)
        else {
            return;
        };
        self.lifecycle
            .expire_session(serial, Error::timeout("connect", timeout));
    }

    fn publish(&self) {
        let next = self.lifecycle.state();
        self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Log every event from a subscription until the manager goes away.
///
/// Handy for binaries that want a trace of the lifecycle without handling events
/// themselves.
pub fn spawn_event_logger(manager: &LinkManager) -> JoinHandle<()> {
    let mut rx = manager.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(LinkEvent::Error { error }) => warn!("Link error: {}", error),
                Ok(event) => debug!("Link event: {:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event logger lagged, skipped {} event(s)", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
