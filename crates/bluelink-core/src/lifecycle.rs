//! Connection lifecycle state machine.
//!
//! [`ConnectionLifecycle`] owns the adapter state, the device registry, the single
//! connection session and the error slot. It is driven by two inputs, caller commands
//! and [`TransportEvent`]s, and must be fed from one ordered stream: each call runs to
//! completion (state updated, transport requests issued, events broadcast) before the
//! next one starts. [`crate::LinkManager`] provides that stream; tests drive the state
//! machine directly.
//!
//! Session phases:
//!
//! ```text
//! Idle -> Connecting -> ServiceDiscovery -> CharacteristicDiscovery(n) -> Ready
//!   ^__________________________|_____________________|___________________|
//!            disconnect, failure, adapter loss
//! ```

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use bluelink_types::{
    AdapterState, AdvertisementData, CharacteristicEntry, Device, DeviceId, ServiceCatalog,
    SessionPhase,
};

use crate::error::{ConnectionFailureReason, Error, ErrorRecord, Result};
use crate::events::{DisconnectReason, EventDispatcher, LinkEvent};
use crate::pending::{CompletionSignal, PendingConnection};
use crate::registry::{DeviceRegistry, Upsert};
use crate::transport::{Transport, TransportEvent};

/// Observable view of the connection session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// The device the session belongs to.
    pub device: Device,
    /// Current phase.
    pub phase: SessionPhase,
    /// Services discovered so far.
    pub catalog: ServiceCatalog,
}

/// Everything an observer can see, captured after each processed input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkState {
    /// Adapter readiness.
    pub adapter_state: AdapterState,
    /// Whether a scan is active.
    pub scanning: bool,
    /// Discovered devices in first-seen order.
    pub devices: Vec<Device>,
    /// The connection session, if any.
    pub session: Option<SessionInfo>,
    /// The most recent asynchronous failure, if not dismissed.
    pub last_error: Option<ErrorRecord>,
}

/// The single connection session.
#[derive(Debug)]
struct Session {
    serial: u64,
    device: Device,
    phase: SessionPhase,
    catalog: ServiceCatalog,
    reported: HashSet<Uuid>,
    completion: Option<CompletionSignal>,
}

impl Session {
    fn info(&self) -> SessionInfo {
        SessionInfo {
            device: self.device.clone(),
            phase: self.phase,
            catalog: self.catalog.clone(),
        }
    }
}

/// Transport confirmations still owed for a link the lifecycle already dropped.
///
/// Callbacks only carry a [`DeviceId`], so without this a late confirmation for a
/// torn-down session would be applied to a newer session with the same device.
#[derive(Debug, Default, Clone, Copy)]
struct Teardown {
    /// Connects cancelled before the transport answered them.
    connect_results: usize,
    /// Disconnects requested for established links.
    disconnects: usize,
}

impl Teardown {
    fn is_settled(self) -> bool {
        self.connect_results == 0 && self.disconnects == 0
    }
}

/// State machine reconciling transport callbacks and caller commands.
pub struct ConnectionLifecycle<T: Transport> {
    transport: T,
    adapter_state: AdapterState,
    scanning: bool,
    registry: DeviceRegistry,
    session: Option<Session>,
    next_serial: u64,
    teardowns: HashMap<DeviceId, Teardown>,
    last_error: Option<ErrorRecord>,
    events: EventDispatcher,
}

impl<T: Transport> std::fmt::Debug for ConnectionLifecycle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionLifecycle")
            .field("adapter_state", &self.adapter_state)
            .field("scanning", &self.scanning)
            .field("devices", &self.registry.len())
            .field("session", &self.session.as_ref().map(|s| (&s.device.id, s.phase)))
            .field("teardowns", &self.teardowns)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ConnectionLifecycle<T> {
    /// Create a lifecycle in the `Unknown` adapter state.
    pub fn new(transport: T, events: EventDispatcher) -> Self {
        Self {
            transport,
            adapter_state: AdapterState::Unknown,
            scanning: false,
            registry: DeviceRegistry::new(),
            session: None,
            next_serial: 0,
            teardowns: HashMap::new(),
            last_error: None,
            events,
        }
    }

    // --- Inspection ---

    /// Current adapter state.
    pub fn adapter_state(&self) -> AdapterState {
        self.adapter_state
    }

    /// Whether a scan is active.
    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Discovered devices in first-seen order.
    pub fn devices(&self) -> &[Device] {
        self.registry.devices()
    }

    /// The registry.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// The current session, if any.
    pub fn session(&self) -> Option<SessionInfo> {
        self.session.as_ref().map(Session::info)
    }

    /// Phase of the current session.
    pub fn phase(&self) -> Option<SessionPhase> {
        self.session.as_ref().map(|s| s.phase)
    }

    /// Serial number of the current session.
    ///
    /// Serials increase with every accepted connect, so a stale timer can tell
    /// whether the session it was started for still exists.
    pub fn session_serial(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.serial)
    }

    /// The error slot.
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Capture everything observers can see.
    pub fn state(&self) -> LinkState {
        LinkState {
            adapter_state: self.adapter_state,
            scanning: self.scanning,
            devices: self.registry.devices().to_vec(),
            session: self.session(),
            last_error: self.last_error.clone(),
        }
    }

    // --- Commands ---

    /// Start a scan session.
    ///
    /// No-op while already scanning. Otherwise the registry is cleared, because the
    /// device list covers the current scan session only.
    pub fn start_scan(&mut self) -> Result<()> {
        self.ensure_ready()?;
        if self.scanning {
            debug!("Scan already active");
            return Ok(());
        }

        if let Err(e) = self.transport.start_scan() {
            self.record_error(&e);
            return Err(e);
        }

        self.registry.clear();
        self.scanning = true;
        info!("Scan started");
        self.events.send(LinkEvent::ScanStarted);
        Ok(())
    }

    /// Stop the active scan; no-op if not scanning.
    pub fn stop_scan(&mut self) -> Result<()> {
        if !self.scanning {
            return Ok(());
        }

        self.scanning = false;
        self.events.send(LinkEvent::ScanStopped);
        if let Err(e) = self.transport.stop_scan() {
            warn!("Failed to stop scan: {}", e);
            self.record_error(&e);
            return Err(e);
        }
        info!("Scan stopped");
        Ok(())
    }

    /// Empty the device list. Does not affect the session.
    pub fn clear_discovered_devices(&mut self) {
        debug!("Clearing {} discovered device(s)", self.registry.len());
        self.registry.clear();
    }

    /// Dismiss the error slot.
    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Start connecting to a discovered device.
    ///
    /// Validation failures are returned here and never reach the error slot. On
    /// success the returned token resolves exactly once: with the catalog when the
    /// session is ready, or with the error that ended the attempt.
    pub fn connect(&mut self, id: &DeviceId) -> Result<PendingConnection> {
        self.ensure_ready()?;

        if let Some(session) = &self.session {
            if session.phase.is_in_flight() {
                return Err(Error::ConnectionInProgress {
                    device_id: session.device.id.clone(),
                });
            }
            if session.device.id == *id {
                debug!("Already connected to {}", id);
                return Ok(PendingConnection::resolved(
                    id.clone(),
                    Ok(session.catalog.clone()),
                ));
            }
        }

        let device = self
            .registry
            .get(id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(id.clone()))?;

        if let Some(previous) = self.session.as_ref().map(|s| s.device.id.clone()) {
            info!("Disconnecting {} before connecting to {}", previous, id);
            self.release_link(&previous);
            self.discard_session(DisconnectReason::Superseded, Error::Cancelled);
        }

        if let Err(e) = self.transport.connect(id) {
            self.record_error(&e);
            return Err(e);
        }

        let (signal, pending) = PendingConnection::channel(id.clone());
        self.next_serial += 1;
        self.session = Some(Session {
            serial: self.next_serial,
            device,
            phase: SessionPhase::Connecting,
            catalog: ServiceCatalog::new(),
            reported: HashSet::new(),
            completion: Some(signal),
        });

        info!("Connecting to {}", id);
        self.events.send(LinkEvent::Connecting { device: id.clone() });
        Ok(pending)
    }

    /// End the session.
    ///
    /// No-op without a session. Otherwise the session is cleared immediately without
    /// waiting for the transport's confirmation; an in-flight attempt resolves with
    /// [`Error::Cancelled`]. The confirmation is absorbed when it arrives, even if a
    /// new session with the same device exists by then.
    pub fn disconnect(&mut self) {
        let Some(id) = self.session.as_ref().map(|s| s.device.id.clone()) else {
            return;
        };

        info!("Disconnecting from {}", id);
        self.release_link(&id);
        self.discard_session(DisconnectReason::UserRequested, Error::Cancelled);
    }

    /// Fail the session with serial `serial` if it is still setting up.
    ///
    /// Returns `false` if that session already finished or was replaced.
    pub fn expire_session(&mut self, serial: u64, error: Error) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if session.serial != serial || !session.phase.is_in_flight() {
            return false;
        }

        let id = session.device.id.clone();
        warn!("Connection to {} expired: {}", id, error);
        self.release_link(&id);
        self.record_error(&error);
        self.discard_session(DisconnectReason::Timeout, error);
        true
    }

    // --- Transport events ---

    /// Apply one transport callback.
    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => self.on_state_changed(state),
            TransportEvent::Discovered {
                id,
                name,
                rssi,
                advertisement,
            } => self.on_discovered(id, name, rssi, advertisement),
            TransportEvent::ConnectResult { id, result } => self.on_connect_result(id, result),
            TransportEvent::Disconnected { id, error } => self.on_disconnected(id, error),
            TransportEvent::ServicesDiscovered { id, result } => {
                self.on_services_discovered(id, result)
            }
            TransportEvent::CharacteristicsDiscovered {
                id,
                service,
                result,
            } => self.on_characteristics_discovered(&id, service, result),
        }
    }

    fn on_state_changed(&mut self, state: AdapterState) {
        if state == self.adapter_state {
            return;
        }

        info!("Adapter state: {} -> {}", self.adapter_state, state);
        self.adapter_state = state;
        self.events.send(LinkEvent::AdapterStateChanged { state });

        if state.is_ready() {
            return;
        }

        if self.scanning {
            self.scanning = false;
            self.events.send(LinkEvent::ScanStopped);
        }
        self.teardowns.clear();

        match Error::for_adapter_state(state) {
            Some(error) => {
                // The transport reports nothing further for a session after adapter loss.
                self.registry.clear();
                self.record_error(&error);
                self.discard_session(DisconnectReason::AdapterUnavailable, error);
            }
            None => {
                self.discard_session(DisconnectReason::AdapterUnavailable, Error::not_ready(state));
            }
        }
    }

    fn on_discovered(
        &mut self,
        id: DeviceId,
        name: Option<String>,
        rssi: Option<i16>,
        advertisement: AdvertisementData,
    ) {
        if !self.adapter_state.is_ready() {
            debug!("Ignoring sighting of {} while adapter is {}", id, self.adapter_state);
            return;
        }

        let outcome = self.registry.upsert(id.clone(), name, rssi, advertisement);
        let Some(device) = self.registry.get(&id).cloned() else {
            return;
        };
        match outcome {
            Upsert::Inserted(position) => {
                debug!("Discovered {} ({})", device.id, device.display_name());
                self.events.send(LinkEvent::DeviceDiscovered { device, position });
            }
            Upsert::Updated(position) => {
                self.events.send(LinkEvent::DeviceUpdated { device, position });
            }
        }
    }

    fn on_connect_result(&mut self, id: DeviceId, result: std::result::Result<(), String>) {
        if self.teardowns.get(&id).is_some_and(|t| t.connect_results > 0) {
            self.absorb_connect_result(&id, result.is_ok());
            return;
        }
        if !self.session_matches(&id, |phase| matches!(phase, SessionPhase::Connecting)) {
            debug!("Ignoring connect result for {}", id);
            return;
        }

        match result {
            Ok(()) => {
                info!("Connected to {}, discovering services", id);
                if let Some(session) = self.session.as_mut() {
                    session.phase = SessionPhase::ServiceDiscovery;
                }
                self.events.send(LinkEvent::Connected { device: id.clone() });

                if let Err(e) = self.transport.discover_services(&id) {
                    self.fail_session(&id, e.to_string(), Error::transport(e.to_string()));
                }
            }
            Err(message) => {
                warn!("Connection to {} failed: {}", id, message);
                let error = Error::connection_failed(
                    Some(id.clone()),
                    ConnectionFailureReason::BleError(message.clone()),
                );
                self.record_error(&error);
                self.discard_session(DisconnectReason::Failed(message), error);
            }
        }
    }

    fn on_disconnected(&mut self, id: DeviceId, error: Option<String>) {
        if let Some(owed) = self.teardowns.get_mut(&id)
            && owed.disconnects > 0
        {
            owed.disconnects -= 1;
            if owed.is_settled() {
                self.teardowns.remove(&id);
            }
            debug!("Disconnect from {} absorbed (link already released)", id);
            return;
        }
        if !self.session_matches(&id, |_| true) {
            debug!("Disconnect from {} absorbed (no session)", id);
            return;
        }

        warn!(
            "{} disconnected{}",
            id,
            error.as_deref().map(|e| format!(": {e}")).unwrap_or_default()
        );
        let outcome = match error {
            Some(message) => {
                let error = Error::transport(message);
                self.record_error(&error);
                error
            }
            None => Error::connection_failed(Some(id), ConnectionFailureReason::Disconnected),
        };
        self.discard_session(DisconnectReason::Remote, outcome);
    }

    fn on_services_discovered(&mut self, id: DeviceId, result: std::result::Result<Vec<Uuid>, String>) {
        if !self.session_matches(&id, |phase| matches!(phase, SessionPhase::ServiceDiscovery)) {
            debug!("Ignoring service list for {}", id);
            return;
        }

        let services = match result {
            Ok(services) => services,
            Err(message) => {
                let error = Error::connection_failed(
                    Some(id.clone()),
                    ConnectionFailureReason::ServiceDiscovery(message.clone()),
                );
                self.fail_session(&id, message, error);
                return;
            }
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        for service in services {
            session.catalog.add_service(service);
        }
        let pending: Vec<Uuid> = session.catalog.services().iter().map(|s| s.uuid).collect();
        info!("{} reported {} service(s)", id, pending.len());
        self.events.send(LinkEvent::ServicesDiscovered {
            device: id.clone(),
            count: pending.len(),
        });

        if pending.is_empty() {
            self.become_ready();
            return;
        }

        session.phase = SessionPhase::CharacteristicDiscovery {
            remaining: pending.len(),
        };

        let mut refused = Vec::new();
        for service in &pending {
            if let Err(e) = self.transport.discover_characteristics(&id, service) {
                refused.push((*service, e.to_string()));
            }
        }
        for (service, message) in refused {
            self.on_characteristics_discovered(&id, service, Err(message));
        }
    }

    fn on_characteristics_discovered(
        &mut self,
        id: &DeviceId,
        service: Uuid,
        result: std::result::Result<Vec<CharacteristicEntry>, String>,
    ) {
        let Some(session) = self.session.as_mut() else {
            debug!("Ignoring characteristics for {} (no session)", id);
            return;
        };
        let SessionPhase::CharacteristicDiscovery { remaining } = session.phase else {
            debug!("Ignoring characteristics for {} in phase {}", id, session.phase);
            return;
        };
        if session.device.id != *id
            || session.catalog.service(&service).is_none()
            || !session.reported.insert(service)
        {
            debug!("Ignoring characteristics for {}/{}", id, service);
            return;
        }

        match result {
            Ok(characteristics) => {
                debug!("{}: service {} has {} characteristic(s)", id, service, characteristics.len());
                session.catalog.set_characteristics(&service, characteristics);
            }
            Err(message) => {
                warn!("{}: characteristic discovery for {} failed: {}", id, service, message);
                self.events.send(LinkEvent::ServiceDiscoveryFailed {
                    device: id.clone(),
                    service,
                    error: message,
                });
            }
        }

        let remaining = remaining.saturating_sub(1);
        if let Some(session) = self.session.as_mut() {
            session.phase = SessionPhase::CharacteristicDiscovery { remaining };
        }
        if remaining == 0 {
            self.become_ready();
        }
    }

    // --- Helpers ---

    fn ensure_ready(&self) -> Result<()> {
        if self.adapter_state.is_ready() {
            Ok(())
        } else {
            Err(Error::not_ready(self.adapter_state))
        }
    }

    fn session_matches(&self, id: &DeviceId, phase: impl Fn(SessionPhase) -> bool) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.device.id == *id && phase(s.phase))
    }

    fn become_ready(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.phase = SessionPhase::Ready;

        let device = session.device.id.clone();
        let services = session.catalog.len();
        let characteristics = session.catalog.characteristic_count();
        if let Some(signal) = session.completion.take() {
            signal.complete(Ok(session.catalog.clone()));
        }

        info!(
            "{} ready: {} service(s), {} characteristic(s)",
            device, services, characteristics
        );
        self.events.send(LinkEvent::Ready {
            device,
            services,
            characteristics,
        });
    }

    /// Tear down the link after a fatal setup failure.
    fn fail_session(&mut self, id: &DeviceId, message: String, error: Error) {
        warn!("Session with {} failed: {}", id, message);
        self.release_link(id);
        self.record_error(&error);
        self.discard_session(DisconnectReason::Failed(message), error);
    }

    /// Ask the transport to drop the link to `id` and note the confirmation owed.
    ///
    /// Must run before the session is discarded: a session still `Connecting` owes a
    /// connect result, an established one owes a disconnect.
    fn release_link(&mut self, id: &DeviceId) {
        let connecting = matches!(self.phase(), Some(SessionPhase::Connecting));
        let requested = self.transport.disconnect(id);
        if let Err(e) = &requested {
            warn!("Failed to disconnect {}: {}", id, e);
        }

        if connecting {
            self.teardowns.entry(id.clone()).or_default().connect_results += 1;
        } else if requested.is_ok() {
            self.teardowns.entry(id.clone()).or_default().disconnects += 1;
        }
    }

    /// Swallow the answer to a cancelled connect.
    fn absorb_connect_result(&mut self, id: &DeviceId, linked: bool) {
        debug!("Connect result for {} absorbed (attempt was cancelled)", id);
        let mut owed = self.teardowns.remove(id).unwrap_or_default();
        owed.connect_results = owed.connect_results.saturating_sub(1);

        // The cancelled attempt went through anyway; nothing wants that link.
        if linked && !self.session_matches(id, |_| true) {
            match self.transport.disconnect(id) {
                Ok(()) => owed.disconnects += 1,
                Err(e) => warn!("Failed to disconnect {}: {}", id, e),
            }
        }
        if !owed.is_settled() {
            self.teardowns.insert(id.clone(), owed);
        }
    }

    /// Drop the session, resolving an in-flight attempt with `error`.
    fn discard_session(&mut self, reason: DisconnectReason, error: Error) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(signal) = session.completion.take() {
            signal.complete(Err(error));
        }
        self.events.send(LinkEvent::Disconnected {
            device: session.device.id,
            reason,
        });
    }

    fn record_error(&mut self, error: &Error) {
        let record = ErrorRecord::from(error);
        self.events.send(LinkEvent::Error {
            error: record.clone(),
        });
        self.last_error = Some(record);
    }
}
