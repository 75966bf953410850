//! Mock transport implementation for testing.
//!
//! This module provides a scripted [`Transport`] that can be used for unit testing
//! without requiring actual BLE hardware.
//!
//! Every request is recorded as a [`TransportRequest`]. A transport created with
//! [`MockTransport::new`] only records; one built with [`MockTransport::builder`]
//! also answers each request with the callbacks a real stack would deliver, based
//! on the [`MockPeripheral`]s it was given.
//!
//! # Features
//!
//! - **Failure injection**: make requests fail synchronously, or make a peripheral
//!   reject connections or fail discovery for one service
//! - **Held connects**: leave a connect unanswered to exercise timeouts; a later
//!   disconnect answers it as cancelled
//! - **Manual events**: push arbitrary [`TransportEvent`]s with [`MockTransport::emit`]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use bluelink_types::{AdapterState, AdvertisementData, CharacteristicEntry, DeviceId};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};

/// Capacity of the event channel created by [`MockTransportBuilder::build`].
const EVENT_CAPACITY: usize = 256;

/// A request received by the [`MockTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    StartScan,
    StopScan,
    Connect(DeviceId),
    Disconnect(DeviceId),
    DiscoverServices(DeviceId),
    DiscoverCharacteristics(DeviceId, Uuid),
}

/// A simulated peripheral.
#[derive(Debug, Clone)]
pub struct MockPeripheral {
    id: DeviceId,
    name: Option<String>,
    rssi: Option<i16>,
    advertisement: AdvertisementData,
    services: Vec<(Uuid, std::result::Result<Vec<CharacteristicEntry>, String>)>,
    connect_error: Option<String>,
    hold_connect: bool,
}

impl MockPeripheral {
    /// A connectable peripheral with no services.
    pub fn new(id: impl Into<DeviceId>) -> Self {
        Self {
            id: id.into(),
            name: None,
            rssi: Some(-60),
            advertisement: AdvertisementData::default(),
            services: Vec::new(),
            connect_error: None,
            hold_connect: false,
        }
    }

    /// Set the advertised name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the advertised signal strength.
    #[must_use]
    pub fn rssi(mut self, rssi: i16) -> Self {
        self.rssi = Some(rssi);
        self
    }

    /// Set the advertisement payload.
    #[must_use]
    pub fn advertisement(mut self, advertisement: AdvertisementData) -> Self {
        self.advertisement = advertisement;
        self
    }

    /// Add a service with its characteristics.
    #[must_use]
    pub fn service(mut self, uuid: Uuid, characteristics: Vec<CharacteristicEntry>) -> Self {
        self.services.push((uuid, Ok(characteristics)));
        self
    }

    /// Add a service whose characteristic discovery fails.
    #[must_use]
    pub fn failing_service(mut self, uuid: Uuid, message: impl Into<String>) -> Self {
        self.services.push((uuid, Err(message.into())));
        self
    }

    /// Reject connection attempts with `message`.
    #[must_use]
    pub fn connect_error(mut self, message: impl Into<String>) -> Self {
        self.connect_error = Some(message.into());
        self
    }

    /// Never answer connection attempts.
    #[must_use]
    pub fn hold_connect(mut self) -> Self {
        self.hold_connect = true;
        self
    }

    /// The peripheral identifier.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    fn sighting(&self) -> TransportEvent {
        TransportEvent::Discovered {
            id: self.id.clone(),
            name: self.name.clone(),
            rssi: self.rssi,
            advertisement: self.advertisement.clone(),
        }
    }
}

/// Builder for a responding [`MockTransport`].
#[derive(Debug, Default)]
pub struct MockTransportBuilder {
    adapter_state: Option<AdapterState>,
    peripherals: Vec<MockPeripheral>,
}

impl MockTransportBuilder {
    /// Report this adapter state as soon as the transport is built.
    #[must_use]
    pub fn adapter_state(mut self, state: AdapterState) -> Self {
        self.adapter_state = Some(state);
        self
    }

    /// Add a peripheral that is reported while scanning.
    #[must_use]
    pub fn peripheral(mut self, peripheral: MockPeripheral) -> Self {
        self.peripherals.push(peripheral);
        self
    }

    /// Build the transport and the receiving end of its event channel.
    pub fn build(self) -> (MockTransport, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let transport = MockTransport {
            inner: Arc::new(Inner {
                requests: Mutex::new(Vec::new()),
                peripherals: Mutex::new(self.peripherals),
                links: Mutex::new(Links::default()),
                fail_requests: AtomicBool::new(false),
                events: Some(tx),
            }),
        };
        if let Some(state) = self.adapter_state {
            transport.emit(TransportEvent::StateChanged(state));
        }
        (transport, rx)
    }
}

/// Links the mock has established or left pending.
#[derive(Debug, Default)]
struct Links {
    connected: HashSet<DeviceId>,
    held: HashSet<DeviceId>,
}

#[derive(Debug)]
struct Inner {
    requests: Mutex<Vec<TransportRequest>>,
    peripherals: Mutex<Vec<MockPeripheral>>,
    links: Mutex<Links>,
    fail_requests: AtomicBool,
    events: Option<mpsc::Sender<TransportEvent>>,
}

/// A scripted transport for testing.
///
/// Clones share the request log and the script, so a test can keep one handle
/// while the manager owns another.
///
/// # Example
///
/// ```
/// use bluelink_core::mock::{MockPeripheral, MockTransport, TransportRequest};
/// use bluelink_core::Transport;
/// use bluelink_types::AdapterState;
///
/// let (mut transport, mut events) = MockTransport::builder()
///     .adapter_state(AdapterState::PoweredOn)
///     .peripheral(MockPeripheral::new("AA:BB").name("Thermometer"))
///     .build();
///
/// transport.start_scan().unwrap();
/// assert_eq!(transport.requests(), vec![TransportRequest::StartScan]);
/// assert!(events.try_recv().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// A transport that records requests and never answers.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                requests: Mutex::new(Vec::new()),
                peripherals: Mutex::new(Vec::new()),
                links: Mutex::new(Links::default()),
                fail_requests: AtomicBool::new(false),
                events: None,
            }),
        }
    }

    /// Start building a responding transport.
    pub fn builder() -> MockTransportBuilder {
        MockTransportBuilder::default()
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<TransportRequest> {
        lock(&self.inner.requests).clone()
    }

    /// Take and clear the request log.
    pub fn take_requests(&self) -> Vec<TransportRequest> {
        std::mem::take(&mut *lock(&self.inner.requests))
    }

    /// Make every subsequent request fail synchronously.
    pub fn set_fail_requests(&self, fail: bool) {
        self.inner.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Add a peripheral after the transport was built.
    pub fn add_peripheral(&self, peripheral: MockPeripheral) {
        lock(&self.inner.peripherals).push(peripheral);
    }

    /// Deliver an event as if the platform stack had reported it.
    ///
    /// Returns `false` if the transport has no event channel or the channel is
    /// full or closed.
    pub fn emit(&self, event: TransportEvent) -> bool {
        match &self.inner.events {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Report an adapter state change.
    pub fn set_adapter_state(&self, state: AdapterState) -> bool {
        self.emit(TransportEvent::StateChanged(state))
    }

    /// Report a sighting of a scripted peripheral again.
    pub fn advertise(&self, id: &DeviceId) -> bool {
        let sighting = self.peripheral(id).map(|p| p.sighting());
        sighting.is_some_and(|event| self.emit(event))
    }

    fn peripheral(&self, id: &DeviceId) -> Option<MockPeripheral> {
        lock(&self.inner.peripherals)
            .iter()
            .find(|p| p.id == *id)
            .cloned()
    }

    fn record(&self, request: TransportRequest) -> Result<()> {
        debug!("Mock transport request: {:?}", request);
        let failing = self.inner.fail_requests.load(Ordering::SeqCst);
        lock(&self.inner.requests).push(request.clone());
        if failing {
            return Err(Error::transport(format!("mock refused {request:?}")));
        }
        Ok(())
    }

    fn responding(&self) -> bool {
        self.inner.events.is_some()
    }
}

impl Transport for MockTransport {
    fn start_scan(&mut self) -> Result<()> {
        self.record(TransportRequest::StartScan)?;
        if self.responding() {
            let sightings: Vec<_> = lock(&self.inner.peripherals)
                .iter()
                .map(MockPeripheral::sighting)
                .collect();
            for event in sightings {
                self.emit(event);
            }
        }
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        self.record(TransportRequest::StopScan)
    }

    fn connect(&mut self, id: &DeviceId) -> Result<()> {
        self.record(TransportRequest::Connect(id.clone()))?;
        if !self.responding() {
            return Ok(());
        }
        let result = match self.peripheral(id) {
            Some(p) if p.hold_connect => {
                lock(&self.inner.links).held.insert(id.clone());
                return Ok(());
            }
            Some(p) => p.connect_error.map_or(Ok(()), Err),
            None => Err(format!("unknown peripheral {id}")),
        };
        if result.is_ok() {
            lock(&self.inner.links).connected.insert(id.clone());
        }
        self.emit(TransportEvent::ConnectResult {
            id: id.clone(),
            result,
        });
        Ok(())
    }

    fn disconnect(&mut self, id: &DeviceId) -> Result<()> {
        self.record(TransportRequest::Disconnect(id.clone()))?;
        let (was_connected, was_held) = {
            let mut links = lock(&self.inner.links);
            (links.connected.remove(id), links.held.remove(id))
        };
        if was_held {
            self.emit(TransportEvent::ConnectResult {
                id: id.clone(),
                result: Err("connection cancelled".to_string()),
            });
        }
        if was_connected {
            self.emit(TransportEvent::Disconnected {
                id: id.clone(),
                error: None,
            });
        }
        Ok(())
    }

    fn discover_services(&mut self, id: &DeviceId) -> Result<()> {
        self.record(TransportRequest::DiscoverServices(id.clone()))?;
        if !self.responding() {
            return Ok(());
        }
        let result = match self.peripheral(id) {
            Some(p) => Ok(p.services.iter().map(|(uuid, _)| *uuid).collect()),
            None => Err(format!("unknown peripheral {id}")),
        };
        self.emit(TransportEvent::ServicesDiscovered {
            id: id.clone(),
            result,
        });
        Ok(())
    }

    fn discover_characteristics(&mut self, id: &DeviceId, service: &Uuid) -> Result<()> {
        self.record(TransportRequest::DiscoverCharacteristics(id.clone(), *service))?;
        if !self.responding() {
            return Ok(());
        }
        let result = self
            .peripheral(id)
            .and_then(|p| p.services.into_iter().find(|(uuid, _)| uuid == service))
            .map(|(_, result)| result)
            .unwrap_or_else(|| Err(format!("unknown service {service}")));
        self.emit(TransportEvent::CharacteristicsDiscovered {
            id: id.clone(),
            service: *service,
            result,
        });
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
