//! [`Transport`] implementation on top of btleplug.
//!
//! btleplug exposes an async API, while the lifecycle issues requests synchronously
//! and expects outcomes as callbacks. [`BtleTransport`] bridges the two: each request
//! that needs the radio runs as a spawned task and reports its result as a
//! [`TransportEvent`], and a background task translates the adapter's
//! [`CentralEvent`] stream into the same channel.
//!
//! Platform peripheral handles never leave this module; the lifecycle only sees
//! [`DeviceId`]s.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use btleplug::api::{
    Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use bluelink_types::{AdapterState, CharacteristicEntry, DeviceId};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportEvent};
use crate::util::{advertisement_from_properties, capabilities_from_flags, create_identifier};

/// Capacity of the transport event channel.
const EVENT_CAPACITY: usize = 256;

/// Peripheral handles seen by the adapter, keyed both ways.
#[derive(Default)]
struct PeripheralTable {
    by_device: HashMap<DeviceId, Peripheral>,
    by_peripheral: HashMap<PeripheralId, DeviceId>,
}

impl PeripheralTable {
    fn insert(&mut self, id: DeviceId, peripheral: Peripheral) {
        self.by_peripheral.insert(peripheral.id(), id.clone());
        self.by_device.insert(id, peripheral);
    }
}

type SharedTable = Arc<Mutex<PeripheralTable>>;

/// BLE transport backed by the first adapter btleplug reports.
pub struct BtleTransport {
    adapter: Adapter,
    peripherals: SharedTable,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for BtleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BtleTransport")
            .field("peripherals", &lock(&self.peripherals).by_device.len())
            .finish_non_exhaustive()
    }
}

impl BtleTransport {
    /// Open the first adapter and start translating its events.
    ///
    /// The initial adapter state is reported as the first event on the returned
    /// channel.
    pub async fn new() -> Result<(Self, mpsc::Receiver<TransportEvent>)> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(Error::AdapterUnsupported)?;
        if let Ok(info) = adapter.adapter_info().await {
            info!("Using Bluetooth adapter: {}", info);
        }

        let (tx, rx) = mpsc::channel(EVENT_CAPACITY);
        let initial = match adapter.adapter_state().await {
            Ok(state) => adapter_state_from(state),
            Err(e) => {
                // Backends without state reporting still work once an adapter exists.
                warn!("Could not read adapter state, assuming powered on: {}", e);
                AdapterState::PoweredOn
            }
        };
        // The receiver is local and empty, so this cannot fail.
        let _ = tx.try_send(TransportEvent::StateChanged(initial));

        let peripherals = SharedTable::default();
        let cancel = CancellationToken::new();
        tokio::spawn(pump_events(
            adapter.clone(),
            peripherals.clone(),
            tx.clone(),
            cancel.clone(),
        ));

        Ok((
            Self {
                adapter,
                peripherals,
                events: tx,
                cancel,
            },
            rx,
        ))
    }

    fn peripheral(&self, id: &DeviceId) -> Result<Peripheral> {
        lock(&self.peripherals)
            .by_device
            .get(id)
            .cloned()
            .ok_or_else(|| Error::device_not_found(id.clone()))
    }
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl Transport for BtleTransport {
    fn start_scan(&mut self) -> Result<()> {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.start_scan(ScanFilter::default()).await {
                warn!("Failed to start scan: {}", e);
            }
        });
        Ok(())
    }

    fn stop_scan(&mut self) -> Result<()> {
        let adapter = self.adapter.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        });
        Ok(())
    }

    fn connect(&mut self, id: &DeviceId) -> Result<()> {
        let peripheral = self.peripheral(id)?;
        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            debug!("Connecting to {}", id);
            let result = peripheral.connect().await.map_err(|e| e.to_string());
            report(&events, TransportEvent::ConnectResult { id, result }).await;
        });
        Ok(())
    }

    fn disconnect(&mut self, id: &DeviceId) -> Result<()> {
        let peripheral = self.peripheral(id)?;
        let id = id.clone();
        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                warn!("Failed to disconnect {}: {}", id, e);
            }
        });
        Ok(())
    }

    fn discover_services(&mut self, id: &DeviceId) -> Result<()> {
        let peripheral = self.peripheral(id)?;
        let events = self.events.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let result = match peripheral.discover_services().await {
                Ok(()) => Ok(peripheral
                    .services()
                    .into_iter()
                    .filter(|s| s.primary)
                    .map(|s| s.uuid)
                    .collect()),
                Err(e) => Err(e.to_string()),
            };
            report(&events, TransportEvent::ServicesDiscovered { id, result }).await;
        });
        Ok(())
    }

    fn discover_characteristics(&mut self, id: &DeviceId, service: &Uuid) -> Result<()> {
        let peripheral = self.peripheral(id)?;
        let events = self.events.clone();
        let id = id.clone();
        let service = *service;
        // btleplug discovers characteristics together with services; read them back.
        tokio::spawn(async move {
            let result = peripheral
                .services()
                .into_iter()
                .find(|s| s.uuid == service)
                .map(|s| {
                    s.characteristics
                        .into_iter()
                        .map(|c| CharacteristicEntry {
                            uuid: c.uuid,
                            capabilities: capabilities_from_flags(c.properties),
                        })
                        .collect()
                })
                .ok_or_else(|| format!("service {service} not found"));
            report(
                &events,
                TransportEvent::CharacteristicsDiscovered {
                    id,
                    service,
                    result,
                },
            )
            .await;
        });
        Ok(())
    }
}

/// Translate adapter events until cancelled or the stream ends.
async fn pump_events(
    adapter: Adapter,
    peripherals: SharedTable,
    events: mpsc::Sender<TransportEvent>,
    cancel: CancellationToken,
) {
    let mut stream = match adapter.events().await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("Failed to subscribe to adapter events: {}", e);
            return;
        }
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = stream.next() => {
                let Some(event) = event else {
                    debug!("Adapter event stream ended");
                    break;
                };
                if let Some(event) = translate(&adapter, &peripherals, event).await {
                    report(&events, event).await;
                }
            }
        }
    }
}

async fn translate(
    adapter: &Adapter,
    peripherals: &SharedTable,
    event: CentralEvent,
) -> Option<TransportEvent> {
    match event {
        CentralEvent::DeviceDiscovered(id)
        | CentralEvent::DeviceUpdated(id)
        | CentralEvent::ManufacturerDataAdvertisement { id, .. }
        | CentralEvent::ServiceDataAdvertisement { id, .. }
        | CentralEvent::ServicesAdvertisement { id, .. } => {
            sighting(adapter, peripherals, &id).await
        }
        CentralEvent::DeviceDisconnected(id) => {
            let device = lock(peripherals).by_peripheral.get(&id).cloned()?;
            Some(TransportEvent::Disconnected {
                id: device,
                error: None,
            })
        }
        CentralEvent::StateUpdate(state) => {
            Some(TransportEvent::StateChanged(adapter_state_from(state)))
        }
        _ => None,
    }
}

async fn sighting(
    adapter: &Adapter,
    peripherals: &SharedTable,
    id: &PeripheralId,
) -> Option<TransportEvent> {
    let peripheral = adapter.peripheral(id).await.ok()?;
    let properties = peripheral.properties().await.ok()??;
    let device = create_identifier(&properties.address.to_string(), id);
    lock(peripherals).insert(device.clone(), peripheral);

    Some(TransportEvent::Discovered {
        id: device,
        name: properties.local_name.clone(),
        rssi: properties.rssi,
        advertisement: advertisement_from_properties(&properties),
    })
}

fn adapter_state_from(state: CentralState) -> AdapterState {
    match state {
        CentralState::PoweredOn => AdapterState::PoweredOn,
        CentralState::PoweredOff => AdapterState::PoweredOff,
        _ => AdapterState::Unknown,
    }
}

async fn report(events: &mpsc::Sender<TransportEvent>, event: TransportEvent) {
    if events.send(event).await.is_err() {
        debug!("Transport event dropped: receiver closed");
    }
}

fn lock(table: &SharedTable) -> MutexGuard<'_, PeripheralTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}
