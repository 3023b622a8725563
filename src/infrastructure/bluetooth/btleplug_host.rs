//! Hardware host backed by `btleplug`.
//!
//! Uses the first adapter reported by the platform manager. Central events are
//! forwarded from a background task to the registered notification sinks.

use crate::domain::encoder::WireValue;
use crate::domain::error::HostError;
use crate::domain::models::DiscoveredDevice;
use crate::infrastructure::bluetooth::host::{BleHost, HostEvent, SubscriptionKind};
use crate::infrastructure::bluetooth::protocol;
use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Manager as _, Peripheral as _, PeripheralProperties, ScanFilter,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

const ERR_ADAPTER: i32 = 10001;
const ERR_UNKNOWN_DEVICE: i32 = 10002;
const ERR_CONNECT: i32 = 10003;
const ERR_NO_SERVICE: i32 = 10004;
const ERR_NO_CHARACTERISTIC: i32 = 10005;
const ERR_IO: i32 = 10008;

#[derive(Default)]
struct Shared {
    subscribers: Mutex<Vec<(SubscriptionKind, mpsc::UnboundedSender<HostEvent>)>>,
    peripherals: Mutex<HashMap<String, Peripheral>>,
}

impl Shared {
    fn emit(&self, event: HostEvent) {
        let kind = event.kind();
        let subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        for (_, sink) in subscribers.iter().filter(|(k, _)| *k == kind) {
            let _ = sink.send(event.clone());
        }
    }

    fn remember(&self, device_id: String, peripheral: Peripheral) {
        self.peripherals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(device_id, peripheral);
    }

    fn peripheral(&self, device_id: &str) -> Result<Peripheral, HostError> {
        self.peripherals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(device_id)
            .cloned()
            .ok_or_else(|| HostError::new(ERR_UNKNOWN_DEVICE, format!("unknown device {}", device_id)))
    }
}

pub struct BtleplugHost {
    manager: Manager,
    adapter: Mutex<Option<Adapter>>,
    shared: Arc<Shared>,
    event_task: Mutex<Option<JoinHandle<()>>>,
}

impl BtleplugHost {
    pub async fn new() -> Result<Self, HostError> {
        let manager = Manager::new()
            .await
            .map_err(|e| host_error(ERR_ADAPTER, e))?;
        Ok(Self {
            manager,
            adapter: Mutex::new(None),
            shared: Arc::new(Shared::default()),
            event_task: Mutex::new(None),
        })
    }

    fn adapter(&self) -> Result<Adapter, HostError> {
        self.adapter
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| HostError::new(ERR_ADAPTER, "adapter not opened"))
    }

    fn stop_event_task(&self) {
        if let Some(task) = self
            .event_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for BtleplugHost {
    fn drop(&mut self) {
        self.stop_event_task();
    }
}

fn host_error(code: i32, e: btleplug::Error) -> HostError {
    HostError::new(code, e.to_string())
}

/// Manufacturer data as `company id (LE) ++ payload`, ordered by company id.
fn raw_advertisement(properties: &PeripheralProperties) -> Vec<u8> {
    let mut entries: Vec<_> = properties.manufacturer_data.iter().collect();
    entries.sort_by_key(|(company, _)| **company);
    entries
        .into_iter()
        .flat_map(|(company, data)| company.to_le_bytes().into_iter().chain(data.iter().copied()))
        .collect()
}

async fn forward_event(adapter: &Adapter, shared: &Shared, event: CentralEvent) {
    match event {
        CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
            let Ok(peripheral) = adapter.peripheral(&id).await else {
                return;
            };
            let properties = peripheral.properties().await.ok().flatten();
            let device_id = id.to_string();
            let device = DiscoveredDevice {
                id: device_id.clone(),
                name: properties
                    .as_ref()
                    .and_then(|p| p.local_name.clone())
                    .unwrap_or_default(),
                rssi: properties.as_ref().and_then(|p| p.rssi),
                raw_advertisement: properties
                    .as_ref()
                    .map(raw_advertisement)
                    .unwrap_or_default(),
            };
            trace!("Advertisement from {} ({:?})", device.id, device.name);
            shared.remember(device_id, peripheral);
            shared.emit(HostEvent::DeviceFound(device));
        }
        CentralEvent::DeviceConnected(id) => shared.emit(HostEvent::ConnectionStateChanged {
            device_id: id.to_string(),
            connected: true,
        }),
        CentralEvent::DeviceDisconnected(id) => shared.emit(HostEvent::ConnectionStateChanged {
            device_id: id.to_string(),
            connected: false,
        }),
        _ => {}
    }
}

#[async_trait]
impl BleHost for BtleplugHost {
    async fn adapter_open(&self) -> Result<(), HostError> {
        let adapter = self
            .manager
            .adapters()
            .await
            .map_err(|e| host_error(ERR_ADAPTER, e))?
            .into_iter()
            .next()
            .ok_or_else(|| HostError::new(ERR_ADAPTER, "no bluetooth adapter found"))?;

        let mut events = adapter
            .events()
            .await
            .map_err(|e| host_error(ERR_ADAPTER, e))?;

        self.stop_event_task();
        let shared = self.shared.clone();
        let events_adapter = adapter.clone();
        let task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                forward_event(&events_adapter, &shared, event).await;
            }
            debug!("Central event stream ended");
        });

        *self.event_task.lock().unwrap_or_else(|e| e.into_inner()) = Some(task);
        *self.adapter.lock().unwrap_or_else(|e| e.into_inner()) = Some(adapter);
        info!("btleplug adapter opened");
        Ok(())
    }

    async fn adapter_close(&self) -> Result<(), HostError> {
        self.stop_event_task();
        self.adapter.lock().unwrap_or_else(|e| e.into_inner()).take();
        self.shared
            .peripherals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }

    fn subscribe(&self, kind: SubscriptionKind, sink: mpsc::UnboundedSender<HostEvent>) {
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((kind, sink));
    }

    async fn start_scan(&self) -> Result<(), HostError> {
        self.adapter()?
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| host_error(ERR_ADAPTER, e))
    }

    async fn stop_scan(&self) -> Result<(), HostError> {
        self.adapter()?
            .stop_scan()
            .await
            .map_err(|e| host_error(ERR_ADAPTER, e))
    }

    async fn connect(&self, device_id: &str) -> Result<(), HostError> {
        let peripheral = self.shared.peripheral(device_id)?;
        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral
                .connect()
                .await
                .map_err(|e| host_error(ERR_CONNECT, e))?;
        }
        peripheral
            .discover_services()
            .await
            .map_err(|e| host_error(ERR_CONNECT, e))
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), HostError> {
        self.shared
            .peripheral(device_id)?
            .disconnect()
            .await
            .map_err(|e| host_error(ERR_IO, e))
    }

    async fn list_services(&self, device_id: &str) -> Result<Vec<String>, HostError> {
        let peripheral = self.shared.peripheral(device_id)?;
        Ok(peripheral
            .services()
            .iter()
            .map(|s| s.uuid.to_string())
            .collect())
    }

    async fn list_characteristics(
        &self,
        device_id: &str,
        service_id: &str,
    ) -> Result<Vec<String>, HostError> {
        let peripheral = self.shared.peripheral(device_id)?;
        peripheral
            .services()
            .iter()
            .find(|s| protocol::uuid_matches(&s.uuid.to_string(), service_id))
            .map(|s| s.characteristics.iter().map(|c| c.uuid.to_string()).collect())
            .ok_or_else(|| HostError::new(ERR_NO_SERVICE, format!("no service {}", service_id)))
    }

    async fn write_characteristic(
        &self,
        device_id: &str,
        service_id: &str,
        characteristic_id: &str,
        value: &WireValue,
    ) -> Result<(), HostError> {
        let peripheral = self.shared.peripheral(device_id)?;
        let characteristic = peripheral
            .characteristics()
            .into_iter()
            .find(|c| {
                protocol::uuid_matches(&c.uuid.to_string(), characteristic_id)
                    && protocol::uuid_matches(&c.service_uuid.to_string(), service_id)
            })
            .ok_or_else(|| {
                HostError::new(
                    ERR_NO_CHARACTERISTIC,
                    format!("no characteristic {}", characteristic_id),
                )
            })?;

        peripheral
            .write(&characteristic, value.as_bytes(), WriteType::WithResponse)
            .await
            .map_err(|e| host_error(ERR_IO, e))
    }
}
