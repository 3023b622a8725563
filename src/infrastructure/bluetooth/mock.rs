//! In-memory host used by tests and the `--simulate` mode.
//!
//! Behaves like a single printer peripheral. Every write is recorded and the
//! number of simultaneously outstanding writes is tracked so callers can check
//! that the transfer engine never overlaps them.

use crate::domain::encoder::WireValue;
use crate::domain::error::HostError;
use crate::domain::models::DiscoveredDevice;
use crate::infrastructure::bluetooth::host::{BleHost, HostEvent, SubscriptionKind};
use crate::infrastructure::bluetooth::protocol;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct MockService {
    pub uuid: String,
    pub characteristics: Vec<String>,
}

impl MockService {
    /// The printer parser service with its read and write characteristics.
    pub fn printer() -> Self {
        Self {
            uuid: protocol::PRINTER_SERVICE_UUID.to_string(),
            characteristics: vec![
                protocol::READ_CHAR_UUID.to_string(),
                protocol::WRITE_CHAR_UUID.to_string(),
            ],
        }
    }

    pub fn device_info() -> Self {
        Self {
            uuid: protocol::DEVICE_INFO_SERVICE_UUID.to_string(),
            characteristics: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub device_id: String,
    pub service_id: String,
    pub characteristic_id: String,
    pub value: WireValue,
    pub succeeded: bool,
}

#[derive(Debug, Default)]
struct MockState {
    fail_open: bool,
    open_calls: usize,
    close_calls: usize,
    subscribers: Vec<(SubscriptionKind, mpsc::UnboundedSender<HostEvent>)>,
    advertised: Vec<DiscoveredDevice>,
    scanning: bool,
    start_scan_calls: usize,
    stop_scan_calls: usize,
    reject_connect: bool,
    connect_delay: Option<Duration>,
    connected: Option<String>,
    services: Vec<MockService>,
    service_queries: usize,
    characteristic_queries: usize,
    fail_write_at: Option<usize>,
    write_latency: Option<Duration>,
    writes: Vec<WriteRecord>,
}

#[derive(Debug, Default)]
pub struct MockBleHost {
    state: Mutex<MockState>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockBleHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A host advertising one printer that exposes the printer service.
    pub fn with_printer(device_id: &str, name: &str) -> Self {
        Self::new()
            .with_device(DiscoveredDevice::new(device_id, name))
            .with_services(vec![MockService::device_info(), MockService::printer()])
    }

    pub fn with_device(self, device: DiscoveredDevice) -> Self {
        self.lock().advertised.push(device);
        self
    }

    pub fn with_services(self, services: Vec<MockService>) -> Self {
        self.lock().services = services;
        self
    }

    pub fn with_write_latency(self, latency: Duration) -> Self {
        self.lock().write_latency = Some(latency);
        self
    }

    pub fn with_connect_delay(self, delay: Duration) -> Self {
        self.lock().connect_delay = Some(delay);
        self
    }

    pub fn fail_open(self, fail: bool) -> Self {
        self.lock().fail_open = fail;
        self
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    pub fn reject_connect(self) -> Self {
        self.lock().reject_connect = true;
        self
    }

    /// Fail the write with this zero-based index (counting every write attempt).
    pub fn fail_write_at(self, index: usize) -> Self {
        self.lock().fail_write_at = Some(index);
        self
    }

    /// Deliver a notification to every sink subscribed to its kind.
    pub fn emit(&self, event: HostEvent) {
        let kind = event.kind();
        let state = self.lock();
        for (_, sink) in state.subscribers.iter().filter(|(k, _)| *k == kind) {
            let _ = sink.send(event.clone());
        }
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    /// Concatenated bytes of all successful writes, in issue order.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.succeeded)
            .flat_map(|w| w.value.as_bytes().to_vec())
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    pub fn scan_calls(&self) -> (usize, usize) {
        let state = self.lock();
        (state.start_scan_calls, state.stop_scan_calls)
    }

    pub fn is_scanning(&self) -> bool {
        self.lock().scanning
    }

    pub fn service_queries(&self) -> usize {
        self.lock().service_queries
    }

    pub fn characteristic_queries(&self) -> usize {
        self.lock().characteristic_queries
    }

    pub fn connected_device(&self) -> Option<String> {
        self.lock().connected.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn require_connected(&self, device_id: &str) -> Result<(), HostError> {
        match self.lock().connected.as_deref() {
            Some(id) if id == device_id => Ok(()),
            _ => Err(HostError::new(10006, "no connection")),
        }
    }
}

#[async_trait]
impl BleHost for MockBleHost {
    async fn adapter_open(&self) -> Result<(), HostError> {
        let mut state = self.lock();
        state.open_calls += 1;
        if state.fail_open {
            return Err(HostError::new(10001, "bluetooth adapter not available"));
        }
        Ok(())
    }

    async fn adapter_close(&self) -> Result<(), HostError> {
        let mut state = self.lock();
        state.close_calls += 1;
        state.scanning = false;
        state.connected = None;
        Ok(())
    }

    fn subscribe(&self, kind: SubscriptionKind, sink: mpsc::UnboundedSender<HostEvent>) {
        self.lock().subscribers.push((kind, sink));
    }

    async fn start_scan(&self) -> Result<(), HostError> {
        let advertised = {
            let mut state = self.lock();
            state.start_scan_calls += 1;
            state.scanning = true;
            state.advertised.clone()
        };
        for device in advertised {
            self.emit(HostEvent::DeviceFound(device));
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), HostError> {
        let mut state = self.lock();
        state.stop_scan_calls += 1;
        state.scanning = false;
        Ok(())
    }

    async fn connect(&self, device_id: &str) -> Result<(), HostError> {
        let (delay, reject, known) = {
            let state = self.lock();
            (
                state.connect_delay,
                state.reject_connect,
                state.advertised.iter().any(|d| d.id == device_id),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if reject || !known {
            return Err(HostError::new(10003, "connection fail"));
        }
        self.lock().connected = Some(device_id.to_string());
        self.emit(HostEvent::ConnectionStateChanged {
            device_id: device_id.to_string(),
            connected: true,
        });
        Ok(())
    }

    async fn disconnect(&self, device_id: &str) -> Result<(), HostError> {
        let was_connected = {
            let mut state = self.lock();
            if state.connected.as_deref() == Some(device_id) {
                state.connected = None;
                true
            } else {
                false
            }
        };
        if was_connected {
            self.emit(HostEvent::ConnectionStateChanged {
                device_id: device_id.to_string(),
                connected: false,
            });
        }
        Ok(())
    }

    async fn list_services(&self, device_id: &str) -> Result<Vec<String>, HostError> {
        self.require_connected(device_id)?;
        let mut state = self.lock();
        state.service_queries += 1;
        Ok(state.services.iter().map(|s| s.uuid.clone()).collect())
    }

    async fn list_characteristics(
        &self,
        device_id: &str,
        service_id: &str,
    ) -> Result<Vec<String>, HostError> {
        self.require_connected(device_id)?;
        let mut state = self.lock();
        state.characteristic_queries += 1;
        state
            .services
            .iter()
            .find(|s| protocol::uuid_matches(&s.uuid, service_id))
            .map(|s| s.characteristics.clone())
            .ok_or_else(|| HostError::new(10004, "no service"))
    }

    async fn write_characteristic(
        &self,
        device_id: &str,
        service_id: &str,
        characteristic_id: &str,
        value: &WireValue,
    ) -> Result<(), HostError> {
        let outstanding = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(outstanding, Ordering::SeqCst);

        let latency = self.lock().write_latency;
        match latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }

        let connected = self.require_connected(device_id);
        let succeeded = {
            let mut state = self.lock();
            let index = state.writes.len();
            let succeeded = connected.is_ok() && state.fail_write_at != Some(index);
            state.writes.push(WriteRecord {
                device_id: device_id.to_string(),
                service_id: service_id.to_string(),
                characteristic_id: characteristic_id.to_string(),
                value: value.clone(),
                succeeded,
            });
            succeeded
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        connected?;
        if succeeded {
            Ok(())
        } else {
            Err(HostError::new(10008, "write characteristic failed"))
        }
    }
}
