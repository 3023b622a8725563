//! Host BLE primitive
//!
//! The runtime's native adapter API as consumed by the core. Every call is
//! asynchronous and resolves to a single tagged success/failure result;
//! notifications arrive on the channel registered with [`BleHost::subscribe`].

use crate::domain::encoder::WireValue;
use crate::domain::error::HostError;
use crate::domain::models::DiscoveredDevice;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Notification streams offered by the host adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionKind {
    AdapterStateChange,
    DeviceFound,
    ConnectionStateChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    AdapterStateChanged { available: bool },
    DeviceFound(DiscoveredDevice),
    ConnectionStateChanged { device_id: String, connected: bool },
}

impl HostEvent {
    pub fn kind(&self) -> SubscriptionKind {
        match self {
            HostEvent::AdapterStateChanged { .. } => SubscriptionKind::AdapterStateChange,
            HostEvent::DeviceFound(_) => SubscriptionKind::DeviceFound,
            HostEvent::ConnectionStateChanged { .. } => SubscriptionKind::ConnectionStateChange,
        }
    }
}

#[async_trait]
pub trait BleHost: Send + Sync {
    async fn adapter_open(&self) -> Result<(), HostError>;
    async fn adapter_close(&self) -> Result<(), HostError>;

    /// Register `sink` for one kind of notification.
    fn subscribe(&self, kind: SubscriptionKind, sink: mpsc::UnboundedSender<HostEvent>);

    async fn start_scan(&self) -> Result<(), HostError>;
    async fn stop_scan(&self) -> Result<(), HostError>;

    async fn connect(&self, device_id: &str) -> Result<(), HostError>;
    async fn disconnect(&self, device_id: &str) -> Result<(), HostError>;

    /// Service UUIDs exposed by a connected device.
    async fn list_services(&self, device_id: &str) -> Result<Vec<String>, HostError>;

    /// Characteristic UUIDs of one service.
    async fn list_characteristics(
        &self,
        device_id: &str,
        service_id: &str,
    ) -> Result<Vec<String>, HostError>;

    /// Resolves once the host reports the write as delivered or failed.
    async fn write_characteristic(
        &self,
        device_id: &str,
        service_id: &str,
        characteristic_id: &str,
        value: &WireValue,
    ) -> Result<(), HostError>;
}
