use serde::{Deserialize, Serialize};

/// Lifecycle of the host BLE adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    /// Terminal until `initialize()` is called again.
    Failed,
}

/// A peripheral reported by a discovery event.
///
/// Identity is the device id; two events for the same id describe the same device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub id: String,
    pub name: String,
    pub rssi: Option<i16>,
    #[serde(default)]
    pub raw_advertisement: Vec<u8>,
}

impl DiscoveredDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rssi: None,
            raw_advertisement: Vec::new(),
        }
    }
}

/// Service and write characteristic resolved for one connected device.
///
/// Immutable once resolved; invalidated when the device disconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattHandle {
    pub device_id: String,
    pub service_id: String,
    pub characteristic_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    InFlight,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Notifications published to the UI collaborator.
#[derive(Debug, Clone)]
pub enum AppEvent {
    AdapterState(AdapterState),
    CandidateFound(DiscoveredDevice),
    ConnectionStatus(ConnectionStatus),
    TransferProgress { sent: usize, total: usize },
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}
