//! Printer Service Module
//!
//! Main service that coordinates the adapter, discovery, connection and
//! transfer for the label printer. This is the surface the UI talks to.

use crate::domain::error::CoreError;
use crate::domain::models::{
    AdapterState, AppEvent, ConnectionStatus, DiscoveredDevice, MessageSeverity, StatusMessage,
    TransferState,
};
use crate::domain::profile::{self, PlatformProfile};
use crate::domain::settings::PrinterSettings;
use crate::infrastructure::bluetooth::{
    adapter::AdapterManager,
    connection::{ConnectionConfig, GattResolver},
    host::{BleHost, HostEvent},
    scanner::DiscoveryFilter,
    transfer::TransferEngine,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub struct PrinterService<H: BleHost> {
    host: Arc<H>,
    adapter: AdapterManager<H>,
    discovery: DiscoveryFilter,
    resolver: GattResolver<H>,
    engine: TransferEngine<H>,
    platform_id: String,
    host_events: mpsc::UnboundedReceiver<HostEvent>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
}

impl<H: BleHost> PrinterService<H> {
    /// Create a new printer service
    pub fn new(
        host: Arc<H>,
        settings: &PrinterSettings,
        platform_id: impl Into<String>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
    ) -> Self {
        let (host_tx, host_events) = mpsc::unbounded_channel();
        Self {
            adapter: AdapterManager::new(host.clone(), host_tx),
            discovery: DiscoveryFilter::new(settings.name_marker.clone()),
            resolver: GattResolver::new(host.clone(), ConnectionConfig::from(settings)),
            engine: TransferEngine::new(host.clone()).with_events(event_sender.clone()),
            host,
            platform_id: platform_id.into(),
            host_events,
            event_sender,
        }
    }

    pub fn adapter_state(&self) -> AdapterState {
        self.adapter.state()
    }

    pub fn transfer_state(&self) -> TransferState {
        self.engine.state()
    }

    /// Profile used for the next transfer
    pub fn platform_profile(&self) -> PlatformProfile {
        profile::resolve(&self.platform_id)
    }

    pub fn is_connected(&self) -> bool {
        self.resolver.connected_device().is_some()
    }

    /// Open the Bluetooth adapter
    pub async fn initialize(&mut self) -> Result<(), CoreError> {
        let result = self.adapter.initialize().await;
        self.publish(AppEvent::AdapterState(self.adapter.state()));
        if result.is_err() {
            self.send_log(
                "Bluetooth is unavailable. Turn it on and retry.",
                MessageSeverity::Error,
            );
        }
        result.map_err(CoreError::from)
    }

    /// Start scanning for printers
    pub async fn start_discovery(&mut self) {
        self.discovery.start_discovery(self.host.as_ref()).await;
        if self.discovery.is_scanning() {
            self.send_log("Searching for printers...", MessageSeverity::Info);
        }
    }

    /// Stop scanning
    pub async fn stop_discovery(&mut self) {
        self.discovery.stop_discovery(self.host.as_ref()).await;
    }

    /// Apply every host notification received so far. Returns how many were handled.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.host_events.try_recv() {
            self.handle_host_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait until at least one printer has been discovered, or `timeout` elapses
    pub async fn wait_for_candidate(&mut self, timeout: Duration) -> Option<DiscoveredDevice> {
        let deadline = tokio::time::Instant::now() + timeout;
        self.process_events();
        while self.discovery.candidates().is_empty() {
            match tokio::time::timeout_at(deadline, self.host_events.recv()).await {
                Ok(Some(event)) => self.handle_host_event(event),
                Ok(None) | Err(_) => break,
            }
        }
        self.discovery.candidates().first().cloned()
    }

    /// Printers discovered in this session, in discovery order
    pub fn candidate_devices(&self) -> &[DiscoveredDevice] {
        self.discovery.candidates()
    }

    /// Every device seen in this session, printer or not
    pub fn all_devices(&self) -> &[DiscoveredDevice] {
        self.discovery.all_devices()
    }

    /// Connect to a printer and resolve its write characteristic.
    ///
    /// `None` picks the first discovered printer.
    pub async fn select_and_connect(&mut self, device_id: Option<&str>) -> Result<(), CoreError> {
        self.process_events();

        let device_id = match device_id {
            Some(id) => id.to_string(),
            None => self
                .discovery
                .candidates()
                .first()
                .map(|d| d.id.clone())
                .ok_or(CoreError::NoCandidate)?,
        };

        self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Connecting));
        self.send_log("Connecting to printer...", MessageSeverity::Info);

        let result = self.connect_and_resolve(&device_id).await;
        match &result {
            Ok(()) => {
                self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Connected));
                self.send_log("Printer connected", MessageSeverity::Success);
            }
            Err(e) => {
                warn!("Failed to connect to {}: {}", device_id, e);
                self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Error));
                self.send_log(&format!("Connection failed: {}", e), MessageSeverity::Error);
            }
        }
        result
    }

    async fn connect_and_resolve(&mut self, device_id: &str) -> Result<(), CoreError> {
        self.resolver.connect(device_id).await?;
        self.resolver.resolve(device_id).await?;
        Ok(())
    }

    /// Send a text command stream to the connected printer
    pub async fn send_payload(&self, text: &str) -> Result<(), CoreError> {
        self.send_bytes(text.as_bytes()).await
    }

    /// Send raw bytes to the connected printer
    pub async fn send_bytes(&self, payload: &[u8]) -> Result<(), CoreError> {
        let handle = self
            .resolver
            .cached_handle()
            .cloned()
            .ok_or(CoreError::NotConnected)?;
        let profile = self.platform_profile();

        match self.engine.send(payload, &handle, &profile).await {
            Ok(()) => {
                self.send_log("Sent to printer successfully", MessageSeverity::Success);
                Ok(())
            }
            Err(e) => {
                self.send_log(
                    &format!("Failed to send to printer: {}", e),
                    MessageSeverity::Error,
                );
                Err(e.into())
            }
        }
    }

    /// Abort the running transfer at the next chunk boundary
    pub fn cancel_transfer(&self) {
        self.engine.cancel();
    }

    /// Disconnect from the current printer
    pub async fn disconnect(&mut self) {
        if !self.is_connected() {
            return;
        }
        self.resolver.disconnect().await;
        self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
        self.send_log("Disconnected from printer", MessageSeverity::Info);
    }

    /// Stop discovery, drop the connection and close the adapter
    pub async fn shutdown(&mut self) {
        self.engine.cancel();
        self.stop_discovery().await;
        self.disconnect().await;
        self.adapter.shutdown().await;
        self.publish(AppEvent::AdapterState(self.adapter.state()));
    }

    fn handle_host_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::AdapterStateChanged { available } => {
                let state = self.adapter.handle_adapter_state(available);
                self.publish(AppEvent::AdapterState(state));
            }
            HostEvent::DeviceFound(device) => {
                if let Some(candidate) = self.discovery.on_device_found(device) {
                    self.publish(AppEvent::CandidateFound(candidate));
                }
            }
            HostEvent::ConnectionStateChanged {
                device_id,
                connected,
            } => {
                debug!("Connection state of {}: connected={}", device_id, connected);
                let was_ours = self.resolver.connected_device() == Some(device_id.as_str());
                self.resolver.handle_connection_state(&device_id, connected);
                if was_ours && !connected {
                    info!("Printer connection lost");
                    self.publish(AppEvent::ConnectionStatus(ConnectionStatus::Disconnected));
                    self.send_log("Printer disconnected", MessageSeverity::Warning);
                }
            }
        }
    }

    fn publish(&self, event: AppEvent) {
        let _ = self.event_sender.send(event);
    }

    /// Send a log message
    fn send_log(&self, message: &str, severity: MessageSeverity) {
        self.publish(AppEvent::LogMessage(StatusMessage {
            message: message.to_string(),
            severity,
        }));
    }
}
