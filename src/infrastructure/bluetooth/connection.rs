//! BLE Connection Module
//!
//! Connects to a printer and resolves the GATT service and write
//! characteristic the transfer engine writes to.

use crate::domain::error::{ConnectError, ResolveError};
use crate::domain::models::GattHandle;
use crate::domain::settings::PrinterSettings;
use crate::infrastructure::bluetooth::host::BleHost;
use crate::infrastructure::bluetooth::protocol;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Configuration for connection behavior
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Upper bound on a single connect attempt
    pub connect_timeout: Duration,
    /// Printer service UUID
    pub service_uuid: String,
    /// Write characteristic UUID
    pub write_char_uuid: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&PrinterSettings::default())
    }
}

impl From<&PrinterSettings> for ConnectionConfig {
    fn from(settings: &PrinterSettings) -> Self {
        Self {
            connect_timeout: settings.connect_timeout(),
            service_uuid: settings.service_uuid.clone(),
            write_char_uuid: settings.write_char_uuid.clone(),
        }
    }
}

/// Connection state plus the handle cache for the connected device.
pub struct GattResolver<H: BleHost> {
    host: Arc<H>,
    config: ConnectionConfig,
    connected: Option<String>,
    cached: Option<GattHandle>,
}

impl<H: BleHost> GattResolver<H> {
    pub fn new(host: Arc<H>, config: ConnectionConfig) -> Self {
        Self {
            host,
            config,
            connected: None,
            cached: None,
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn connected_device(&self) -> Option<&str> {
        self.connected.as_deref()
    }

    pub fn cached_handle(&self) -> Option<&GattHandle> {
        self.cached.as_ref()
    }

    /// Connect to a device by id
    pub async fn connect(&mut self, device_id: &str) -> Result<(), ConnectError> {
        if self.connected.as_deref() == Some(device_id) {
            return Ok(());
        }
        if self.connected.is_some() {
            self.disconnect().await;
        }

        info!("Connecting to printer: {}", device_id);
        match tokio::time::timeout(self.config.connect_timeout, self.host.connect(device_id)).await
        {
            Err(_) => {
                warn!(
                    "Connection to {} timed out after {:?}",
                    device_id, self.config.connect_timeout
                );
                Err(ConnectError::Timeout)
            }
            Ok(Err(e)) => {
                warn!("Connection to {} rejected: {}", device_id, e);
                Err(ConnectError::Rejected)
            }
            Ok(Ok(())) => {
                info!("Printer connected: {}", device_id);
                self.connected = Some(device_id.to_string());
                Ok(())
            }
        }
    }

    /// Resolve the configured service and write characteristic
    pub async fn resolve(&mut self, device_id: &str) -> Result<GattHandle, ResolveError> {
        let service_uuid = self.config.service_uuid.clone();
        let write_char_uuid = self.config.write_char_uuid.clone();
        self.resolve_handle(device_id, &service_uuid, &write_char_uuid)
            .await
    }

    /// Resolve a service/characteristic pair, reusing the cached handle when it matches
    pub async fn resolve_handle(
        &mut self,
        device_id: &str,
        service_uuid: &str,
        write_char_uuid: &str,
    ) -> Result<GattHandle, ResolveError> {
        if let Some(handle) = &self.cached {
            if handle.device_id == device_id
                && protocol::uuid_matches(&handle.service_id, service_uuid)
                && protocol::uuid_matches(&handle.characteristic_id, write_char_uuid)
            {
                return Ok(handle.clone());
            }
        }

        let services = self.host.list_services(device_id).await.map_err(|e| {
            error!("Failed to get GATT services: {}", e);
            ResolveError::ServiceNotFound
        })?;
        info!("Found {} services", services.len());

        let service_id = services
            .into_iter()
            .find(|s| protocol::uuid_matches(s, service_uuid))
            .ok_or_else(|| {
                error!("Printer service {} not found", service_uuid);
                ResolveError::ServiceNotFound
            })?;

        let characteristics = self
            .host
            .list_characteristics(device_id, &service_id)
            .await
            .map_err(|e| {
                error!("Failed to get characteristics: {}", e);
                ResolveError::CharacteristicNotFound
            })?;
        info!("Found {} characteristics", characteristics.len());

        let characteristic_id = characteristics
            .into_iter()
            .find(|c| protocol::uuid_matches(c, write_char_uuid))
            .ok_or_else(|| {
                error!("Write characteristic {} not found", write_char_uuid);
                ResolveError::CharacteristicNotFound
            })?;

        let handle = GattHandle {
            device_id: device_id.to_string(),
            service_id,
            characteristic_id,
        };
        self.cached = Some(handle.clone());
        Ok(handle)
    }

    /// Apply a connection-state-change notification
    pub fn handle_connection_state(&mut self, device_id: &str, connected: bool) {
        if connected {
            return;
        }
        if self.connected.as_deref() == Some(device_id) {
            info!("Printer {} disconnected", device_id);
            self.connected = None;
        }
        if self
            .cached
            .as_ref()
            .is_some_and(|handle| handle.device_id == device_id)
        {
            self.cached = None;
        }
    }

    /// Disconnect from the current device
    pub async fn disconnect(&mut self) {
        let Some(device_id) = self.connected.take() else {
            return;
        };
        self.cached = None;
        if let Err(e) = self.host.disconnect(&device_id).await {
            warn!("Failed to disconnect from {}: {}", device_id, e);
        }
        info!("Disconnected from printer {}", device_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mock::{MockBleHost, MockService};

    const DEVICE: &str = "AA:BB:CC:DD:EE:01";

    async fn connected(host: MockBleHost) -> (Arc<MockBleHost>, GattResolver<MockBleHost>) {
        let host = Arc::new(host);
        let mut resolver = GattResolver::new(host.clone(), ConnectionConfig::default());
        resolver.connect(DEVICE).await.unwrap();
        (host, resolver)
    }

    #[tokio::test]
    async fn test_resolve_and_cache() {
        let (host, mut resolver) = connected(MockBleHost::with_printer(DEVICE, "JJKY-01")).await;

        let handle = resolver.resolve(DEVICE).await.unwrap();
        assert_eq!(handle.device_id, DEVICE);
        assert!(protocol::uuid_matches(&handle.characteristic_id, protocol::WRITE_CHAR_UUID));

        let again = resolver.resolve(DEVICE).await.unwrap();
        assert_eq!(again, handle);
        assert_eq!(host.service_queries(), 1);
        assert_eq!(host.characteristic_queries(), 1);
    }

    #[tokio::test]
    async fn test_missing_service_skips_characteristic_lookup() {
        let host = MockBleHost::with_printer(DEVICE, "JJKY-01")
            .with_services(vec![MockService::device_info()]);
        let (host, mut resolver) = connected(host).await;

        assert_eq!(
            resolver.resolve(DEVICE).await,
            Err(ResolveError::ServiceNotFound)
        );
        assert_eq!(host.characteristic_queries(), 0);
    }

    #[tokio::test]
    async fn test_missing_characteristic() {
        let mut service = MockService::printer();
        service.characteristics = vec![protocol::READ_CHAR_UUID.to_string()];
        let host = MockBleHost::with_printer(DEVICE, "JJKY-01").with_services(vec![service]);
        let (_host, mut resolver) = connected(host).await;

        assert_eq!(
            resolver.resolve(DEVICE).await,
            Err(ResolveError::CharacteristicNotFound)
        );
        assert!(resolver.cached_handle().is_none());
    }

    #[tokio::test]
    async fn test_disconnect_event_invalidates_cache() {
        let (host, mut resolver) = connected(MockBleHost::with_printer(DEVICE, "JJKY-01")).await;
        resolver.resolve(DEVICE).await.unwrap();

        resolver.handle_connection_state("someone-else", false);
        assert!(resolver.cached_handle().is_some());

        resolver.handle_connection_state(DEVICE, false);
        assert!(resolver.cached_handle().is_none());
        assert!(resolver.connected_device().is_none());

        resolver.connect(DEVICE).await.unwrap();
        resolver.resolve(DEVICE).await.unwrap();
        assert_eq!(host.service_queries(), 2);
    }

    #[tokio::test]
    async fn test_connect_rejected() {
        let host = Arc::new(MockBleHost::with_printer(DEVICE, "JJKY-01").reject_connect());
        let mut resolver = GattResolver::new(host, ConnectionConfig::default());
        assert_eq!(resolver.connect(DEVICE).await, Err(ConnectError::Rejected));
        assert!(resolver.connected_device().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        let host = Arc::new(
            MockBleHost::with_printer(DEVICE, "JJKY-01").with_connect_delay(Duration::from_secs(60)),
        );
        let config = ConnectionConfig {
            connect_timeout: Duration::from_secs(5),
            ..ConnectionConfig::default()
        };
        let mut resolver = GattResolver::new(host, config);
        assert_eq!(resolver.connect(DEVICE).await, Err(ConnectError::Timeout));
    }
}
