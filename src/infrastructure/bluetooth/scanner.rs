//! BLE Scanner Module
//!
//! Filters discovery events down to compatible printers.

use crate::domain::models::DiscoveredDevice;
use crate::infrastructure::bluetooth::host::BleHost;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Owned device registries for one discovery session.
pub struct DiscoveryFilter {
    name_marker: String,
    all_devices: Vec<DiscoveredDevice>,
    candidates: Vec<DiscoveredDevice>,
    candidate_ids: HashSet<String>,
    scanning: bool,
}

impl DiscoveryFilter {
    /// `name_marker` is matched case-sensitively as a substring of the advertised name.
    pub fn new(name_marker: impl Into<String>) -> Self {
        Self {
            name_marker: name_marker.into(),
            all_devices: Vec::new(),
            candidates: Vec::new(),
            candidate_ids: HashSet::new(),
            scanning: false,
        }
    }

    /// Record a discovery event. Returns the device if it is a new candidate.
    pub fn on_device_found(&mut self, device: DiscoveredDevice) -> Option<DiscoveredDevice> {
        self.all_devices.push(device.clone());

        if !device.name.contains(&self.name_marker) {
            return None;
        }
        if !self.candidate_ids.insert(device.id.clone()) {
            return None;
        }

        info!("Found printer: {} ({})", device.name, device.id);
        self.candidates.push(device.clone());
        Some(device)
    }

    /// Matching devices in discovery order, each id once.
    pub fn candidates(&self) -> &[DiscoveredDevice] {
        &self.candidates
    }

    /// Every discovery event seen this session, unfiltered.
    pub fn all_devices(&self) -> &[DiscoveredDevice] {
        &self.all_devices
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    /// Start a discovery session. Host failures are logged, not returned.
    pub async fn start_discovery<H: BleHost + ?Sized>(&mut self, host: &H) {
        if self.scanning {
            debug!("Discovery already running");
            return;
        }

        self.clear();
        info!("Starting printer discovery (marker: {:?})", self.name_marker);
        match host.start_scan().await {
            Ok(()) => self.scanning = true,
            Err(e) => warn!("Failed to start discovery: {}", e),
        }
    }

    /// Stop the running discovery session. Host failures are logged, not returned.
    pub async fn stop_discovery<H: BleHost + ?Sized>(&mut self, host: &H) {
        if !self.scanning {
            return;
        }
        info!("Stopping printer discovery...");
        if let Err(e) = host.stop_scan().await {
            warn!("Failed to stop discovery: {}", e);
        }
        self.scanning = false;
    }

    fn clear(&mut self) {
        self.all_devices.clear();
        self.candidates.clear();
        self.candidate_ids.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::bluetooth::mock::MockBleHost;

    #[test]
    fn test_filters_by_marker_and_deduplicates() {
        let mut filter = DiscoveryFilter::new("JJKY");

        assert!(filter
            .on_device_found(DiscoveredDevice::new("a", "JJKY-001"))
            .is_some());
        assert!(filter
            .on_device_found(DiscoveredDevice::new("b", "Headphones"))
            .is_none());
        assert!(filter
            .on_device_found(DiscoveredDevice::new("c", "jjky-lowercase"))
            .is_none());
        assert!(filter
            .on_device_found(DiscoveredDevice::new("a", "JJKY-001"))
            .is_none());
        assert!(filter
            .on_device_found(DiscoveredDevice::new("d", "Printer JJKY 2"))
            .is_some());

        let ids: Vec<_> = filter.candidates().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(filter.all_devices().len(), 5);
    }

    #[test]
    fn test_unnamed_device_is_not_a_candidate() {
        let mut filter = DiscoveryFilter::new("JJKY");
        assert!(filter
            .on_device_found(DiscoveredDevice::new("a", ""))
            .is_none());
        assert_eq!(filter.all_devices().len(), 1);
    }

    #[tokio::test]
    async fn test_start_stop_are_idempotent() {
        let host = MockBleHost::new();
        let mut filter = DiscoveryFilter::new("JJKY");

        filter.start_discovery(&host).await;
        filter.start_discovery(&host).await;
        assert!(filter.is_scanning());
        assert!(host.is_scanning());

        filter.stop_discovery(&host).await;
        filter.stop_discovery(&host).await;
        assert!(!filter.is_scanning());
        assert_eq!(host.scan_calls(), (1, 1));
    }

    #[tokio::test]
    async fn test_duplicate_does_not_stop_scanning() {
        let host = MockBleHost::new();
        let mut filter = DiscoveryFilter::new("JJKY");
        filter.start_discovery(&host).await;

        filter.on_device_found(DiscoveredDevice::new("a", "JJKY-001"));
        filter.on_device_found(DiscoveredDevice::new("a", "JJKY-001"));

        assert!(filter.is_scanning());
        assert_eq!(host.scan_calls(), (1, 0));
    }

    #[tokio::test]
    async fn test_new_session_clears_registries() {
        let host = MockBleHost::new();
        let mut filter = DiscoveryFilter::new("JJKY");
        filter.start_discovery(&host).await;
        filter.on_device_found(DiscoveredDevice::new("a", "JJKY-001"));
        filter.stop_discovery(&host).await;
        assert_eq!(filter.candidates().len(), 1);

        filter.start_discovery(&host).await;
        assert!(filter.candidates().is_empty());
        assert!(filter.all_devices().is_empty());
    }
}
