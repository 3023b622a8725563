//! Adapter Lifecycle Module
//!
//! Opens and closes the host adapter and wires the host notification streams
//! into a single channel the service drains.

use crate::domain::error::AdapterError;
use crate::domain::models::AdapterState;
use crate::infrastructure::bluetooth::host::{BleHost, HostEvent, SubscriptionKind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const SUBSCRIPTIONS: [SubscriptionKind; 3] = [
    SubscriptionKind::AdapterStateChange,
    SubscriptionKind::DeviceFound,
    SubscriptionKind::ConnectionStateChange,
];

pub struct AdapterManager<H: BleHost> {
    host: Arc<H>,
    state: AdapterState,
    subscribed: bool,
    event_sink: mpsc::UnboundedSender<HostEvent>,
}

impl<H: BleHost> AdapterManager<H> {
    /// Notifications from the host are forwarded to `event_sink` once initialized.
    pub fn new(host: Arc<H>, event_sink: mpsc::UnboundedSender<HostEvent>) -> Self {
        Self {
            host,
            state: AdapterState::Uninitialized,
            subscribed: false,
            event_sink,
        }
    }

    pub fn state(&self) -> AdapterState {
        self.state
    }

    /// Open the adapter. Subscriptions are registered on the first success only.
    pub async fn initialize(&mut self) -> Result<(), AdapterError> {
        if self.state == AdapterState::Ready {
            debug!("Adapter already initialized");
            return Ok(());
        }

        info!("Opening Bluetooth adapter...");
        self.state = AdapterState::Initializing;

        if let Err(e) = self.host.adapter_open().await {
            warn!("Failed to open Bluetooth adapter: {}", e);
            self.state = AdapterState::Failed;
            return Err(AdapterError::Unavailable);
        }

        if !self.subscribed {
            for kind in SUBSCRIPTIONS {
                self.host.subscribe(kind, self.event_sink.clone());
            }
            self.subscribed = true;
            debug!("Subscribed to adapter, device and connection notifications");
        }

        self.state = AdapterState::Ready;
        info!("Bluetooth adapter ready");
        Ok(())
    }

    /// Apply an adapter-state-change notification.
    ///
    /// Losing the adapter moves to `Failed`; coming back does not leave `Failed`
    /// until `initialize()` is called again.
    pub fn handle_adapter_state(&mut self, available: bool) -> AdapterState {
        match (available, self.state) {
            (false, AdapterState::Ready | AdapterState::Initializing) => {
                warn!("Bluetooth adapter became unavailable");
                self.state = AdapterState::Failed;
            }
            (true, AdapterState::Failed) => {
                info!("Bluetooth adapter is back; re-initialize to use it");
            }
            _ => {}
        }
        self.state
    }

    /// Close the adapter. A later `initialize()` reopens it without re-subscribing.
    pub async fn shutdown(&mut self) {
        if self.state == AdapterState::Uninitialized {
            return;
        }
        if let Err(e) = self.host.adapter_close().await {
            warn!("Failed to close Bluetooth adapter: {}", e);
        }
        self.state = AdapterState::Uninitialized;
        info!("Bluetooth adapter closed");
    }
}
