//! BLE label printer core
//!
//! Discovers printers advertising the printer parser service and streams
//! command payloads to their write characteristic in platform-sized chunks.

pub mod domain;
pub mod infrastructure;

pub use domain::error::{
    AdapterError, ConnectError, CoreError, HostError, ResolveError, TransferError,
};
pub use domain::models::{AppEvent, DiscoveredDevice, GattHandle, TransferState};
pub use domain::profile::{Encoding, PlatformProfile};
pub use infrastructure::bluetooth::{BleHost, PrinterService};
