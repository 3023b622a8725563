//! Bluetooth Module
//!
//! Discovers label printers over BLE and streams command payloads to them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    PrinterService                        │
//! │  (Main coordinator - public API for the UI layer)        │
//! └──────┬──────────────┬───────────────┬──────────────┬────┘
//!        │              │               │              │
//!        ▼              ▼               ▼              ▼
//! ┌───────────┐  ┌────────────┐  ┌────────────┐  ┌──────────┐
//! │  Adapter  │  │  Scanner   │  │ Connection │  │ Transfer │
//! │           │  │            │  │            │  │          │
//! │ - open    │  │ - name     │  │ - connect  │  │ - chunks │
//! │ - notify  │  │   filter   │  │ - GATT     │  │ - pacing │
//! │   streams │  │ - dedup    │  │   handles  │  │ - encode │
//! └───────────┘  └────────────┘  └────────────┘  └──────────┘
//!        └──────────────┴───────┬───────┴──────────────┘
//!                               ▼
//!                        ┌────────────┐
//!                        │  BleHost   │  (mock / btleplug)
//!                        └────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`host`] - Host BLE primitive trait and notification types
//! - [`protocol`] - Printer GATT UUIDs and UUID helpers
//! - [`adapter`] - Adapter lifecycle and notification subscriptions
//! - [`scanner`] - Printer discovery filter
//! - [`connection`] - Device connection and GATT handle resolution
//! - [`transfer`] - Sequential chunked transfer engine
//! - [`service`] - Main service coordinator
//! - [`mock`] - In-memory host for tests and simulation

pub mod adapter;
#[cfg(feature = "btleplug")]
pub mod btleplug_host;
pub mod connection;
pub mod host;
pub mod mock;
pub mod protocol;
pub mod scanner;
pub mod service;
pub mod transfer;

// Re-export main service for convenience
pub use host::BleHost;
pub use service::PrinterService;
