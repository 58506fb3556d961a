//! # pico-ble-observer
//!
//! Observe nearby BLE devices through a Raspberry Pi Pico and plot their
//! signal strength.
//!
//! The Pico scans for advertisers and relays each sighting as a GATT
//! notification. This crate subscribes to that stream, decodes every
//! notification into an [`ObservationRecord`], and accumulates per-address
//! RSSI history in a [`DeviceRegistry`]. The Pico's USB serial console is
//! also supported for sending commands and reading its output.
//!
//! ## Features
//!
//! - **Serial Link**: Detect the Pico among serial ports and exchange line commands
//! - **BLE Session**: Enumerate adapters, scan, connect and subscribe
//! - **Device Registry**: Per-address RSSI history with bounded retention
//! - **Presentation**: Keyed selection lists and live RSSI plot series
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pico_ble_observer::{BleSession, ObserverConfig, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = ObserverConfig::default();
//!     let session = BleSession::new(&config).await?;
//!
//!     let adapters = session.list_adapters().await?;
//!     for peripheral in session.scan(adapters[0].index).await? {
//!         println!("Found {}", peripheral);
//!     }
//!
//!     session.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` and `dialout` groups.
//!
//! ### macOS
//! Requires Bluetooth permission for the terminal running the observer.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod app;
pub mod ble;
pub mod config;
pub mod data;
pub mod error;
pub mod observer;
pub mod presentation;
pub mod protocol;
pub mod session;
pub mod task;
pub mod transport;
pub mod utils;

// Re-exports for convenience
pub use app::{AppEvent, Dialog, EventLog, LogEntry, LogLevel, ObserverContext};
pub use config::{HistoryRetention, ObserverConfig};
pub use error::{Error, Result};
pub use observer::{process_payload, spawn_observer, ObservationEvent};
pub use presentation::{DeviceListView, Keyed, KeyedSelection, PlotSeries};
pub use session::BleSession;
pub use task::{CancelFlag, TaskHandle};
pub use utils::{format_elapsed, rssi_bounds};

// Re-export commonly used types from submodules
pub use ble::connection::{ConnectionState, DisconnectOutcome};
pub use ble::peripheral::{AdapterInfo, PeripheralInfo, ServiceCharacteristic};
pub use data::{DeviceEntry, DeviceRecord, DeviceRegistry, DeviceSummary, UpsertOutcome};
pub use protocol::{ObservationRecord, PicoCommand};
pub use transport::{PortDescription, SerialEvent, SerialLink};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<ObserverContext>();
        let _ = std::any::TypeId::of::<BleSession>();
        let _ = std::any::TypeId::of::<DeviceRegistry>();
        let _ = std::any::TypeId::of::<ObservationRecord>();
        let _ = std::any::TypeId::of::<SerialLink>();
        let _ = std::any::TypeId::of::<Error>();
    }
}
