//! BLE communication module.
//!
//! Adapter enumeration, scanning, connection tracking and notification
//! subscriptions on top of btleplug.

pub mod characteristics;
pub mod connection;
pub mod peripheral;
pub mod scanner;
pub mod uuids;

pub use characteristics::NotificationSubscription;
pub use connection::{ConnectionManager, ConnectionState, DisconnectOutcome};
pub use peripheral::{AdapterInfo, PeripheralInfo, PeripheralLink, ServiceCharacteristic};
pub use scanner::DiscoveredPeripheral;
pub use uuids::*;
