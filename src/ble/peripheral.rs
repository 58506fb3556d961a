//! Peripheral descriptions and the link abstraction over `btleplug`.

use async_trait::async_trait;
use btleplug::api::{CharPropFlags, Peripheral as ApiPeripheral};
use btleplug::platform::Peripheral;
use uuid::Uuid;

use crate::ble::uuids::is_observer_stream;
use crate::error::{Error, Result};

/// A local Bluetooth adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdapterInfo {
    /// Position in the platform's adapter list.
    pub index: usize,
    /// Platform description (identifier and address where available).
    pub description: String,
}

impl std::fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.index, self.description)
    }
}

/// A peripheral found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralInfo {
    /// Stable platform identifier, used as the selection key.
    pub identifier: String,
    /// Advertised local name, if any.
    pub name: Option<String>,
    /// Bluetooth address.
    pub address: String,
    /// Signal strength at discovery time.
    pub rssi: Option<i16>,
}

impl std::fmt::Display for PeripheralInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}]",
            self.name.as_deref().unwrap_or("(unnamed)"),
            self.address
        )
    }
}

/// A GATT service/characteristic pair offered by a connected peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceCharacteristic {
    /// Service UUID.
    pub service: Uuid,
    /// Characteristic UUID.
    pub characteristic: Uuid,
    /// Whether the characteristic supports notify or indicate.
    pub notifies: bool,
}

impl ServiceCharacteristic {
    /// Whether this is the Pico's observation characteristic.
    pub fn is_observer_stream(&self) -> bool {
        is_observer_stream(&self.service, &self.characteristic)
    }

    /// Selection key.
    pub fn key(&self) -> String {
        format!("{}/{}", self.service, self.characteristic)
    }
}

impl std::fmt::Display for ServiceCharacteristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.service, self.characteristic)?;
        if self.notifies {
            write!(f, " (notify)")?;
        }
        Ok(())
    }
}

/// The connection-level operations the session needs from a peripheral.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PeripheralLink: Send + Sync {
    /// Stable identifier.
    fn identifier(&self) -> String;

    /// Whether the peripheral reports an active connection.
    async fn is_connected(&self) -> Result<bool>;

    /// Open the connection and discover services.
    async fn connect(&self) -> Result<()>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;

    /// All service/characteristic pairs discovered on the peripheral.
    fn service_characteristic_pairs(&self) -> Vec<ServiceCharacteristic>;
}

#[async_trait]
impl PeripheralLink for Peripheral {
    fn identifier(&self) -> String {
        self.id().to_string()
    }

    async fn is_connected(&self) -> Result<bool> {
        ApiPeripheral::is_connected(self).await.map_err(Error::Bluetooth)
    }

    async fn connect(&self) -> Result<()> {
        ApiPeripheral::connect(self).await.map_err(Error::Bluetooth)?;
        self.discover_services().await.map_err(Error::Bluetooth)
    }

    async fn disconnect(&self) -> Result<()> {
        ApiPeripheral::disconnect(self).await.map_err(Error::Bluetooth)
    }

    fn service_characteristic_pairs(&self) -> Vec<ServiceCharacteristic> {
        let mut pairs: Vec<ServiceCharacteristic> = self
            .services()
            .into_iter()
            .flat_map(|service| {
                let service_uuid = service.uuid;
                service
                    .characteristics
                    .into_iter()
                    .map(move |characteristic| ServiceCharacteristic {
                        service: service_uuid,
                        characteristic: characteristic.uuid,
                        notifies: characteristic
                            .properties
                            .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE),
                    })
            })
            .collect();
        pairs.sort();
        pairs
    }
}
