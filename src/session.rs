//! BLE session: adapters, scanning, connections and subscriptions.
//!
//! Peripherals found by a scan are kept by their platform identifier, so the
//! UI selects them by key rather than by list position.

use btleplug::api::Manager as _;
use btleplug::platform::{Adapter, Manager, Peripheral};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::ble::characteristics::{self, NotificationSubscription};
use crate::ble::connection::{ConnectionManager, ConnectionState, DisconnectOutcome};
use crate::ble::peripheral::{AdapterInfo, PeripheralInfo, PeripheralLink, ServiceCharacteristic};
use crate::ble::scanner;
use crate::config::ObserverConfig;
use crate::error::{Error, Result};
use crate::task::TaskHandle;

/// A scanned peripheral and its connection state.
struct KnownPeripheral {
    info: PeripheralInfo,
    connection: Arc<ConnectionManager<Peripheral>>,
}

/// Owns the BLE manager, the adapters and every scanned peripheral.
pub struct BleSession {
    /// Platform BLE manager.
    manager: Manager,
    /// Adapters from the last enumeration.
    adapters: RwLock<Vec<(AdapterInfo, Adapter)>>,
    /// Scanned peripherals by identifier, shared with the link watcher.
    peripherals: Arc<RwLock<HashMap<String, KnownPeripheral>>>,
    /// How long a scan runs.
    scan_duration: Duration,
    /// Notification channel capacity.
    notification_capacity: usize,
}

impl std::fmt::Debug for BleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleSession")
            .field("adapters", &self.adapters.read().len())
            .field("peripherals", &self.peripherals.read().len())
            .field("scan_duration", &self.scan_duration)
            .finish()
    }
}

impl BleSession {
    /// Create a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`] if the platform BLE stack is unavailable.
    pub async fn new(config: &ObserverConfig) -> Result<Self> {
        let manager = Manager::new().await.map_err(|e| {
            warn!("BLE manager unavailable: {}", e);
            Error::NoAdapter
        })?;

        Ok(Self {
            manager,
            adapters: RwLock::new(Vec::new()),
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            scan_duration: config.scan_duration,
            notification_capacity: config.notification_capacity,
        })
    }

    /// Enumerate adapters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoAdapter`] if there are none.
    pub async fn list_adapters(&self) -> Result<Vec<AdapterInfo>> {
        let adapters = scanner::list_adapters(&self.manager).await?;
        let infos = adapters.iter().map(|(info, _)| info.clone()).collect();
        *self.adapters.write() = adapters;
        Ok(infos)
    }

    /// Scan on the adapter at `adapter_index` for the configured duration.
    pub async fn scan(&self, adapter_index: usize) -> Result<Vec<PeripheralInfo>> {
        self.scan_for(adapter_index, self.scan_duration).await
    }

    /// Scan on the adapter at `adapter_index` for `duration`.
    ///
    /// Previously scanned peripherals that are still connected are kept.
    pub async fn scan_for(
        &self,
        adapter_index: usize,
        duration: Duration,
    ) -> Result<Vec<PeripheralInfo>> {
        let adapter = self.adapter(adapter_index)?;
        let discovered = scanner::scan_for(&adapter, duration).await?;

        let mut peripherals = self.peripherals.write();
        peripherals.retain(|_, known| known.connection.state() != ConnectionState::Disconnected);

        let mut infos = Vec::with_capacity(discovered.len());
        for found in discovered {
            infos.push(found.info.clone());
            peripherals
                .entry(found.info.identifier.clone())
                .or_insert_with(|| KnownPeripheral {
                    info: found.info,
                    connection: Arc::new(ConnectionManager::new(found.peripheral)),
                });
        }

        Ok(infos)
    }

    /// Description of a scanned peripheral.
    pub fn peripheral_info(&self, identifier: &str) -> Option<PeripheralInfo> {
        self.peripherals
            .read()
            .get(identifier)
            .map(|known| known.info.clone())
    }

    /// Connection state of a scanned peripheral.
    pub fn connection_state(&self, identifier: &str) -> Option<ConnectionState> {
        self.peripherals
            .read()
            .get(identifier)
            .map(|known| known.connection.state())
    }

    /// Connect to a scanned peripheral.
    pub async fn connect(&self, identifier: &str) -> Result<()> {
        let connection = self.connection(identifier)?;
        info!("Connecting to {}", identifier);
        connection.connect().await
    }

    /// Disconnect from a peripheral. Never fails; faults are logged and returned.
    pub async fn disconnect(&self, identifier: &str) -> DisconnectOutcome {
        match self.connection(identifier) {
            Ok(connection) => connection.disconnect().await,
            Err(e) => {
                let fault = Error::DisconnectFault {
                    reason: e.to_string(),
                };
                warn!("{}", fault);
                DisconnectOutcome::Faulted(fault)
            }
        }
    }

    /// Service/characteristic pairs of a connected peripheral.
    pub fn service_characteristic_pairs(
        &self,
        identifier: &str,
    ) -> Result<Vec<ServiceCharacteristic>> {
        let connection = self.connection(identifier)?;
        if !connection.is_connected() {
            return Err(Error::NotConnected);
        }

        let pairs = connection.peripheral().service_characteristic_pairs();
        debug!("{} offers {} characteristics", identifier, pairs.len());
        Ok(pairs)
    }

    /// Subscribe to notifications from `pair` on a connected peripheral.
    pub async fn subscribe(
        &self,
        identifier: &str,
        pair: ServiceCharacteristic,
    ) -> Result<NotificationSubscription> {
        let connection = self.connection(identifier)?;
        if !connection.is_connected() {
            return Err(Error::NotConnected);
        }

        info!("Subscribing to {} on {}", pair, identifier);
        characteristics::subscribe(connection.peripheral(), pair, self.notification_capacity).await
    }

    /// Watch the adapter at `adapter_index` for links that drop without a
    /// local disconnect.
    ///
    /// Each connected peripheral the adapter reports as gone is marked
    /// disconnected and its identifier handed to `on_lost`, on the watcher task.
    pub async fn watch_disconnections<F>(
        &self,
        adapter_index: usize,
        on_lost: F,
    ) -> Result<TaskHandle>
    where
        F: FnMut(String) + Send + 'static,
    {
        let adapter = self.adapter(adapter_index)?;
        let dropped = scanner::disconnections(&adapter).await?;
        let peripherals = self.peripherals.clone();

        Ok(TaskHandle::spawn(
            format!("link-watch:{}", adapter_index),
            move |cancel| {
                let mark_lost = move |identifier: &str| {
                    let connection = peripherals
                        .read()
                        .get(identifier)
                        .map(|known| known.connection.clone());
                    connection.map_or(false, |c| c.handle_disconnection())
                };
                scanner::watch_links(dropped, mark_lost, on_lost, cancel)
            },
        ))
    }

    /// Disconnect every connected peripheral.
    pub async fn shutdown(&self) {
        let connections: Vec<_> = self
            .peripherals
            .read()
            .values()
            .filter(|known| known.connection.is_connected())
            .map(|known| known.connection.clone())
            .collect();

        for connection in connections {
            let _ = connection.disconnect().await;
        }
    }

    fn adapter(&self, index: usize) -> Result<Adapter> {
        self.adapters
            .read()
            .iter()
            .find(|(info, _)| info.index == index)
            .map(|(_, adapter)| adapter.clone())
            .ok_or(Error::NoAdapter)
    }

    fn connection(&self, identifier: &str) -> Result<Arc<ConnectionManager<Peripheral>>> {
        self.peripherals
            .read()
            .get(identifier)
            .map(|known| known.connection.clone())
            .ok_or_else(|| Error::PeripheralNotFound {
                identifier: identifier.to_string(),
            })
    }
}
