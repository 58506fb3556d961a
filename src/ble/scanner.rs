//! BLE adapter enumeration, timed scanning and link-loss watching.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{BoxStream, Stream, StreamExt};
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::ble::peripheral::{AdapterInfo, PeripheralInfo};
use crate::error::{Error, Result};
use crate::task::CancelFlag;

/// A peripheral handle with its description.
#[derive(Debug, Clone)]
pub struct DiscoveredPeripheral {
    /// What the UI shows.
    pub info: PeripheralInfo,
    /// The peripheral handle.
    pub peripheral: Peripheral,
}

/// Enumerate the system's BLE adapters.
///
/// # Errors
///
/// Returns [`Error::NoAdapter`] if the platform has none.
pub async fn list_adapters(manager: &Manager) -> Result<Vec<(AdapterInfo, Adapter)>> {
    let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;
    if adapters.is_empty() {
        return Err(Error::NoAdapter);
    }

    let mut out = Vec::with_capacity(adapters.len());
    for (index, adapter) in adapters.into_iter().enumerate() {
        let description = adapter
            .adapter_info()
            .await
            .unwrap_or_else(|_| "unknown adapter".to_string());
        debug!("Adapter {}: {}", index, description);
        out.push((AdapterInfo { index, description }, adapter));
    }

    Ok(out)
}

/// Scan on `adapter` for `duration`, then collect everything it saw.
pub async fn scan_for(adapter: &Adapter, duration: Duration) -> Result<Vec<DiscoveredPeripheral>> {
    info!("Scanning for {:?}", duration);

    adapter
        .start_scan(ScanFilter::default())
        .await
        .map_err(Error::Bluetooth)?;

    tokio::time::sleep(duration).await;

    if let Err(e) = adapter.stop_scan().await {
        debug!("Failed to stop scan: {}", e);
    }

    let peripherals = adapter.peripherals().await.map_err(Error::Bluetooth)?;

    let mut discovered = Vec::with_capacity(peripherals.len());
    for peripheral in peripherals {
        discovered.push(describe(peripheral).await);
    }

    info!("Scan finished: {} peripherals", discovered.len());
    Ok(discovered)
}

/// Read a peripheral's advertised properties.
async fn describe(peripheral: Peripheral) -> DiscoveredPeripheral {
    let identifier = peripheral.id().to_string();
    let properties = match peripheral.properties().await {
        Ok(properties) => properties,
        Err(e) => {
            trace!("Failed to read properties of {}: {}", identifier, e);
            None
        }
    };

    let info = PeripheralInfo {
        identifier,
        name: properties.as_ref().and_then(|p| p.local_name.clone()),
        address: peripheral.address().to_string(),
        rssi: properties.as_ref().and_then(|p| p.rssi),
    };

    DiscoveredPeripheral { info, peripheral }
}

/// Identifiers of peripherals the adapter reports as disconnected.
pub async fn disconnections(adapter: &Adapter) -> Result<BoxStream<'static, String>> {
    let events = adapter.events().await.map_err(Error::Bluetooth)?;

    Ok(events
        .filter_map(|event| async move {
            match event {
                CentralEvent::DeviceDisconnected(id) => Some(id.to_string()),
                _ => None,
            }
        })
        .boxed())
}

/// Route adapter disconnect reports until the stream ends or `cancel` fires.
///
/// `mark_lost` records the drop and says whether the link was up; only then
/// is `on_lost` told. Reports for peripherals we never connected are ignored.
pub(crate) async fn watch_links<S, L, F>(
    stream: S,
    mut mark_lost: L,
    mut on_lost: F,
    cancel: CancelFlag,
) -> Result<()>
where
    S: Stream<Item = String> + Send,
    L: FnMut(&str) -> bool + Send,
    F: FnMut(String) + Send,
{
    let mut stream = std::pin::pin!(stream);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = stream.next() => {
                let Some(identifier) = next else {
                    debug!("Adapter event stream ended");
                    break;
                };

                if mark_lost(&identifier) {
                    on_lost(identifier);
                } else {
                    trace!("Ignoring disconnect of {}", identifier);
                }
            }
        }
    }

    Ok(())
}
