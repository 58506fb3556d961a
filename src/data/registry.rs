//! In-memory device registry.
//!
//! Aggregates decoded observations by address. The observation pipeline is
//! the only writer; the UI reads snapshots. All reads copy out of the lock so
//! callers never hold it across a redraw.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};

use super::device::{DeviceEntry, DeviceRecord, DeviceSummary};
use crate::config::HistoryRetention;
use crate::error::{Error, Result};
use crate::protocol::ObservationRecord;

/// Whether an upsert created a new device or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// First observation of this address.
    Inserted,
    /// The address was already known.
    Updated,
}

#[derive(Default)]
struct RegistryState {
    /// Addresses in first-seen order.
    order: Vec<String>,
    devices: HashMap<String, DeviceRecord>,
}

/// Registry of observed devices keyed by address.
pub struct DeviceRegistry {
    state: RwLock<RegistryState>,
    retention: HistoryRetention,
}

impl DeviceRegistry {
    /// Create an empty registry with the default retention policy.
    pub fn new() -> Self {
        Self::with_retention(HistoryRetention::default())
    }

    /// Create an empty registry with an explicit retention policy.
    pub fn with_retention(retention: HistoryRetention) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            retention,
        }
    }

    /// Insert or update the device for `record.address`.
    pub fn upsert(&self, record: ObservationRecord) -> UpsertOutcome {
        let ObservationRecord {
            name,
            address,
            rssi,
        } = record;

        let mut state = self.state.write();

        if let Some(device) = state.devices.get_mut(&address) {
            device.observe(name, rssi, self.retention);
            debug!(
                "Updated {}: rssi={} samples={}",
                address, rssi, device.samples_seen
            );
            return UpsertOutcome::Updated;
        }

        let ordinal = state.order.len() + 1;
        info!("New device {} ({}) as Device {}", address, name, ordinal);
        state.order.push(address.clone());
        state
            .devices
            .insert(address.clone(), DeviceRecord::new(address, name, ordinal, rssi));
        UpsertOutcome::Inserted
    }

    /// Known addresses with their names, in first-seen order.
    pub fn list_addresses(&self) -> Vec<DeviceEntry> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|address| state.devices.get(address))
            .map(|device| DeviceEntry {
                address: device.address.clone(),
                name: device.name.clone(),
            })
            .collect()
    }

    /// Snapshot of the RSSI history for `address`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAddress`] if the address was never observed.
    pub fn history(&self, address: &str) -> Result<Vec<i16>> {
        self.state
            .read()
            .devices
            .get(address)
            .map(|device| device.rssi_history.iter().copied().collect())
            .ok_or_else(|| Error::UnknownAddress {
                address: address.to_string(),
            })
    }

    /// Snapshot of the full record for `address`.
    pub fn record(&self, address: &str) -> Option<DeviceRecord> {
        self.state.read().devices.get(address).cloned()
    }

    /// Whether `address` has been observed.
    pub fn contains(&self, address: &str) -> bool {
        self.state.read().devices.contains_key(address)
    }

    /// Number of distinct devices observed.
    pub fn len(&self) -> usize {
        self.state.read().order.len()
    }

    /// Whether no device has been observed yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The retention policy in effect.
    pub fn retention(&self) -> HistoryRetention {
        self.retention
    }

    /// One summary row per device, in label order.
    pub fn summary(&self) -> Vec<DeviceSummary> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|address| state.devices.get(address))
            .filter_map(|device| {
                Some(DeviceSummary {
                    label: device.label.clone(),
                    address: device.address.clone(),
                    rssi: device.latest_rssi()?,
                    seen: device.samples_seen,
                })
            })
            .collect()
    }

    /// Render the device table the way the Pico prints it to its console.
    pub fn format_device_table(&self) -> String {
        let rule = "-".repeat(50);
        let mut out = String::new();
        out.push('\n');
        out.push_str(&rule);
        out.push('\n');
        for row in self.summary() {
            out.push_str(&row.to_string());
            out.push('\n');
        }
        out.push_str(&rule);
        out.push('\n');
        out
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const A: &str = "AA:BB:CC:DD:EE:FF";
    const B: &str = "11:22:33:44:55:66";

    #[test]
    fn test_upsert_creates_then_appends() {
        let registry = DeviceRegistry::new();
        assert_eq!(
            registry.upsert(ObservationRecord::new("Beacon1", A, -42)),
            UpsertOutcome::Inserted
        );
        assert_eq!(
            registry.upsert(ObservationRecord::new("Beacon1", A, -50)),
            UpsertOutcome::Updated
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.history(A).unwrap(), vec![-42, -50]);
        assert_eq!(
            registry.list_addresses(),
            vec![DeviceEntry {
                address: A.into(),
                name: "Beacon1".into()
            }]
        );
    }

    #[test]
    fn test_name_is_overwritten() {
        let registry = DeviceRegistry::new();
        registry.upsert(ObservationRecord::new("first", A, -1));
        registry.upsert(ObservationRecord::new("second", A, -2));
        assert_eq!(registry.record(A).unwrap().name, "second");
    }

    #[test]
    fn test_interleaved_histories_keep_arrival_order() {
        let registry = DeviceRegistry::new();
        let mut expected_a = Vec::new();
        let mut expected_b = Vec::new();

        for i in 0..10i16 {
            registry.upsert(ObservationRecord::new("a", A, -i));
            expected_a.push(-i);
            if i % 3 == 0 {
                registry.upsert(ObservationRecord::new("b", B, -100 + i));
                expected_b.push(-100 + i);
            }
        }

        assert_eq!(registry.history(A).unwrap(), expected_a);
        assert_eq!(registry.history(B).unwrap(), expected_b);
        assert_eq!(registry.record(A).unwrap().samples_seen, 10);
        assert_eq!(registry.record(B).unwrap().samples_seen, 4);
    }

    #[test]
    fn test_list_addresses_first_seen_order() {
        let registry = DeviceRegistry::new();
        registry.upsert(ObservationRecord::new("b", B, -1));
        registry.upsert(ObservationRecord::new("a", A, -1));
        registry.upsert(ObservationRecord::new("b", B, -2));

        let addresses: Vec<_> = registry
            .list_addresses()
            .into_iter()
            .map(|e| e.address)
            .collect();
        assert_eq!(addresses, vec![B.to_string(), A.to_string()]);
    }

    #[test]
    fn test_unknown_address() {
        let registry = DeviceRegistry::new();
        let err = registry.history(A).unwrap_err();
        assert!(matches!(err, Error::UnknownAddress { address } if address == A));
        assert!(registry.record(A).is_none());
        assert!(!registry.contains(A));
    }

    #[test]
    fn test_capped_registry() {
        let registry = DeviceRegistry::with_retention(HistoryRetention::Capped(3));
        for rssi in 0..5 {
            registry.upsert(ObservationRecord::new("a", A, -rssi));
        }
        assert_eq!(registry.history(A).unwrap(), vec![-2, -3, -4]);
        assert_eq!(registry.record(A).unwrap().samples_seen, 5);
    }

    #[test]
    fn test_summary_and_table() {
        let registry = DeviceRegistry::new();
        registry.upsert(ObservationRecord::new("a", A, -40));
        registry.upsert(ObservationRecord::new("b", B, -70));
        registry.upsert(ObservationRecord::new("a", A, -45));

        let summary = registry.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].label, "Device 1");
        assert_eq!(summary[0].rssi, -45);
        assert_eq!(summary[0].seen, 2);
        assert_eq!(summary[1].label, "Device 2");

        let table = registry.format_device_table();
        assert!(table.contains("Device 1 | MAC: AA:BB:CC:DD:EE:FF | RSSI: -45 | Seen: 2x"));
        assert!(table.contains("Device 2 | MAC: 11:22:33:44:55:66 | RSSI: -70 | Seen: 1x"));
    }

    #[test]
    fn test_concurrent_reader_and_writer() {
        let registry = Arc::new(DeviceRegistry::with_retention(HistoryRetention::Unbounded));

        let writer = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                for i in 0..1000 {
                    registry.upsert(ObservationRecord::new("w", A, (i % 100) as i16));
                }
            })
        };

        let reader = {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let mut last_len = 0;
                for _ in 0..1000 {
                    if let Ok(history) = registry.history(A) {
                        assert!(history.len() >= last_len);
                        last_len = history.len();
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
        assert_eq!(registry.history(A).unwrap().len(), 1000);
    }
}
