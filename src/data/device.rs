//! Per-device observation data.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

use crate::config::HistoryRetention;

/// Everything known about one observed device address.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceRecord {
    /// Device address (unique key).
    pub address: String,

    /// Most recently reported name.
    pub name: String,

    /// Ordinal label assigned in first-seen order ("Device 1", "Device 2", ...).
    pub label: String,

    /// RSSI samples in arrival order, subject to the retention policy.
    pub rssi_history: VecDeque<i16>,

    /// Number of notifications decoded for this address.
    pub samples_seen: u64,

    /// When this address was first observed.
    pub first_seen: DateTime<Utc>,

    /// When this address was last observed.
    pub last_seen: DateTime<Utc>,
}

impl DeviceRecord {
    /// Create a record from its first observation.
    pub fn new(address: String, name: String, ordinal: usize, rssi: i16) -> Self {
        let now = Utc::now();
        Self {
            address,
            name,
            label: format!("Device {}", ordinal),
            rssi_history: VecDeque::from([rssi]),
            samples_seen: 1,
            first_seen: now,
            last_seen: now,
        }
    }

    /// Record a new observation, trimming history to the retention policy.
    pub fn observe(&mut self, name: String, rssi: i16, retention: HistoryRetention) {
        self.name = name;
        self.rssi_history.push_back(rssi);
        self.samples_seen += 1;
        self.last_seen = Utc::now();

        if let Some(capacity) = retention.capacity() {
            // A zero capacity still keeps the latest sample.
            let capacity = capacity.max(1);
            while self.rssi_history.len() > capacity {
                self.rssi_history.pop_front();
            }
        }
    }

    /// The most recent RSSI sample.
    pub fn latest_rssi(&self) -> Option<i16> {
        self.rssi_history.back().copied()
    }
}

/// An address with its display name, as shown in the device selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceEntry {
    /// Device address.
    pub address: String,
    /// Most recently reported name.
    pub name: String,
}

impl std::fmt::Display for DeviceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.address, self.name)
    }
}

/// One row of the device table: label, address, latest RSSI and sighting count.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceSummary {
    /// Ordinal label.
    pub label: String,
    /// Device address.
    pub address: String,
    /// Latest RSSI sample.
    pub rssi: i16,
    /// Number of times the device was seen.
    pub seen: u64,
}

impl std::fmt::Display for DeviceSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} | MAC: {} | RSSI: {} | Seen: {}x",
            self.label, self.address, self.rssi, self.seen
        )
    }
}
