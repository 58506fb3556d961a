//! Runtime configuration.
//!
//! Defaults match the Pico firmware (115200 baud, observer UUIDs, 5 s
//! scans). Override individual values with the `with_*` builders.

use std::time::Duration;

/// How much RSSI history is retained per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HistoryRetention {
    /// Keep every sample for the life of the process.
    Unbounded,
    /// Keep only the most recent `n` samples (ring buffer).
    Capped(usize),
}

impl HistoryRetention {
    /// Default number of samples kept per device.
    pub const DEFAULT_CAPACITY: usize = 10_000;

    /// The maximum number of samples retained, if any.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            Self::Unbounded => None,
            Self::Capped(n) => Some(*n),
        }
    }
}

impl Default for HistoryRetention {
    fn default() -> Self {
        Self::Capped(Self::DEFAULT_CAPACITY)
    }
}

/// Configuration for the observer.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObserverConfig {
    /// Serial baud rate used for the Pico.
    pub baud_rate: u32,
    /// Per-read timeout on the serial port.
    pub read_timeout: Duration,
    /// Delay between serial read attempts.
    pub poll_interval: Duration,
    /// Substrings that identify a Pico in a serial port description.
    pub port_markers: Vec<String>,
    /// USB vendor ids that identify a Pico.
    pub usb_vendor_ids: Vec<u16>,
    /// How long a BLE scan runs before results are collected.
    pub scan_duration: Duration,
    /// Capacity of the notification channel between the BLE session and the registry.
    pub notification_capacity: usize,
    /// RSSI history retention policy.
    pub history_retention: HistoryRetention,
    /// Maximum number of entries kept in the in-app event log.
    pub max_log_entries: usize,
}

impl ObserverConfig {
    /// Raspberry Pi Foundation USB vendor id.
    pub const RASPBERRY_PI_VID: u16 = 0x2E8A;

    /// Set the serial baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Set the serial read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the delay between serial reads.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the BLE scan duration.
    pub fn with_scan_duration(mut self, duration: Duration) -> Self {
        self.scan_duration = duration;
        self
    }

    /// Set the notification channel capacity (minimum 1).
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }

    /// Set the history retention policy.
    pub fn with_history_retention(mut self, retention: HistoryRetention) -> Self {
        self.history_retention = retention;
        self
    }

    /// Add a serial port description marker.
    pub fn with_port_marker(mut self, marker: impl Into<String>) -> Self {
        self.port_markers.push(marker.into());
        self
    }

    /// Set the event log capacity.
    pub fn with_max_log_entries(mut self, max: usize) -> Self {
        self.max_log_entries = max;
        self
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            read_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(100),
            port_markers: vec!["Pico".to_string(), "USB Serial Device".to_string()],
            usb_vendor_ids: vec![Self::RASPBERRY_PI_VID],
            scan_duration: Duration::from_millis(5000),
            notification_capacity: 256,
            history_retention: HistoryRetention::default(),
            max_log_entries: 500,
        }
    }
}
