//! Error types for the pico-ble-observer crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// No compatible serial device (Pico) was found.
    #[error("No Pico device detected on any serial port")]
    TransportUnavailable,

    /// A read or write on an open serial port failed.
    #[error("Serial I/O error: {0}")]
    TransportIo(#[from] std::io::Error),

    /// The serial port library reported an error (typically while opening).
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// No Bluetooth adapter is present on this system.
    #[error("No Bluetooth adapter available")]
    NoAdapter,

    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// A notification payload could not be decoded.
    #[error("Malformed payload: {context}")]
    MalformedPayload {
        /// Description of what was wrong with the payload.
        context: String,
    },

    /// A lookup was made for an address that has never been observed.
    #[error("Unknown address: {address}")]
    UnknownAddress {
        /// The address that was looked up.
        address: String,
    },

    /// Disconnecting failed in a way that is safe to ignore.
    #[error("Disconnect fault: {reason}")]
    DisconnectFault {
        /// What the peripheral reported.
        reason: String,
    },

    /// The requested peripheral is not known to the session.
    #[error("Peripheral not found: {identifier}")]
    PeripheralNotFound {
        /// The identifier that was searched for.
        identifier: String,
    },

    /// Operation requires a connection but none is open.
    #[error("Not connected")]
    NotConnected,

    /// A UI action needed a selected item but nothing was selected.
    #[error("Nothing selected: {what}")]
    NoSelection {
        /// The kind of item that should have been selected.
        what: &'static str,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// A supervised background task panicked or was aborted.
    #[error("Task '{name}' failed: {reason}")]
    TaskFailed {
        /// Name of the task.
        name: String,
        /// Why it ended.
        reason: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is benign and only worth a log line.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::DisconnectFault { .. })
    }

    pub(crate) fn malformed(context: impl Into<String>) -> Self {
        Self::MalformedPayload {
            context: context.into(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
