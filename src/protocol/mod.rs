//! Wire formats.
//!
//! - Observation notifications sent by the Pico over BLE
//! - Line commands sent to the Pico over USB serial

pub mod command;
pub mod notification;

pub use command::PicoCommand;
pub use notification::ObservationRecord;
