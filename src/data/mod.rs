//! Observed-device data.
//!
//! Per-address records and the registry that accumulates them.

pub mod device;
pub mod registry;

pub use device::{DeviceEntry, DeviceRecord, DeviceSummary};
pub use registry::{DeviceRegistry, UpsertOutcome};
