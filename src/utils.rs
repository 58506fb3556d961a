//! Utility functions for the pico-ble-observer crate.

use std::time::Duration;

/// Minimum and maximum of an RSSI series.
///
/// # Example
///
/// ```
/// use pico_ble_observer::rssi_bounds;
///
/// assert_eq!(rssi_bounds(&[-42, -50, -38]), Some((-50, -38)));
/// assert_eq!(rssi_bounds(&[]), None);
/// ```
pub fn rssi_bounds(samples: &[i16]) -> Option<(i16, i16)> {
    let min = samples.iter().copied().min()?;
    let max = samples.iter().copied().max()?;
    Some((min, max))
}

/// Format an elapsed duration as `HH:MM:SS`.
///
/// # Example
///
/// ```
/// use pico_ble_observer::format_elapsed;
/// use std::time::Duration;
///
/// assert_eq!(format_elapsed(Duration::from_secs(3725)), "01:02:05");
/// ```
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
