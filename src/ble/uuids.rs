//! BLE Service and Characteristic UUIDs.
//!
//! The Pico firmware registers one custom service with a single read/notify
//! characteristic that carries observation reports.

use uuid::Uuid;

/// Observer service UUID advertised by the Pico firmware.
pub const OBSERVER_SERVICE_UUID: Uuid = Uuid::from_u128(0xa9d6ede1_f904_4419_b4ea_02d9d5af1577);

/// Observer characteristic UUID (Read, Notify) carrying observation payloads.
pub const OBSERVER_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x497d8d32_1e96_42b9_8041_d3ee7acc24e0);

/// Name the Pico firmware advertises under.
pub const OBSERVER_ADVERTISED_NAME: &str = "mpy-temp";

/// Check if a service/characteristic pair is the Pico's observation stream.
pub fn is_observer_stream(service: &Uuid, characteristic: &Uuid) -> bool {
    *service == OBSERVER_SERVICE_UUID && *characteristic == OBSERVER_CHARACTERISTIC_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            OBSERVER_SERVICE_UUID.to_string(),
            "a9d6ede1-f904-4419-b4ea-02d9d5af1577"
        );
        assert_eq!(
            OBSERVER_CHARACTERISTIC_UUID.to_string(),
            "497d8d32-1e96-42b9-8041-d3ee7acc24e0"
        );
    }

    #[test]
    fn test_is_observer_stream() {
        assert!(is_observer_stream(
            &OBSERVER_SERVICE_UUID,
            &OBSERVER_CHARACTERISTIC_UUID
        ));
        assert!(!is_observer_stream(
            &OBSERVER_CHARACTERISTIC_UUID,
            &OBSERVER_SERVICE_UUID
        ));
    }
}
