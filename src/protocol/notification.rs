//! Observation notification decoding.
//!
//! The Pico firmware reports each advertiser it hears as a short
//! comma-separated text payload on the observer characteristic:
//!
//! ```text
//! <name>,<unused>,<address token>,<rssi>
//! ```
//!
//! The address token carries one leading delimiter character before the
//! 17-character MAC, e.g. `[AA:BB:CC:DD:EE:FF]`, or ` aa:bb:cc:dd:ee:ff)` when
//! the firmware prints a MicroPython `Device(ADDR_RANDOM, aa:bb:...)` value
//! whose embedded comma splits it across fields 1 and 2.

use crate::error::{Error, Result};

/// Byte range of the address inside the third field.
const ADDRESS_RANGE: std::ops::Range<usize> = 1..18;

/// Minimum number of comma-separated fields in a payload.
const MIN_FIELDS: usize = 4;

/// One decoded observation: a device the Pico saw and how strongly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ObservationRecord {
    /// Advertised name as reported by the firmware (may be `None` text).
    pub name: String,
    /// Device address, exactly as extracted from the payload.
    pub address: String,
    /// Signal strength in dBm.
    pub rssi: i16,
}

impl ObservationRecord {
    /// Create a new record.
    pub fn new(name: impl Into<String>, address: impl Into<String>, rssi: i16) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            rssi,
        }
    }

    /// Decode a raw notification payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedPayload`] if the payload is not UTF-8, has
    /// fewer than four fields, has an address field too short for the fixed
    /// address range, or has an RSSI that is not a signed 16-bit integer.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data)
            .map_err(|e| Error::malformed(format!("payload is not UTF-8: {}", e)))?;

        let fields: Vec<&str> = text.split(',').collect();
        if fields.len() < MIN_FIELDS {
            return Err(Error::malformed(format!(
                "expected at least {} fields, got {}",
                MIN_FIELDS,
                fields.len()
            )));
        }

        let address = fields[2].get(ADDRESS_RANGE).ok_or_else(|| {
            Error::malformed(format!(
                "address field {:?} is too short ({} bytes)",
                fields[2],
                fields[2].len()
            ))
        })?;

        let rssi_field = fields[3].trim();
        let rssi = rssi_field
            .parse::<i16>()
            .map_err(|e| Error::malformed(format!("invalid RSSI {:?}: {}", rssi_field, e)))?;

        Ok(Self {
            name: fields[0].to_string(),
            address: address.to_string(),
            rssi,
        })
    }

    /// Render this record in the bracketed payload form the decoder accepts.
    pub fn to_payload(&self) -> String {
        format!("{},-,[{}],{}", self.name, self.address, self.rssi)
    }
}

impl std::fmt::Display for ObservationRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Name: {}, Address: {}, RSSI: {}",
            self.name, self.address, self.rssi
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_decode_bracketed_address() {
        let record = ObservationRecord::decode(b"Beacon1,ignored,[AA:BB:CC:DD:EE:FF],-42").unwrap();
        assert_eq!(
            record,
            ObservationRecord::new("Beacon1", "AA:BB:CC:DD:EE:FF", -42)
        );
    }

    #[test]
    fn test_decode_micropython_device_repr() {
        // str(result.device) embeds a comma, shifting the MAC into field 2.
        let payload = b"None,Device(ADDR_RANDOM, 5e:11:22:33:44:55),-71";
        let record = ObservationRecord::decode(payload).unwrap();
        assert_eq!(record.name, "None");
        assert_eq!(record.address, "5e:11:22:33:44:55");
        assert_eq!(record.rssi, -71);
    }

    #[test]
    fn test_decode_trims_rssi_whitespace() {
        let record = ObservationRecord::decode(b"n,x,\"AA:BB:CC:DD:EE:FF\", -60\r\n").unwrap();
        assert_eq!(record.rssi, -60);
        assert_eq!(record.address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_decode_extra_fields_ignored() {
        let record = ObservationRecord::decode(b"n,x,[AA:BB:CC:DD:EE:FF],-1,extra").unwrap();
        assert_eq!(record.rssi, -1);
    }

    #[test]
    fn test_decode_too_few_fields() {
        let err = ObservationRecord::decode(b"Beacon1,ignored,[AA:BB:CC:DD:EE:FF]").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_decode_non_integer_rssi() {
        let err = ObservationRecord::decode(b"a,b,[AA:BB:CC:DD:EE:FF],strong").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_decode_rssi_out_of_range() {
        let err = ObservationRecord::decode(b"a,b,[AA:BB:CC:DD:EE:FF],99999").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_decode_short_address() {
        let err = ObservationRecord::decode(b"a,b,[AA:BB],-40").unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = ObservationRecord::decode(&[0xFF, 0xFE, b',', b',', b',']).unwrap_err();
        assert!(matches!(err, Error::MalformedPayload { .. }));
    }

    #[test]
    fn test_to_payload_decodes_back() {
        let record = ObservationRecord::new("Tag", "11:22:33:44:55:66", -88);
        let decoded = ObservationRecord::decode(record.to_payload().as_bytes()).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_display() {
        let record = ObservationRecord::new("Tag", "11:22:33:44:55:66", -88);
        assert_eq!(
            record.to_string(),
            "Name: Tag, Address: 11:22:33:44:55:66, RSSI: -88"
        );
    }

    proptest! {
        #[test]
        fn prop_decode_is_idempotent(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
            let first = ObservationRecord::decode(&payload);
            let second = ObservationRecord::decode(&payload);
            match (first, second) {
                (Ok(a), Ok(b)) => prop_assert_eq!(a, b),
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "decoder gave different outcomes for the same bytes"),
            }
        }

        #[test]
        fn prop_valid_payload_round_trips(
            name in "[A-Za-z0-9 _-]{0,12}",
            mac in "([0-9A-F]{2}:){5}[0-9A-F]{2}",
            rssi in any::<i16>(),
        ) {
            let payload = format!("{},ignored,[{}],{}", name, mac, rssi);
            let record = ObservationRecord::decode(payload.as_bytes()).unwrap();
            prop_assert_eq!(record.name, name);
            prop_assert_eq!(record.address, mac);
            prop_assert_eq!(record.rssi, rssi);
        }

        #[test]
        fn prop_fewer_than_four_fields_rejected(fields in proptest::collection::vec("[^,]{0,8}", 0..4)) {
            let payload = fields.join(",");
            prop_assert!(ObservationRecord::decode(payload.as_bytes()).is_err());
        }

        #[test]
        fn prop_non_integer_rssi_rejected(rssi in "[a-zA-Z]{1,6}") {
            let payload = format!("n,x,[AA:BB:CC:DD:EE:FF],{}", rssi);
            prop_assert!(ObservationRecord::decode(payload.as_bytes()).is_err());
        }
    }
}
