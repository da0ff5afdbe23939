//! Normalized hardware address used as the device registry key.
//!
//! This module provides a compact 6-byte address representation that is
//! decoupled from any specific Bluetooth library. The canonical textual form
//! is twelve uppercase hex digits with separators stripped, matching the
//! identity format used in published reports.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// A beacon hardware address stored as a compact 6-byte array.
///
/// Provides cheap copying, hashing and ordering for use as a registry key,
/// while being independent of any specific Bluetooth library. The `Display`
/// form is the normalized identity: `AABBCCDDEEFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct DeviceId(pub [u8; 6]);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a device identity string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseDeviceIdError {
    #[error("invalid device id: expected 12 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid device id: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for DeviceId {
    /// Accepts `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` or bare `AABBCCDDEEFF`
    /// forms; separators are stripped and hex digits are case-insensitive.
    type Err = ParseDeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: Vec<char> = s.chars().filter(|c| *c != ':' && *c != '-').collect();
        if digits.len() != 12 {
            return Err(ParseDeviceIdError::InvalidLength(digits.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, chunk) in bytes.iter_mut().enumerate() {
            let part: String = digits[i * 2..i * 2 + 2].iter().collect();
            *chunk = u8::from_str_radix(&part, 16)
                .map_err(|_| ParseDeviceIdError::InvalidHex(part.clone()))?;
        }

        Ok(DeviceId(bytes))
    }
}

impl From<[u8; 6]> for DeviceId {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for DeviceId {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(feature = "bluer")]
impl From<DeviceId> for bluer::Address {
    fn from(id: DeviceId) -> Self {
        bluer::Address(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_normalized() {
        let id = DeviceId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", id), "AABBCCDDEEFF");
    }

    #[test]
    fn test_display_with_zeros() {
        let id = DeviceId([0x00, 0x01, 0x02, 0x03, 0x04, 0x05]);
        assert_eq!(format!("{}", id), "000102030405");
    }

    #[test]
    fn test_from_str_colon_separated() {
        let id: DeviceId = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(id.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_from_str_dash_separated_lowercase() {
        let id: DeviceId = "aa-bb-cc-dd-ee-ff".parse().unwrap();
        assert_eq!(id.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_from_str_bare_hex() {
        let id: DeviceId = "aabbccddeeff".parse().unwrap();
        assert_eq!(format!("{}", id), "AABBCCDDEEFF");
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(matches!(
            "invalid".parse::<DeviceId>(),
            Err(ParseDeviceIdError::InvalidLength(_))
        ));
        assert!(matches!(
            "AA:BB:CC".parse::<DeviceId>(),
            Err(ParseDeviceIdError::InvalidLength(6))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:GG".parse::<DeviceId>(),
            Err(ParseDeviceIdError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_ordering_is_byte_order() {
        let low = DeviceId([0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
        let high = DeviceId([0xFF, 0x00, 0x00, 0x00, 0x00, 0x00]);
        assert!(low < high);
    }

    #[test]
    fn test_hash_equality() {
        use std::collections::HashMap;

        let id1 = DeviceId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        let id2 = DeviceId([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

        let mut map = HashMap::new();
        map.insert(id1, "test");

        assert_eq!(map.get(&id2), Some(&"test"));
    }
}
