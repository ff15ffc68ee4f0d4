// ── Core identity types ──
//
// DeviceAddress is the primary dedupe key of every device the bridge
// knows about. Its hex rendering doubles as the natural id exported on
// the capability bus.

use std::fmt;
use std::str::FromStr;

use meshbridge_api::IeeeAddress;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

// ── DeviceAddress ───────────────────────────────────────────────────

/// 64-bit IEEE address of a mesh device. Immutable once observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(u64);

impl DeviceAddress {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Stable external identifier: upper-case hex, no leading zeros.
    pub fn natural_id(self) -> String {
        format!("{:X}", self.0)
    }

    pub fn to_ieee(self) -> IeeeAddress {
        IeeeAddress(self.0)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

impl FromStr for DeviceAddress {
    type Err = CoreError;

    /// Accepts bare hex or a `0x`-prefixed form, any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if digits.is_empty() || digits.len() > 16 {
            return Err(CoreError::InvalidAddress {
                input: s.to_owned(),
            });
        }
        u64::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|_| CoreError::InvalidAddress {
                input: s.to_owned(),
            })
    }
}

impl From<IeeeAddress> for DeviceAddress {
    fn from(addr: IeeeAddress) -> Self {
        Self(addr.0)
    }
}

impl From<u64> for DeviceAddress {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn natural_id_is_unpadded_upper_hex() {
        let addr = DeviceAddress::new(0x0013_A200_1234_5678);
        assert_eq!(addr.natural_id(), "13A20012345678");
        assert_eq!(DeviceAddress::new(0xab).to_string(), "AB");
        assert_eq!(addr.natural_id().parse::<DeviceAddress>().unwrap(), addr);
    }

    #[test]
    fn parses_with_and_without_prefix() {
        let a: DeviceAddress = "0x0013a20012345678".parse().unwrap();
        let b: DeviceAddress = "0013A20012345678".parse().unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_u64(), 0x0013_A200_1234_5678);
    }

    #[test]
    fn rejects_garbage_and_overlong_input() {
        assert!("zz".parse::<DeviceAddress>().is_err());
        assert!("".parse::<DeviceAddress>().is_err());
        assert!("0x00112233445566778".parse::<DeviceAddress>().is_err());
    }

    #[test]
    fn serializes_as_natural_id_string() {
        let addr = DeviceAddress::new(0x0013_A200_1234_5678);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, "\"13A20012345678\"");
        let back: DeviceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn round_trips_through_ieee() {
        let ieee = IeeeAddress(42);
        assert_eq!(DeviceAddress::from(ieee).to_ieee(), ieee);
    }
}
