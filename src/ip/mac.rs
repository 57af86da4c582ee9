//! Ethernet MAC address type.

use super::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet address, displayed as lowercase colon-separated hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddr(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

impl FromStr for MacAddr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AddressError::InvalidMac {
            value: s.to_string(),
        };

        let mut octets = [0u8; 6];
        let mut parts = s.trim().split(|c| c == ':' || c == '-');
        for octet in octets.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }

        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(MacAddr(octets))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let mac: MacAddr = "AA:00:00:00:01:0b".parse().unwrap();
        assert_eq!(mac.octets(), [0xaa, 0, 0, 0, 1, 0x0b]);
        assert_eq!(mac.to_string(), "aa:00:00:00:01:0b");

        let dashed: MacAddr = "00-04-00-00-00-01".parse().unwrap();
        assert_eq!(dashed.to_string(), "00:04:00:00:00:01");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "00:04:00:00:00", "00:04:00:00:00:01:02", "0:4:0:0:0:1", "zz:00:00:00:00:00"] {
            assert!(bad.parse::<MacAddr>().is_err(), "{} should be rejected", bad);
        }
    }
}
