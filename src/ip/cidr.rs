//! IPv4 interface address with prefix length.

use super::AddressError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// An interface address such as `10.0.1.1/24`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Cidr {
    address: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, AddressError> {
        if prefix > 32 {
            return Err(AddressError::InvalidCidr {
                value: format!("{}/{}", address, prefix),
                reason: "prefix cannot be higher than 32".to_string(),
            });
        }
        Ok(Self { address, prefix })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `other` falls inside this interface's subnet
    pub fn contains(&self, other: Ipv4Addr) -> bool {
        let mask = self.mask();
        u32::from(self.address) & mask == u32::from(other) & mask
    }

    fn mask(&self) -> u32 {
        if self.prefix == 0 {
            0
        } else {
            u32::MAX << (32 - u32::from(self.prefix))
        }
    }

    /// Highest usable host address of the subnet, the conventional gateway
    ///
    /// For `10.0.3.1/24` this is `10.0.3.254`. Point-to-point and host
    /// prefixes (/31, /32) have no spare address and return the address itself.
    pub fn last_host(&self) -> Ipv4Addr {
        if self.prefix >= 31 {
            return self.address;
        }
        let broadcast = u32::from(self.address) | !self.mask();
        Ipv4Addr::from(broadcast - 1)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix)
    }
}

impl FromStr for Ipv4Cidr {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| AddressError::InvalidCidr {
            value: s.to_string(),
            reason: reason.to_string(),
        };

        let (address, prefix) = match s.trim().split_once('/') {
            Some((address, prefix)) => (address, Some(prefix)),
            None => (s.trim(), None),
        };

        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| invalid("invalid IPv4 address"))?;

        // A missing prefix is read as a single host route
        let prefix: u8 = match prefix {
            Some(p) => p
                .parse()
                .map_err(|_| invalid("prefix is not a valid unsigned integer"))?,
            None => 32,
        };

        Ipv4Cidr::new(address, prefix).map_err(|_| invalid("prefix cannot be higher than 32"))
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}
