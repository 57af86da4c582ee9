//! Deterministic address allocation.
//!
//! Addresses are pure functions of a 1-based index and the role of the
//! interface, so no central bookkeeping is needed to keep them unique:
//!
//! | Role                    | Pattern                 |
//! |-------------------------|-------------------------|
//! | Host MAC                | `00:04:00:00:00:<n>`    |
//! | Host IP                 | `10.0.<n>.1/24`         |
//! | Host gateway IP         | `10.0.<n>.254`          |
//! | Switch port facing host | `aa:00:00:00:<n>:<p>`   |
//! | Switch port facing peer | `aa:00:00:01:<s>:<p>`   |
//!
//! `n` is the host (and subnet) index, `p` the local port number and `s` the
//! index of the forwarding device owning a trunk port. Every variable part
//! occupies a single byte, so indices above [`MAX_INDEX`] cannot be encoded.

use super::{AddressError, Ipv4Cidr, MacAddr};
use std::net::Ipv4Addr;

/// Highest index that fits in the one free byte of each scheme
pub const MAX_INDEX: u32 = 255;

/// Prefix length of every per-host subnet
pub const HOST_PREFIX_LEN: u8 = 24;

const HOST_MAC_PREFIX: [u8; 5] = [0x00, 0x04, 0x00, 0x00, 0x00];
const SWITCH_PORT_MAC_PREFIX: [u8; 4] = [0xaa, 0x00, 0x00, 0x00];
const TRUNK_PORT_MAC_PREFIX: [u8; 4] = [0xaa, 0x00, 0x00, 0x01];

/// Validate a 1-based index and narrow it to the byte it is encoded in
fn index_byte(index: u32) -> Result<u8, AddressError> {
    if index == 0 {
        return Err(AddressError::InvalidIndex { index });
    }
    u8::try_from(index).map_err(|_| AddressError::AddressSpaceExhausted {
        index,
        max: MAX_INDEX,
    })
}

/// MAC address of the host with index `index`
pub fn host_mac(index: u32) -> Result<MacAddr, AddressError> {
    let n = index_byte(index)?;
    let [a, b, c, d, e] = HOST_MAC_PREFIX;
    Ok(MacAddr::new([a, b, c, d, e, n]))
}

/// Interface address of the host with index `index`, inside its own /24
pub fn host_ip(index: u32) -> Result<Ipv4Cidr, AddressError> {
    let n = index_byte(index)?;
    Ipv4Cidr::new(Ipv4Addr::new(10, 0, n, 1), HOST_PREFIX_LEN)
}

/// Conventional gateway address of the subnet with index `index`
pub fn gateway_ip(index: u32) -> Result<Ipv4Addr, AddressError> {
    let n = index_byte(index)?;
    Ok(Ipv4Addr::new(10, 0, n, 254))
}

/// MAC address of a forwarding-device port facing the host with index `peer_index`
pub fn switch_port_mac(peer_index: u32, port: u16) -> Result<MacAddr, AddressError> {
    let n = index_byte(peer_index)?;
    let p = index_byte(u32::from(port))?;
    let [a, b, c, d] = SWITCH_PORT_MAC_PREFIX;
    Ok(MacAddr::new([a, b, c, d, n, p]))
}

/// MAC address of a forwarding-device port facing another forwarding device
pub fn trunk_port_mac(switch_index: u32, port: u16) -> Result<MacAddr, AddressError> {
    let s = index_byte(switch_index)?;
    let p = index_byte(u32::from(port))?;
    let [a, b, c, d] = TRUNK_PORT_MAC_PREFIX;
    Ok(MacAddr::new([a, b, c, d, s, p]))
}

/// The full address set of one host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostAddressing {
    pub ip: Ipv4Cidr,
    pub mac: MacAddr,
    pub gateway: Ipv4Addr,
}

impl HostAddressing {
    pub fn for_index(index: u32) -> Result<Self, AddressError> {
        Ok(HostAddressing {
            ip: host_ip(index)?,
            mac: host_mac(index)?,
            gateway: gateway_ip(index)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_first_host_addresses() {
        assert_eq!(host_mac(1).unwrap().to_string(), "00:04:00:00:00:01");
        assert_eq!(host_ip(1).unwrap().to_string(), "10.0.1.1/24");
        assert_eq!(gateway_ip(1).unwrap(), Ipv4Addr::new(10, 0, 1, 254));
        assert_eq!(switch_port_mac(1, 1).unwrap().to_string(), "aa:00:00:00:01:01");
    }

    #[test]
    fn test_low_byte_is_hex_encoded() {
        assert_eq!(host_mac(10).unwrap().to_string(), "00:04:00:00:00:0a");
        assert_eq!(host_mac(255).unwrap().to_string(), "00:04:00:00:00:ff");
        assert_eq!(switch_port_mac(16, 2).unwrap().to_string(), "aa:00:00:00:10:02");
        assert_eq!(trunk_port_mac(1, 2).unwrap().to_string(), "aa:00:00:01:01:02");
    }

    #[test]
    fn test_index_bounds() {
        assert_eq!(host_mac(0), Err(AddressError::InvalidIndex { index: 0 }));
        assert_eq!(
            host_ip(256),
            Err(AddressError::AddressSpaceExhausted { index: 256, max: 255 })
        );
        assert!(gateway_ip(1000).is_err());
        assert!(switch_port_mac(1, 256).is_err());
        assert!(switch_port_mac(1, 0).is_err());
    }

    #[test]
    fn test_host_addresses_unique_over_range() {
        let mut macs = HashSet::new();
        let mut ips = HashSet::new();
        let mut gateways = HashSet::new();
        for n in 1..=MAX_INDEX {
            let addressing = HostAddressing::for_index(n).unwrap();
            assert!(macs.insert(addressing.mac), "duplicate MAC for index {}", n);
            assert!(ips.insert(addressing.ip.address()), "duplicate IP for index {}", n);
            assert!(gateways.insert(addressing.gateway), "duplicate gateway for index {}", n);
            assert!(addressing.ip.contains(addressing.gateway));
        }
    }

    #[test]
    fn test_allocation_is_deterministic() {
        for n in [1, 7, 128, 255] {
            assert_eq!(HostAddressing::for_index(n), HostAddressing::for_index(n));
            assert_eq!(switch_port_mac(n, 3), switch_port_mac(n, 3));
        }
    }

    #[test]
    fn test_switch_and_trunk_ports_never_collide() {
        let mut seen = HashSet::new();
        for n in 1..=MAX_INDEX {
            for p in [1u16, 2, 255] {
                assert!(seen.insert(switch_port_mac(n, p).unwrap()));
                assert!(seen.insert(trunk_port_mac(n, p).unwrap()));
            }
        }
        for n in 1..=MAX_INDEX {
            assert!(!seen.contains(&host_mac(n).unwrap()));
        }
    }
}
