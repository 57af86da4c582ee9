//! Address ownership registry.
//!
//! Tracks which device (or device port) owns each MAC and IP address of a
//! topology, so explicitly supplied addresses cannot silently collide with
//! each other or with allocator-derived ones.

use super::MacAddr;
use std::collections::HashMap;
use std::net::Ipv4Addr;

/// Registry of every address assigned while building a topology
#[derive(Debug, Default, Clone)]
pub struct AddressRegistry {
    /// MAC -> owner description
    macs: HashMap<MacAddr, String>,
    /// IP -> owner description
    ips: HashMap<Ipv4Addr, String>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `mac` for `owner`.
    ///
    /// Registering the same address twice for the same owner is accepted;
    /// otherwise the current owner is returned as the error.
    pub fn register_mac(&mut self, mac: MacAddr, owner: &str) -> Result<(), String> {
        match self.macs.get(&mac) {
            Some(existing) if existing != owner => Err(existing.clone()),
            Some(_) => Ok(()),
            None => {
                self.macs.insert(mac, owner.to_string());
                Ok(())
            }
        }
    }

    /// Register `ip` for `owner`, with the same semantics as [`Self::register_mac`]
    pub fn register_ip(&mut self, ip: Ipv4Addr, owner: &str) -> Result<(), String> {
        match self.ips.get(&ip) {
            Some(existing) if existing != owner => Err(existing.clone()),
            Some(_) => Ok(()),
            None => {
                self.ips.insert(ip, owner.to_string());
                Ok(())
            }
        }
    }

    pub fn mac_owner(&self, mac: &MacAddr) -> Option<&str> {
        self.macs.get(mac).map(String::as_str)
    }

    pub fn ip_owner(&self, ip: &Ipv4Addr) -> Option<&str> {
        self.ips.get(ip).map(String::as_str)
    }

}
