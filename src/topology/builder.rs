//! Topology graph builder.
//!
//! Devices and links are added one at a time; every structural invariant is
//! checked as soon as the offending element is added, except connectivity,
//! which can only be judged once the caller calls [`TopologyBuilder::finalize`].
//!
//! Addresses left unspecified are filled in by [`crate::ip::allocator`]:
//!
//! - a host without explicit addresses gets the addressing of its 1-based
//!   position among the hosts added so far;
//! - a forwarding-device port facing a host gets `aa:00:00:00:<host>:<port>`;
//! - a forwarding-device port facing another forwarding device gets
//!   `aa:00:00:01:<switch>:<port>`.

use super::types::{Device, DeviceKind, Link, Port, Topology};
use super::TopologyError;
use crate::ip::{self, AddressRegistry, Ipv4Cidr, MacAddr};
use log::{debug, warn};
use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// Declaration of a forwarding device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingDeviceSpec {
    pub id: String,
    pub executable: String,
    pub control_config_path: PathBuf,
    pub control_port: u16,
}

/// Declaration of an end host; missing addresses are allocated
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSpec {
    pub id: String,
    pub ip: Option<Ipv4Cidr>,
    pub mac: Option<MacAddr>,
    pub gateway: Option<Ipv4Addr>,
}

impl HostSpec {
    /// A host whose addresses are all left to the allocator
    pub fn new(id: impl Into<String>) -> Self {
        HostSpec {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Explicit MAC addresses for the two ends of a link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacOverrides {
    pub a: Option<MacAddr>,
    pub b: Option<MacAddr>,
}

/// Per-device bookkeeping kept while building
#[derive(Debug, Clone)]
struct Slot {
    device: Device,
    /// 1-based index among devices of the same kind
    kind_index: u32,
    /// Number of links attached so far
    link_count: usize,
}

/// Incremental builder of a [`Topology`]
#[derive(Debug, Default, Clone)]
pub struct TopologyBuilder {
    slots: Vec<Slot>,
    lookup: HashMap<String, usize>,
    links: Vec<Link>,
    used_ports: HashSet<(String, u16)>,
    control_ports: HashMap<u16, String>,
    addresses: AddressRegistry,
    forwarding_count: u32,
    host_count: u32,
}

impl TopologyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_new_id(&self, id: &str) -> Result<(), TopologyError> {
        if id.trim().is_empty() {
            return Err(TopologyError::InvalidTopologySpec(
                "device id cannot be empty".to_string(),
            ));
        }
        if self.lookup.contains_key(id) {
            return Err(TopologyError::DuplicateDevice {
                device: id.to_string(),
            });
        }
        Ok(())
    }

    fn push(&mut self, device: Device, kind_index: u32) -> String {
        let id = device.id.clone();
        self.lookup.insert(id.clone(), self.slots.len());
        self.slots.push(Slot {
            device,
            kind_index,
            link_count: 0,
        });
        id
    }

    /// Add a forwarding device and return its id
    pub fn add_forwarding_device(
        &mut self,
        spec: ForwardingDeviceSpec,
    ) -> Result<String, TopologyError> {
        self.check_new_id(&spec.id)?;
        if spec.control_port == 0 {
            return Err(TopologyError::InvalidTopologySpec(format!(
                "control port of {} cannot be 0",
                spec.id
            )));
        }
        if let Some(existing) = self.control_ports.get(&spec.control_port) {
            return Err(TopologyError::DuplicateControlPort {
                port: spec.control_port,
                device: spec.id,
                existing: existing.clone(),
            });
        }

        self.control_ports.insert(spec.control_port, spec.id.clone());
        let engine_id = self.forwarding_count;
        let kind_index = engine_id + 1;
        self.forwarding_count = kind_index;

        debug!(
            "Adding forwarding device {} (control port {}, engine id {})",
            spec.id, spec.control_port, engine_id
        );
        let device = Device {
            id: spec.id,
            kind: DeviceKind::ForwardingDevice {
                executable: spec.executable,
                control_config_path: spec.control_config_path,
                control_port: spec.control_port,
                engine_id,
            },
        };
        Ok(self.push(device, kind_index))
    }

    /// Add an end host and return its id
    pub fn add_host(&mut self, spec: HostSpec) -> Result<String, TopologyError> {
        self.check_new_id(&spec.id)?;
        let index = self.host_count + 1;

        let address_error = |source| TopologyError::Address {
            device: spec.id.clone(),
            source,
        };
        let ip = match spec.ip {
            Some(ip) => ip,
            None => ip::host_ip(index).map_err(address_error)?,
        };
        let mac = match spec.mac {
            Some(mac) => mac,
            None => ip::host_mac(index).map_err(address_error)?,
        };
        let gateway = match (spec.gateway, spec.ip) {
            (Some(gateway), _) => gateway,
            (None, Some(ip)) => ip.last_host(),
            (None, None) => ip::gateway_ip(index).map_err(address_error)?,
        };

        if !ip.contains(gateway) {
            warn!("Gateway {} of {} lies outside {}", gateway, spec.id, ip);
        }

        // Validate everything before recording anything
        if let Some(existing) = self.addresses.ip_owner(&ip.address()) {
            return Err(TopologyError::DuplicateAddress {
                address: ip.address().to_string(),
                owner: spec.id,
                existing: existing.to_string(),
            });
        }
        if let Some(existing) = self.addresses.mac_owner(&mac) {
            return Err(TopologyError::DuplicateAddress {
                address: mac.to_string(),
                owner: spec.id,
                existing: existing.to_string(),
            });
        }
        self.addresses
            .register_ip(ip.address(), &spec.id)
            .map_err(|existing| TopologyError::DuplicateAddress {
                address: ip.address().to_string(),
                owner: spec.id.clone(),
                existing,
            })?;
        self.addresses
            .register_mac(mac, &spec.id)
            .map_err(|existing| TopologyError::DuplicateAddress {
                address: mac.to_string(),
                owner: spec.id.clone(),
                existing,
            })?;
        self.host_count = index;

        debug!("Adding host {} ({} / {}, gateway {})", spec.id, ip, mac, gateway);
        let device = Device {
            id: spec.id,
            kind: DeviceKind::EndHost { ip, mac, gateway },
        };
        Ok(self.push(device, index))
    }

    fn slot(&self, id: &str) -> Result<&Slot, TopologyError> {
        self.lookup
            .get(id)
            .map(|&i| &self.slots[i])
            .ok_or_else(|| TopologyError::UnknownDevice {
                device: id.to_string(),
            })
    }

    /// Lowest port number of `device` not yet claimed by a link
    pub fn next_free_port(&self, device: &str) -> Result<u16, TopologyError> {
        self.slot(device)?;
        (1..=u16::MAX)
            .find(|p| !self.used_ports.contains(&(device.to_string(), *p)))
            .ok_or_else(|| {
                TopologyError::InvalidTopologySpec(format!("device {} has no free port", device))
            })
    }

    /// Resolve the MAC and interface name of one end of a new link
    fn endpoint(
        &self,
        slot: &Slot,
        port: u16,
        mac_override: Option<MacAddr>,
        peer: &Slot,
    ) -> Result<Port, TopologyError> {
        let id = &slot.device.id;
        let (mac, interface) = match &slot.device.kind {
            DeviceKind::EndHost { mac, .. } => {
                if let Some(requested) = mac_override {
                    if requested != *mac {
                        return Err(TopologyError::InvalidTopologySpec(format!(
                            "host {} has MAC {}, its link cannot use {}",
                            id, mac, requested
                        )));
                    }
                }
                // Hosts see their interfaces as eth0, eth1, ... in link order
                (Some(*mac), format!("eth{}", slot.link_count))
            }
            DeviceKind::ForwardingDevice { .. } => {
                let mac = match mac_override {
                    Some(mac) => mac,
                    None if peer.device.is_host() => ip::switch_port_mac(peer.kind_index, port)
                        .map_err(|source| TopologyError::Address {
                            device: id.clone(),
                            source,
                        })?,
                    None => ip::trunk_port_mac(slot.kind_index, port).map_err(|source| {
                        TopologyError::Address {
                            device: id.clone(),
                            source,
                        }
                    })?,
                };
                (Some(mac), format!("{}-eth{}", id, port))
            }
        };

        Ok(Port {
            device: id.clone(),
            number: port,
            mac,
            interface,
        })
    }

    /// Connect `port_a` of `device_a` with `port_b` of `device_b`
    pub fn add_link(
        &mut self,
        device_a: &str,
        port_a: u16,
        device_b: &str,
        port_b: u16,
        overrides: MacOverrides,
    ) -> Result<Link, TopologyError> {
        let slot_a = self.slot(device_a)?;
        let slot_b = self.slot(device_b)?;

        if device_a == device_b {
            return Err(TopologyError::InvalidTopologySpec(format!(
                "loopback link on {} is not supported",
                device_a
            )));
        }
        for (device, port) in [(device_a, port_a), (device_b, port_b)] {
            if port == 0 {
                return Err(TopologyError::InvalidTopologySpec(format!(
                    "port numbers start at 1 (device {})",
                    device
                )));
            }
            if self.used_ports.contains(&(device.to_string(), port)) {
                return Err(TopologyError::DuplicatePort {
                    device: device.to_string(),
                    port,
                });
            }
        }

        let a = self.endpoint(slot_a, port_a, overrides.a, slot_b)?;
        let b = self.endpoint(slot_b, port_b, overrides.b, slot_a)?;

        // Host MACs are registered with the host itself
        let mut pending: Vec<(MacAddr, String)> = Vec::new();
        for (port, slot) in [(&a, slot_a), (&b, slot_b)] {
            if !slot.device.is_forwarding_device() {
                continue;
            }
            if let Some(mac) = port.mac {
                let owner = format!("{} port {}", port.device, port.number);
                if let Some(existing) = self.addresses.mac_owner(&mac) {
                    if existing != owner {
                        return Err(TopologyError::DuplicateAddress {
                            address: mac.to_string(),
                            owner,
                            existing: existing.to_string(),
                        });
                    }
                }
                if pending.iter().any(|(m, _)| *m == mac) {
                    return Err(TopologyError::DuplicateAddress {
                        address: mac.to_string(),
                        owner,
                        existing: format!("{} port {}", a.device, a.number),
                    });
                }
                pending.push((mac, owner));
            }
        }
        for (mac, owner) in pending {
            self.addresses
                .register_mac(mac, &owner)
                .map_err(|existing| TopologyError::DuplicateAddress {
                    address: mac.to_string(),
                    owner: owner.clone(),
                    existing,
                })?;
        }

        self.used_ports.insert((device_a.to_string(), port_a));
        self.used_ports.insert((device_b.to_string(), port_b));
        for id in [device_a, device_b] {
            let index = self.lookup[id];
            self.slots[index].link_count += 1;
        }

        let link = Link { a, b };
        debug!("Adding link {}", link);
        self.links.push(link.clone());
        Ok(link)
    }

    /// Validate connectivity and return the finished topology.
    ///
    /// The builder is left untouched, so repeated calls return equal values.
    pub fn finalize(&self) -> Result<Topology, TopologyError> {
        if let Some(slot) = self.slots.iter().find(|s| s.link_count == 0) {
            return Err(TopologyError::DisconnectedDevice {
                device: slot.device.id.clone(),
            });
        }

        Ok(Topology {
            devices: self.slots.iter().map(|s| s.device.clone()).collect(),
            links: self.links.clone(),
        })
    }
}
