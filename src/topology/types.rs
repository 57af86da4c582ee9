//! Topology type definitions.
//!
//! A [`Topology`] is the closed, validated set of devices and links of one
//! emulation run. It is produced by [`crate::topology::TopologyBuilder`] and
//! never mutated afterwards.

use crate::ip::{Ipv4Cidr, MacAddr};
use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// A node of the emulated network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: String,
    pub kind: DeviceKind,
}

/// What a device is, together with its per-kind configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceKind {
    /// A programmable forwarding engine (e.g. a BMv2 software switch)
    ForwardingDevice {
        /// Engine executable, either a name looked up in `PATH` or a path
        executable: String,
        /// Compiled forwarding-behavior artifact loaded by the engine
        control_config_path: PathBuf,
        /// Port of the engine's runtime configuration (Thrift) server
        control_port: u16,
        /// Numeric device id handed to the engine, in declaration order from 0
        engine_id: u32,
    },
    /// An end host with a single IP/MAC identity
    EndHost {
        ip: Ipv4Cidr,
        mac: MacAddr,
        /// Gateway used for the host's default route and static ARP entry
        gateway: Ipv4Addr,
    },
}

impl Device {
    pub fn is_forwarding_device(&self) -> bool {
        matches!(self.kind, DeviceKind::ForwardingDevice { .. })
    }

    pub fn is_host(&self) -> bool {
        matches!(self.kind, DeviceKind::EndHost { .. })
    }

    /// Control port of a forwarding device, `None` for hosts
    pub fn control_port(&self) -> Option<u16> {
        match self.kind {
            DeviceKind::ForwardingDevice { control_port, .. } => Some(control_port),
            DeviceKind::EndHost { .. } => None,
        }
    }
}

/// One end of a link: an attachment point on a device
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Port {
    pub device: String,
    pub number: u16,
    /// MAC address assigned to the interface, if any
    pub mac: Option<MacAddr>,
    /// Interface name as seen by the virtualization runtime
    pub interface: String,
}

impl Port {
    /// Interface name qualified with its device, e.g. `h1-eth0`
    pub fn interface_label(&self) -> String {
        match self.interface.strip_prefix(self.device.as_str()) {
            Some(rest) if rest.starts_with('-') => self.interface.clone(),
            _ => format!("{}-{}", self.device, self.interface),
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.number)
    }
}

/// An undirected edge between two ports
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Link {
    pub a: Port,
    pub b: Port,
}

impl Link {
    pub fn endpoints(&self) -> [&Port; 2] {
        [&self.a, &self.b]
    }

    pub fn touches(&self, device: &str) -> bool {
        self.a.device == device || self.b.device == device
    }

    /// The endpoint of this link on `device`
    pub fn endpoint_on(&self, device: &str) -> Option<&Port> {
        self.endpoints().into_iter().find(|p| p.device == device)
    }

    /// The endpoint opposite to `device`
    pub fn peer_of(&self, device: &str) -> Option<&Port> {
        if self.a.device == device {
            Some(&self.b)
        } else if self.b.device == device {
            Some(&self.a)
        } else {
            None
        }
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {}", self.a, self.b)
    }
}

/// The finished set of devices and links describing one emulation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub(crate) devices: Vec<Device>,
    pub(crate) links: Vec<Link>,
}

impl Topology {
    /// All devices in declaration order
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// All links in declaration order
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn device(&self, id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == id)
    }

    pub fn forwarding_devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_forwarding_device())
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Device> {
        self.devices.iter().filter(|d| d.is_host())
    }

    /// Links incident to `device`, in declaration order
    pub fn links_of<'a>(&'a self, device: &'a str) -> impl Iterator<Item = &'a Link> + 'a {
        self.links.iter().filter(move |l| l.touches(device))
    }

    /// Ports of `device`, sorted by port number
    pub fn ports_of(&self, device: &str) -> Vec<&Port> {
        let mut ports: Vec<&Port> = self
            .links
            .iter()
            .filter_map(|l| l.endpoint_on(device))
            .collect();
        ports.sort_by_key(|p| p.number);
        ports
    }

    /// First link of `host`, returned as (host side, peer side)
    pub fn uplink(&self, host: &str) -> Option<(&Port, &Port)> {
        let link = self.links.iter().find(|l| l.touches(host))?;
        Some((link.endpoint_on(host)?, link.peer_of(host)?))
    }
}

#[cfg(test)]
mod tests {
    use crate::topology::{build_shape, EngineParams, Shape};
    use std::path::PathBuf;

    fn chained() -> super::Topology {
        build_shape(
            &Shape::Chained,
            &EngineParams {
                executable: "simple_switch".to_string(),
                control_config_path: PathBuf::from("build/basic.json"),
                base_control_port: 9090,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_port_queries_outlive_the_device_name() {
        let topology = chained();

        // The results borrow the topology only, not the id they were looked up with
        let ports = topology.ports_of(&format!("r{}", 2));
        let (local, peer) = topology.uplink(&String::from("h2")).unwrap();

        let numbers: Vec<u16> = ports.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(local.interface, "eth0");
        assert_eq!(peer.to_string(), "r2:2");
    }

    #[test]
    fn test_interface_label() {
        let topology = chained();
        let (local, peer) = topology.uplink("h1").unwrap();
        assert_eq!(local.interface_label(), "h1-eth0");
        assert_eq!(peer.interface_label(), "r1-eth1");
    }
}
