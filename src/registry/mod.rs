//! # Topology registry export
//!
//! Writes a JSON description of a topology so that control-plane scripts
//! can program the forwarding devices with the exact addresses of the
//! emulated network.
//!
//! ## Example
//!
//! ```json
//! {
//!   "switches": [
//!     {
//!       "id": "r1",
//!       "thrift_port": 9090,
//!       "device_id": 0,
//!       "json": "build/basic.json",
//!       "ports": [
//!         { "port": 1, "interface": "r1-eth1", "mac": "aa:00:00:00:01:01", "peer": "h1:1" }
//!       ]
//!     }
//!   ],
//!   "hosts": [
//!     {
//!       "id": "h1",
//!       "ip": "10.0.1.1/24",
//!       "mac": "00:04:00:00:00:01",
//!       "gateway": "10.0.1.254",
//!       "interfaces": ["eth0"]
//!     }
//!   ],
//!   "links": [ { "a": "h1:1", "b": "r1:1" } ]
//! }
//! ```

use crate::topology::{DeviceKind, Topology};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One port of a forwarding device
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub port: u16,
    pub interface: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
    /// Far end of the link, as `device:port`
    pub peer: String,
}

/// A forwarding device and its control endpoint
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SwitchInfo {
    pub id: String,
    pub thrift_port: u16,
    pub device_id: u32,
    pub json: String,
    pub ports: Vec<PortInfo>,
}

/// An end host and its addressing
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostInfo {
    pub id: String,
    pub ip: String,
    pub mac: String,
    pub gateway: String,
    pub interfaces: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub a: String,
    pub b: String,
}

/// Registry of every device, port and link of a topology
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyRegistry {
    pub switches: Vec<SwitchInfo>,
    pub hosts: Vec<HostInfo>,
    pub links: Vec<LinkInfo>,
}

impl TopologyRegistry {
    pub fn from_topology(topology: &Topology) -> Self {
        let mut registry = TopologyRegistry::default();

        for device in topology.devices() {
            match &device.kind {
                DeviceKind::ForwardingDevice {
                    control_config_path,
                    control_port,
                    engine_id,
                    ..
                } => {
                    let mut ports = topology
                        .links_of(&device.id)
                        .filter_map(|link| {
                            Some((link.endpoint_on(&device.id)?, link.peer_of(&device.id)?))
                        })
                        .map(|(local, peer)| PortInfo {
                            port: local.number,
                            interface: local.interface.clone(),
                            mac: local.mac.map(|m| m.to_string()),
                            peer: peer.to_string(),
                        })
                        .collect::<Vec<_>>();
                    ports.sort_by_key(|p| p.port);

                    registry.switches.push(SwitchInfo {
                        id: device.id.clone(),
                        thrift_port: *control_port,
                        device_id: *engine_id,
                        json: control_config_path.display().to_string(),
                        ports,
                    });
                }
                DeviceKind::EndHost { ip, mac, gateway } => {
                    registry.hosts.push(HostInfo {
                        id: device.id.clone(),
                        ip: ip.to_string(),
                        mac: mac.to_string(),
                        gateway: gateway.to_string(),
                        interfaces: topology
                            .links_of(&device.id)
                            .filter_map(|l| l.endpoint_on(&device.id))
                            .map(|p| p.interface.clone())
                            .collect(),
                    });
                }
            }
        }

        registry.links = topology
            .links()
            .iter()
            .map(|l| LinkInfo {
                a: l.a.to_string(),
                b: l.b.to_string(),
            })
            .collect();

        registry
    }

    /// Write the registry as pretty-printed JSON
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .wrap_err_with(|| format!("Failed to write topology registry '{}'", path.display()))?;
        info!("Wrote topology registry to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{build_shape, EngineParams, Shape};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn chained() -> Topology {
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
    fn test_registry_from_chained_topology() {
        let registry = TopologyRegistry::from_topology(&chained());

        assert_eq!(registry.switches.len(), 2);
        let r2 = &registry.switches[1];
        assert_eq!(r2.thrift_port, 9091);
        assert_eq!(r2.device_id, 1);
        assert_eq!(r2.ports.len(), 2);
        assert_eq!(r2.ports[0].peer, "r1:2");
        assert_eq!(r2.ports[1].peer, "h2:1");

        let h2 = &registry.hosts[1];
        assert_eq!(h2.ip, "10.0.2.1/24");
        assert_eq!(h2.gateway, "10.0.2.254");
        assert_eq!(h2.interfaces, vec!["eth0"]);
        assert_eq!(registry.links.len(), 3);
    }

    #[test]
    fn test_write_registry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("topology.json");
        let registry = TopologyRegistry::from_topology(&chained());
        registry.write(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: TopologyRegistry = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, registry);
    }
}
