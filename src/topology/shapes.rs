//! Topology shapes.
//!
//! Every supported layout is expressed through the same builder primitives;
//! a shape only decides how many devices exist and which ports they meet on.

use super::builder::{ForwardingDeviceSpec, HostSpec, MacOverrides, TopologyBuilder};
use super::decl::TopologyDecl;
use super::types::Topology;
use super::TopologyError;
use crate::ip::MAX_INDEX;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Layout of the emulated network
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    /// One forwarding device `r1` with a single host `h1` on port 1
    #[default]
    Fixed,
    /// One forwarding device with `hosts` hosts, host `i` on port `i`
    FanOut { hosts: u32 },
    /// Two forwarding devices, each with one host, linked to each other
    Chained,
    /// A topology declared device by device
    Explicit(TopologyDecl),
}

impl Shape {
    pub fn name(&self) -> &'static str {
        match self {
            Shape::Fixed => "fixed",
            Shape::FanOut { .. } => "fan-out",
            Shape::Chained => "chained",
            Shape::Explicit(_) => "explicit",
        }
    }
}

/// Forwarding-engine settings shared by every forwarding device of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineParams {
    pub executable: String,
    pub control_config_path: PathBuf,
    pub base_control_port: u16,
}

impl EngineParams {
    fn switch(&self, id: &str, offset: u16) -> Result<ForwardingDeviceSpec, TopologyError> {
        let control_port = self.base_control_port.checked_add(offset).ok_or_else(|| {
            TopologyError::InvalidTopologySpec(format!(
                "control port {} + {} for {} is out of range",
                self.base_control_port, offset, id
            ))
        })?;
        Ok(ForwardingDeviceSpec {
            id: id.to_string(),
            executable: self.executable.clone(),
            control_config_path: self.control_config_path.clone(),
            control_port,
        })
    }
}

/// Build and finalize the topology described by `shape`
pub fn build_shape(shape: &Shape, engine: &EngineParams) -> Result<Topology, TopologyError> {
    let builder = match shape {
        Shape::Fixed => fan_out(1, engine)?,
        Shape::FanOut { hosts } => fan_out(*hosts, engine)?,
        Shape::Chained => chained(engine)?,
        Shape::Explicit(decl) => explicit(decl, engine)?,
    };

    let topology = builder.finalize()?;
    info!(
        "Built {} topology: {} forwarding devices, {} hosts, {} links",
        shape.name(),
        topology.forwarding_devices().count(),
        topology.hosts().count(),
        topology.links().len()
    );
    Ok(topology)
}

fn fan_out(hosts: u32, engine: &EngineParams) -> Result<TopologyBuilder, TopologyError> {
    if hosts == 0 {
        return Err(TopologyError::InvalidTopologySpec(
            "fan-out topology needs at least one host".to_string(),
        ));
    }
    if hosts > MAX_INDEX {
        return Err(TopologyError::Address {
            device: format!("h{}", hosts),
            source: crate::ip::AddressError::AddressSpaceExhausted {
                index: hosts,
                max: MAX_INDEX,
            },
        });
    }

    let mut builder = TopologyBuilder::new();
    let switch = builder.add_forwarding_device(engine.switch("r1", 0)?)?;
    for i in 1..=hosts {
        let host = builder.add_host(HostSpec::new(format!("h{}", i)))?;
        // Host index and switch port coincide, so the port fits in a byte
        builder.add_link(&host, 1, &switch, i as u16, MacOverrides::default())?;
    }
    Ok(builder)
}

fn chained(engine: &EngineParams) -> Result<TopologyBuilder, TopologyError> {
    let mut builder = TopologyBuilder::new();
    let r1 = builder.add_forwarding_device(engine.switch("r1", 0)?)?;
    let r2 = builder.add_forwarding_device(engine.switch("r2", 1)?)?;
    let h1 = builder.add_host(HostSpec::new("h1"))?;
    let h2 = builder.add_host(HostSpec::new("h2"))?;

    builder.add_link(&h1, 1, &r1, 1, MacOverrides::default())?;
    builder.add_link(&h2, 1, &r2, 2, MacOverrides::default())?;
    builder.add_link(&r1, 2, &r2, 1, MacOverrides::default())?;
    Ok(builder)
}

fn explicit(decl: &TopologyDecl, engine: &EngineParams) -> Result<TopologyBuilder, TopologyError> {
    let mut builder = TopologyBuilder::new();

    for (position, switch) in decl.switches.iter().enumerate() {
        let offset = u16::try_from(position).map_err(|_| {
            TopologyError::InvalidTopologySpec("too many forwarding devices".to_string())
        })?;
        let mut spec = engine.switch(&switch.id, offset)?;
        if let Some(port) = switch.control_port {
            spec.control_port = port;
        }
        if let Some(executable) = &switch.executable {
            spec.executable = executable.clone();
        }
        if let Some(json) = &switch.json {
            spec.control_config_path = json.clone();
        }
        builder.add_forwarding_device(spec)?;
    }

    for host in &decl.hosts {
        builder.add_host(HostSpec {
            id: host.id.clone(),
            ip: host.ip,
            mac: host.mac,
            gateway: host.gateway,
        })?;
    }

    for link in &decl.links {
        let port_a = match link.a.port {
            Some(port) => port,
            None => builder.next_free_port(&link.a.device)?,
        };
        let port_b = match link.b.port {
            Some(port) => port,
            None => builder.next_free_port(&link.b.device)?,
        };
        builder.add_link(
            &link.a.device,
            port_a,
            &link.b.device,
            port_b,
            MacOverrides {
                a: link.a.mac,
                b: link.b.mac,
            },
        )?;
    }

    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::decl::{EndpointDecl, HostDecl, LinkDecl, SwitchDecl};
    use crate::topology::DeviceKind;

    fn engine() -> EngineParams {
        EngineParams {
            executable: "simple_switch".to_string(),
            control_config_path: PathBuf::from("build/basic.json"),
            base_control_port: 9090,
        }
    }

    #[test]
    fn test_fixed_shape() {
        let topology = build_shape(&Shape::Fixed, &engine()).unwrap();
        assert_eq!(topology.forwarding_devices().count(), 1);
        assert_eq!(topology.hosts().count(), 1);
        assert_eq!(topology.links().len(), 1);

        let (host_port, gateway_port) = topology.uplink("h1").unwrap();
        assert_eq!(host_port.interface, "eth0");
        assert_eq!(gateway_port.device, "r1");
        assert_eq!(gateway_port.number, 1);
        assert_eq!(gateway_port.mac.unwrap().to_string(), "aa:00:00:00:01:01");
    }

    #[test]
    fn test_fan_out_round_trip() {
        for k in [1u32, 2, 5, 255] {
            let topology = build_shape(&Shape::FanOut { hosts: k }, &engine()).unwrap();
            assert_eq!(topology.hosts().count(), k as usize);
            assert_eq!(topology.links().len(), k as usize);

            for (i, host) in topology.hosts().enumerate() {
                let n = i + 1;
                match &host.kind {
                    DeviceKind::EndHost { ip, gateway, .. } => {
                        assert_eq!(ip.to_string(), format!("10.0.{}.1/24", n));
                        assert_eq!(gateway.to_string(), format!("10.0.{}.254", n));
                    }
                    other => panic!("unexpected kind {:?}", other),
                }
                let (_, switch_port) = topology.uplink(&host.id).unwrap();
                assert_eq!(switch_port.number as usize, n);
            }
        }
    }

    #[test]
    fn test_fan_out_bounds() {
        assert!(matches!(
            build_shape(&Shape::FanOut { hosts: 0 }, &engine()),
            Err(TopologyError::InvalidTopologySpec(_))
        ));
        assert!(matches!(
            build_shape(&Shape::FanOut { hosts: 256 }, &engine()),
            Err(TopologyError::Address { .. })
        ));
    }

    #[test]
    fn test_chained_shape() {
        let topology = build_shape(&Shape::Chained, &engine()).unwrap();
        let ports: Vec<_> = topology.forwarding_devices().map(|d| d.control_port()).collect();
        assert_eq!(ports, vec![Some(9090), Some(9091)]);
        assert_eq!(topology.links().len(), 3);

        let trunk = &topology.links()[2];
        assert_eq!((trunk.a.device.as_str(), trunk.a.number), ("r1", 2));
        assert_eq!((trunk.b.device.as_str(), trunk.b.number), ("r2", 1));

        let (_, gateway) = topology.uplink("h2").unwrap();
        assert_eq!(gateway.mac.unwrap().to_string(), "aa:00:00:00:02:02");
    }

    #[test]
    fn test_chained_control_port_overflow() {
        let mut params = engine();
        params.base_control_port = u16::MAX;
        assert!(matches!(
            build_shape(&Shape::Chained, &params),
            Err(TopologyError::InvalidTopologySpec(_))
        ));
    }

    #[test]
    fn test_explicit_shape_fills_gaps() {
        let decl = TopologyDecl {
            switches: vec![SwitchDecl {
                id: "s1".to_string(),
                control_port: None,
                executable: None,
                json: None,
            }],
            hosts: vec![
                HostDecl {
                    id: "client".to_string(),
                    ip: Some("192.168.7.10/24".parse().unwrap()),
                    mac: None,
                    gateway: None,
                },
                HostDecl {
                    id: "server".to_string(),
                    ip: None,
                    mac: None,
                    gateway: None,
                },
            ],
            links: vec![
                LinkDecl {
                    a: EndpointDecl { device: "client".to_string(), port: None, mac: None },
                    b: EndpointDecl { device: "s1".to_string(), port: None, mac: None },
                },
                LinkDecl {
                    a: EndpointDecl { device: "server".to_string(), port: None, mac: None },
                    b: EndpointDecl { device: "s1".to_string(), port: Some(7), mac: None },
                },
            ],
        };

        let topology = build_shape(&Shape::Explicit(decl), &engine()).unwrap();
        let client = topology.device("client").unwrap();
        match &client.kind {
            DeviceKind::EndHost { gateway, mac, .. } => {
                assert_eq!(gateway.to_string(), "192.168.7.254");
                assert_eq!(mac.to_string(), "00:04:00:00:00:01");
            }
            other => panic!("unexpected kind {:?}", other),
        }

        let (_, port) = topology.uplink("client").unwrap();
        assert_eq!(port.number, 1);
        let (_, port) = topology.uplink("server").unwrap();
        assert_eq!(port.number, 7);
        assert_eq!(port.mac.unwrap().to_string(), "aa:00:00:00:02:07");
    }
}
