//! Host configuration commands.
//!
//! These are the opaque per-host operations issued after the network is
//! live. Each one expands to the command lines run inside the host.

use super::types::Argv;
use crate::ip::MacAddr;
use std::fmt;
use std::net::Ipv4Addr;

/// A configuration command run on an end host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCommand {
    /// Turn IPv6 off so the host emits no router solicitations or DAD probes
    DisableIpv6,
    /// Turn checksum and segmentation offloads off on `interface`
    DisableOffload { interface: String },
    /// Pre-seed a static neighbor-resolution entry
    SetArp {
        interface: String,
        ip: Ipv4Addr,
        mac: MacAddr,
    },
    /// Route all non-local traffic through `gateway` on `interface`
    SetDefaultRoute { interface: String, gateway: Ipv4Addr },
}

impl HostCommand {
    /// Command lines implementing this command, to be run in order
    pub fn argv_list(&self) -> Vec<Argv> {
        fn argv(parts: &[&str]) -> Argv {
            parts.iter().map(|s| s.to_string()).collect()
        }

        match self {
            HostCommand::DisableIpv6 => ["all", "default", "lo"]
                .iter()
                .map(|scope| {
                    argv(&[
                        "sysctl",
                        "-w",
                        &format!("net.ipv6.conf.{}.disable_ipv6=1", scope),
                    ])
                })
                .collect(),
            HostCommand::DisableOffload { interface } => ["rx", "tx", "sg"]
                .iter()
                .map(|offload| argv(&["ethtool", "--offload", interface, offload, "off"]))
                .collect(),
            HostCommand::SetArp { interface, ip, mac } => vec![argv(&[
                "arp",
                "-i",
                interface,
                "-s",
                &ip.to_string(),
                &mac.to_string(),
            ])],
            HostCommand::SetDefaultRoute { interface, gateway } => vec![argv(&[
                "ip",
                "route",
                "replace",
                "default",
                "dev",
                interface,
                "via",
                &gateway.to_string(),
            ])],
        }
    }
}

impl fmt::Display for HostCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostCommand::DisableIpv6 => write!(f, "disable IPv6"),
            HostCommand::DisableOffload { interface } => {
                write!(f, "disable offloads on {}", interface)
            }
            HostCommand::SetArp { ip, mac, .. } => write!(f, "set ARP {} -> {}", ip, mac),
            HostCommand::SetDefaultRoute { interface, gateway } => {
                write!(f, "set default route dev {} via {}", interface, gateway)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arp_and_route_command_lines() {
        let arp = HostCommand::SetArp {
            interface: "eth0".to_string(),
            ip: Ipv4Addr::new(10, 0, 1, 254),
            mac: "aa:00:00:00:01:01".parse().unwrap(),
        };
        assert_eq!(
            arp.argv_list(),
            vec![vec!["arp", "-i", "eth0", "-s", "10.0.1.254", "aa:00:00:00:01:01"]]
        );

        let route = HostCommand::SetDefaultRoute {
            interface: "eth0".to_string(),
            gateway: Ipv4Addr::new(10, 0, 1, 254),
        };
        assert_eq!(
            route.argv_list(),
            vec![vec!["ip", "route", "replace", "default", "dev", "eth0", "via", "10.0.1.254"]]
        );
        assert_eq!(route.to_string(), "set default route dev eth0 via 10.0.1.254");
    }

    #[test]
    fn test_host_preparation_expands_to_several_lines() {
        assert_eq!(HostCommand::DisableIpv6.argv_list().len(), 3);
        let offload = HostCommand::DisableOffload {
            interface: "eth0".to_string(),
        };
        let lines = offload.argv_list();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], vec!["ethtool", "--offload", "eth0", "rx", "off"]);
    }
}
