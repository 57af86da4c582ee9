//! Declarative topology descriptions, as written in run configuration files.

use crate::ip::{Ipv4Cidr, MacAddr};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;

/// A hand-written topology: explicit switches, hosts and links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyDecl {
    #[serde(default)]
    pub switches: Vec<SwitchDecl>,
    #[serde(default)]
    pub hosts: Vec<HostDecl>,
    #[serde(default)]
    pub links: Vec<LinkDecl>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchDecl {
    pub id: String,
    /// Defaults to the base control port plus the switch's position
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_port: Option<u16>,
    /// Defaults to the run's engine executable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executable: Option<String>,
    /// Defaults to the run's compiled artifact
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDecl {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<Ipv4Cidr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDecl {
    pub a: EndpointDecl,
    pub b: EndpointDecl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDecl {
    pub device: String,
    /// Defaults to the lowest free port of the device
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac: Option<MacAddr>,
}
