//! Network topology module.
//!
//! This module contains the topology data model, the incremental builder
//! that enforces its invariants, and the shapes built on top of it.

pub mod builder;
pub mod decl;
pub mod shapes;
pub mod types;

pub use builder::{ForwardingDeviceSpec, HostSpec, MacOverrides, TopologyBuilder};
pub use decl::TopologyDecl;
pub use shapes::{build_shape, EngineParams, Shape};
pub use types::{Device, DeviceKind, Link, Port, Topology};

use crate::ip::AddressError;

/// Errors raised while building a topology.
///
/// All of them are detected before anything is realized and are fixed by
/// changing the input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    #[error("Invalid topology: {0}")]
    InvalidTopologySpec(String),

    #[error("Device {device} is declared twice")]
    DuplicateDevice { device: String },

    #[error("Control port {port} of {device} is already used by {existing}")]
    DuplicateControlPort {
        port: u16,
        device: String,
        existing: String,
    },

    #[error("Unknown device {device}")]
    UnknownDevice { device: String },

    #[error("Port {port} of {device} is already used by another link")]
    DuplicatePort { device: String, port: u16 },

    #[error("Address {address} of {owner} is already assigned to {existing}")]
    DuplicateAddress {
        address: String,
        owner: String,
        existing: String,
    },

    #[error("Device {device} has no links")]
    DisconnectedDevice { device: String },

    #[error("Cannot assign addresses to {device}: {source}")]
    Address {
        device: String,
        #[source]
        source: AddressError,
    },
}
