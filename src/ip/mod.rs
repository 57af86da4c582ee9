//! Address types and deterministic address allocation.
//!
//! Every address in an emulated topology is derived from a small index so
//! that data-plane table entries can be written ahead of time against the
//! exact MACs and IPs the network will use.

pub mod allocator;
pub mod cidr;
pub mod mac;
pub mod registry;

pub use allocator::{
    gateway_ip, host_ip, host_mac, switch_port_mac, trunk_port_mac, HostAddressing, MAX_INDEX,
};
pub use cidr::Ipv4Cidr;
pub use mac::MacAddr;
pub use registry::AddressRegistry;

/// Errors produced while parsing or allocating addresses
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("Address space exhausted: index {index} does not fit in one byte (max {max})")]
    AddressSpaceExhausted { index: u32, max: u32 },

    #[error("Invalid address index {index}: indices start at 1")]
    InvalidIndex { index: u32 },

    #[error("Invalid MAC address '{value}'")]
    InvalidMac { value: String },

    #[error("Invalid CIDR '{value}': {reason}")]
    InvalidCidr { value: String, reason: String },
}
