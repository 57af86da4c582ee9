//! Process configuration module.
//!
//! This module builds the command lines the runtime executes: the
//! forwarding-engine invocation for each forwarding device and the
//! configuration commands issued on end hosts.

pub mod host;
pub mod switch;
pub mod types;

// Re-export commonly used items for convenience
pub use host::HostCommand;
pub use switch::{engine_argv, EngineOptions};
pub use types::{render, Argv};
