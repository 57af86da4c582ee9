//! # p4topo - emulated networks around P4 software switches
//!
//! This library builds emulated networks of end hosts and programmable
//! forwarding devices (BMv2 `simple_switch` and compatible engines), wires
//! them together with virtual links and configures the hosts so that
//! their traffic reaches the switches.
//!
//! ## Architecture
//!
//! - `ip`: deterministic MAC/IP allocation and address types
//! - `topology`: topology data model, builder and shapes
//! - `process`: engine command lines and host configuration commands
//! - `realizer`: instantiation of a topology on a virtual-networking runtime
//! - `configurator`: post-start host configuration (ARP, default routes)
//! - `orchestrator`: lifecycle of one emulation run
//! - `registry`: JSON export of the realized addressing
//! - `config`, `config_loader`: run configuration from YAML and flags
//! - `utils`: executable resolution
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use p4topo::realizer::{DryRunRunner, NetnsRuntime, NetworkRealizer};
//! use p4topo::topology::{build_shape, EngineParams, Shape};
//! use p4topo::process::EngineOptions;
//! use std::time::Duration;
//!
//! let topology = build_shape(
//!     &Shape::FanOut { hosts: 3 },
//!     &EngineParams {
//!         executable: "simple_switch".to_string(),
//!         control_config_path: "build/basic.json".into(),
//!         base_control_port: 9090,
//!     },
//! )?;
//!
//! let runtime = NetnsRuntime::new(DryRunRunner::new(), EngineOptions::default(), Duration::from_secs(5));
//! let realizer = NetworkRealizer::new(runtime);
//! let mut live = realizer.start(topology)?;
//! realizer.stop(&mut live);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Error Handling
//!
//! Each module reports its own `thiserror` error type naming the offending
//! device, port or link. The binary and the orchestrator wrap them with
//! `color_eyre` context.

pub mod config;
pub mod config_loader;
pub mod configurator;
pub mod ip;
pub mod orchestrator;
pub mod process;
pub mod realizer;
pub mod registry;
pub mod topology;
pub mod utils;
