//! Forwarding-engine process configuration.
//!
//! Builds the command line of a BMv2-style software switch for one
//! forwarding device of a topology.
//!
//! ## Command line
//!
//! ```text
//! simple_switch -i 1@r1-eth1 -i 2@r1-eth2 \
//!     --thrift-port 9090 --nanolog ipc:///tmp/bm-9090-log.ipc --device-id 0 \
//!     build/basic.json [--log-console] [--pcap <dir>]
//! ```
//!
//! Every port of the device is bound to its kernel interface with
//! `-i <port>@<interface>`, in port order.

use super::types::Argv;
use crate::topology::{Device, DeviceKind, Topology};
use std::path::PathBuf;

/// Run-wide engine switches that are not part of the topology itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Forward engine logs to the console
    pub log_console: bool,
    /// Dump per-port packet captures into this directory
    pub pcap_dir: Option<PathBuf>,
}

/// Nanomsg logging socket of an engine instance.
///
/// Keyed by control port: launching refuses a port already in use, so no
/// two live engines on the machine share one.
pub fn nanolog_socket(control_port: u16) -> String {
    format!("ipc:///tmp/bm-{}-log.ipc", control_port)
}

/// Build the argument vector of the engine serving `device`.
///
/// `executable` is placed first verbatim, so it must be a path the OS can
/// spawn (see [`crate::utils::command_path`]). Returns `None` when `device`
/// is not a forwarding device.
pub fn engine_argv(
    topology: &Topology,
    device: &Device,
    executable: &str,
    options: &EngineOptions,
) -> Option<Argv> {
    let DeviceKind::ForwardingDevice {
        control_config_path,
        control_port,
        engine_id,
        ..
    } = &device.kind
    else {
        return None;
    };

    let mut argv = vec![executable.to_string()];
    for port in topology.ports_of(&device.id) {
        argv.push("-i".to_string());
        argv.push(format!("{}@{}", port.number, port.interface));
    }

    argv.push("--thrift-port".to_string());
    argv.push(control_port.to_string());
    argv.push("--nanolog".to_string());
    argv.push(nanolog_socket(*control_port));
    argv.push("--device-id".to_string());
    argv.push(engine_id.to_string());
    argv.push(control_config_path.display().to_string());

    if options.log_console {
        argv.push("--log-console".to_string());
    }
    if let Some(dir) = &options.pcap_dir {
        argv.push("--pcap".to_string());
        argv.push(dir.display().to_string());
    }

    Some(argv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{build_shape, EngineParams, Shape};

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
    fn test_engine_argv_binds_ports_in_order() {
        let topology = chained();
        let r2 = topology.device("r2").unwrap();
        let argv = engine_argv(&topology, r2, "/usr/bin/simple_switch", &EngineOptions::default())
            .unwrap();

        assert_eq!(
            argv,
            vec![
                "/usr/bin/simple_switch",
                "-i",
                "1@r2-eth1",
                "-i",
                "2@r2-eth2",
                "--thrift-port",
                "9091",
                "--nanolog",
                "ipc:///tmp/bm-9091-log.ipc",
                "--device-id",
                "1",
                "build/basic.json",
            ]
        );
    }

    #[test]
    fn test_engine_argv_options() {
        let topology = chained();
        let r1 = topology.device("r1").unwrap();
        let options = EngineOptions {
            log_console: true,
            pcap_dir: Some(PathBuf::from("/tmp/pcaps")),
        };
        let argv = engine_argv(&topology, r1, "simple_switch", &options).unwrap();
        assert!(argv.ends_with(&[
            "--log-console".to_string(),
            "--pcap".to_string(),
            "/tmp/pcaps".to_string()
        ]));
    }

    #[test]
    fn test_nanolog_socket_follows_control_port() {
        let this_run = chained();
        let other_run = build_shape(
            &Shape::Chained,
            &EngineParams {
                executable: "simple_switch".to_string(),
                control_config_path: PathBuf::from("build/basic.json"),
                base_control_port: 9190,
            },
        )
        .unwrap();

        let mut sockets = Vec::new();
        for topology in [&this_run, &other_run] {
            for device in topology.forwarding_devices() {
                let argv =
                    engine_argv(topology, device, "simple_switch", &EngineOptions::default())
                        .unwrap();
                let at = argv.iter().position(|a| a == "--nanolog").unwrap();
                sockets.push(argv[at + 1].clone());
            }
        }

        // Same engine ids in both runs, distinct sockets
        assert_eq!(
            sockets,
            vec![
                "ipc:///tmp/bm-9090-log.ipc",
                "ipc:///tmp/bm-9091-log.ipc",
                "ipc:///tmp/bm-9190-log.ipc",
                "ipc:///tmp/bm-9191-log.ipc",
            ]
        );
    }

    #[test]
    fn test_hosts_have_no_engine() {
        let topology = chained();
        let h1 = topology.device("h1").unwrap();
        assert!(engine_argv(&topology, h1, "simple_switch", &EngineOptions::default()).is_none());
    }
}
