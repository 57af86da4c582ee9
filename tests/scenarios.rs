//! End-to-end scenarios: build, realize on a recording runtime, configure.

use p4topo::configurator::{Configurator, Delay, FailurePolicy};
use p4topo::ip::MacAddr;
use p4topo::process::HostCommand;
use p4topo::realizer::{NetworkRealizer, RealizationError, RuntimeError, VirtualRuntime};
use p4topo::topology::{
    build_shape, Device, EngineParams, ForwardingDeviceSpec, HostSpec, Link, MacOverrides, Shape,
    TopologyBuilder, TopologyError,
};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

/// Runtime keeping track of what is alive and of every host command
#[derive(Default)]
struct RecordingRuntime {
    alive: Mutex<HashSet<String>>,
    commands: Mutex<Vec<(String, HostCommand)>>,
    fail_launch: Option<String>,
    fail_exec: Option<String>,
}

impl RecordingRuntime {
    fn failing_launch(device: &str) -> Self {
        Self {
            fail_launch: Some(device.to_string()),
            ..Self::default()
        }
    }

    fn failing_exec(host: &str) -> Self {
        Self {
            fail_exec: Some(host.to_string()),
            ..Self::default()
        }
    }

    fn alive(&self) -> usize {
        self.alive.lock().unwrap().len()
    }

    fn commands_of(&self, host: &str) -> Vec<HostCommand> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c.clone())
            .collect()
    }
}

impl VirtualRuntime for RecordingRuntime {
    type Handle = String;

    fn launch(&self, device: &Device) -> Result<String, RuntimeError> {
        if self.fail_launch.as_deref() == Some(device.id.as_str()) {
            return Err(RuntimeError::Other("no more namespaces".to_string()));
        }
        self.alive.lock().unwrap().insert(device.id.clone());
        Ok(device.id.clone())
    }

    fn attach(&self, _link: &Link, _a: &String, _b: &String) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn detach(&self, _link: &Link, _a: &String, _b: &String) -> Result<(), RuntimeError> {
        Ok(())
    }

    fn shutdown(&self, device: &Device, _handle: &String) -> Result<(), RuntimeError> {
        self.alive.lock().unwrap().remove(&device.id);
        Ok(())
    }

    fn exec(&self, handle: &String, command: &HostCommand) -> Result<(), RuntimeError> {
        if self.fail_exec.as_ref() == Some(handle) {
            return Err(RuntimeError::Other(format!("{} is unreachable", handle)));
        }
        self.commands
            .lock()
            .unwrap()
            .push((handle.clone(), command.clone()));
        Ok(())
    }
}

fn engine() -> EngineParams {
    EngineParams {
        executable: "simple_switch".to_string(),
        control_config_path: PathBuf::from("build/basic.json"),
        base_control_port: 9090,
    }
}

fn switch(id: &str, control_port: u16) -> ForwardingDeviceSpec {
    ForwardingDeviceSpec {
        id: id.to_string(),
        executable: "simple_switch".to_string(),
        control_config_path: PathBuf::from("build/basic.json"),
        control_port,
    }
}

fn no_wait() -> Configurator<impl Delay> {
    Configurator::new(|_: Duration| {}).with_host_preparation(false)
}

#[test]
fn test_single_switch_host_gets_arp_and_route() {
    let topology = build_shape(&Shape::Fixed, &engine()).unwrap();
    assert_eq!(topology.forwarding_devices().count(), 1);
    assert_eq!(topology.hosts().count(), 1);
    assert_eq!(topology.links().len(), 1);

    let h1 = topology.device("h1").unwrap();
    match &h1.kind {
        p4topo::topology::DeviceKind::EndHost { ip, mac, gateway } => {
            assert_eq!(ip.to_string(), "10.0.1.1/24");
            assert_eq!(mac.to_string(), "00:04:00:00:00:01");
            assert_eq!(*gateway, Ipv4Addr::new(10, 0, 1, 254));
        }
        other => panic!("h1 is not a host: {:?}", other),
    }

    let realizer = NetworkRealizer::new(RecordingRuntime::default());
    let mut live = realizer.start(topology.clone()).unwrap();
    let report = no_wait().configure(&topology, &live, realizer.runtime());
    assert!(report.is_success());

    let gateway_mac: MacAddr = "aa:00:00:00:01:01".parse().unwrap();
    assert_eq!(
        realizer.runtime().commands_of("h1"),
        vec![
            HostCommand::SetArp {
                interface: "eth0".to_string(),
                ip: Ipv4Addr::new(10, 0, 1, 254),
                mac: gateway_mac,
            },
            HostCommand::SetDefaultRoute {
                interface: "eth0".to_string(),
                gateway: Ipv4Addr::new(10, 0, 1, 254),
            },
        ]
    );

    realizer.stop(&mut live);
    assert_eq!(realizer.runtime().alive(), 0);
}

#[test]
fn test_chained_switches() {
    let topology = build_shape(&Shape::Chained, &engine()).unwrap();

    let ports: Vec<u16> = topology
        .forwarding_devices()
        .filter_map(|d| d.control_port())
        .collect();
    assert_eq!(ports, vec![9090, 9091]);
    assert_eq!(topology.links().len(), 3);

    let trunks = topology
        .links()
        .iter()
        .filter(|l| l.a.device.starts_with('r') && l.b.device.starts_with('r'))
        .count();
    assert_eq!(trunks, 1);

    // Each host routes through its own switch
    let realizer = NetworkRealizer::new(RecordingRuntime::default());
    let live = realizer.start(topology.clone()).unwrap();
    let report = no_wait().configure(&topology, &live, realizer.runtime());
    assert_eq!(report.configured, vec!["h1", "h2"]);
    assert!(realizer
        .runtime()
        .commands_of("h2")
        .contains(&HostCommand::SetDefaultRoute {
            interface: "eth0".to_string(),
            gateway: Ipv4Addr::new(10, 0, 2, 254),
        }));
}

#[test]
fn test_chained_control_ports_must_differ() {
    let mut builder = TopologyBuilder::new();
    builder.add_forwarding_device(switch("r1", 9090)).unwrap();
    let err = builder.add_forwarding_device(switch("r2", 9090)).unwrap_err();
    assert!(matches!(
        err,
        TopologyError::DuplicateControlPort { port: 9090, ref device, .. } if device == "r2"
    ));
}

#[test]
fn test_launch_failure_leaves_nothing_running() {
    let topology = build_shape(&Shape::FanOut { hosts: 2 }, &engine()).unwrap();
    assert_eq!(topology.devices().len(), 3);

    // Devices are r1, h1, h2: the second one fails
    let realizer = NetworkRealizer::new(RecordingRuntime::failing_launch("h1"));
    let err = realizer.start(topology).unwrap_err();

    assert!(matches!(err, RealizationError::Launch { ref device, .. } if device == "h1"));
    assert_eq!(realizer.runtime().alive(), 0);
}

#[test]
fn test_disconnected_device_is_reported() {
    let mut builder = TopologyBuilder::new();
    let r1 = builder.add_forwarding_device(switch("r1", 9090)).unwrap();
    let h1 = builder.add_host(HostSpec::new("h1")).unwrap();
    builder.add_host(HostSpec::new("h2")).unwrap();
    builder
        .add_link(&h1, 1, &r1, 1, MacOverrides::default())
        .unwrap();

    assert_eq!(
        builder.finalize(),
        Err(TopologyError::DisconnectedDevice {
            device: "h2".to_string()
        })
    );
}

#[test]
fn test_fail_fast_over_recording_runtime() {
    let topology = build_shape(&Shape::FanOut { hosts: 3 }, &engine()).unwrap();
    let realizer = NetworkRealizer::new(RecordingRuntime::failing_exec("h2"));
    let mut live = realizer.start(topology.clone()).unwrap();

    let report = no_wait()
        .with_policy(FailurePolicy::FailFast)
        .configure(&topology, &live, realizer.runtime());
    assert_eq!(report.configured, vec!["h1".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].host(), "h2");
    assert_eq!(report.skipped, vec!["h3".to_string()]);
    assert!(realizer.runtime().commands_of("h3").is_empty());

    realizer.stop(&mut live);
    assert_eq!(realizer.runtime().alive(), 0);
}

#[test]
fn test_best_effort_over_recording_runtime() {
    let topology = build_shape(&Shape::FanOut { hosts: 3 }, &engine()).unwrap();
    let realizer = NetworkRealizer::new(RecordingRuntime::failing_exec("h2"));
    let live = realizer.start(topology.clone()).unwrap();

    let report = no_wait().configure(&topology, &live, realizer.runtime());
    assert_eq!(report.configured, vec!["h1".to_string(), "h3".to_string()]);
    assert_eq!(report.failures.len(), 1);
    assert!(report.skipped.is_empty());
}
