//! Linux network-namespace runtime.
//!
//! End hosts get their own network namespace; forwarding devices stay in
//! the root namespace and run the forwarding-engine executable bound to
//! their `<id>-eth<port>` interfaces. Links are veth pairs. Host-side ends
//! are created as `<host>-eth<k>`, moved into the host namespace and renamed
//! to `eth<k>` there.
//!
//! Every command goes through a [`CommandRunner`], so the whole plan can be
//! recorded instead of executed with [`DryRunRunner`].

use super::{RuntimeError, VirtualRuntime};
use crate::ip::{Ipv4Cidr, MacAddr};
use crate::process::{engine_argv, render, Argv, EngineOptions, HostCommand};
use crate::topology::{Device, DeviceKind, Link, Port, Topology};
use crate::utils::command_path;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// Interval between two probes of an engine's control port
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Host interface carrying the host's address
const PRIMARY_INTERFACE: &str = "eth0";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn argv(parts: &[&str]) -> Argv {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Executes the commands issued by [`NetnsRuntime`]
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, failing on a non-zero exit status
    fn run(&self, argv: &[String]) -> Result<(), RuntimeError>;

    /// Start a long-running process with its output sent to `log`.
    ///
    /// Returns `None` when no process was actually started.
    fn spawn(&self, argv: &[String], log: &Path) -> Result<Option<Child>, RuntimeError>;

    /// Whether commands are only recorded
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs commands on the local system
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String]) -> Result<(), RuntimeError> {
        let command = render(argv);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RuntimeError::Other("empty command".to_string()))?;
        debug!("Running: {}", command);

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| RuntimeError::Io {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RuntimeError::CommandFailed {
                command,
                status: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }

    fn spawn(&self, argv: &[String], log: &Path) -> Result<Option<Child>, RuntimeError> {
        let command = render(argv);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RuntimeError::Other("empty command".to_string()))?;
        let io_err = |source| RuntimeError::Io {
            command: command.clone(),
            source,
        };
        debug!("Spawning: {} (log: {})", command, log.display());

        let stdout = File::create(log).map_err(io_err)?;
        let stderr = stdout.try_clone().map_err(io_err)?;
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(io_err)?;
        Ok(Some(child))
    }
}

/// Records commands instead of running them
#[derive(Debug, Default)]
pub struct DryRunRunner {
    commands: Mutex<Vec<String>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every command issued so far, in order
    pub fn commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }
}

impl CommandRunner for DryRunRunner {
    fn run(&self, argv: &[String]) -> Result<(), RuntimeError> {
        let command = render(argv);
        info!("[dry-run] {}", command);
        lock(&self.commands).push(command);
        Ok(())
    }

    fn spawn(&self, argv: &[String], log: &Path) -> Result<Option<Child>, RuntimeError> {
        let command = format!("{} > {}", render(argv), log.display());
        info!("[dry-run] {}", command);
        lock(&self.commands).push(command);
        Ok(None)
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}

/// Handle of a device instantiated by [`NetnsRuntime`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetnsHandle {
    Host {
        id: String,
        namespace: String,
        ip: Ipv4Cidr,
    },
    Switch {
        id: String,
        control_port: u16,
    },
}

impl NetnsHandle {
    /// Prefix `command` so that it runs in this device's namespace
    fn in_namespace(&self, command: Argv) -> Argv {
        match self {
            NetnsHandle::Host { namespace, .. } => {
                let mut wrapped = argv(&["ip", "netns", "exec", namespace]);
                wrapped.extend(command);
                wrapped
            }
            NetnsHandle::Switch { .. } => command,
        }
    }
}

/// [`VirtualRuntime`] on Linux network namespaces and veth pairs
pub struct NetnsRuntime<Run: CommandRunner> {
    runner: Run,
    engine: EngineOptions,
    startup_timeout: Duration,
    log_dir: PathBuf,
    run_tag: String,
    engines: Mutex<HashMap<String, Child>>,
}

impl<Run: CommandRunner> NetnsRuntime<Run> {
    pub fn new(runner: Run, engine: EngineOptions, startup_timeout: Duration) -> Self {
        Self {
            runner,
            engine,
            startup_timeout,
            log_dir: std::env::temp_dir(),
            run_tag: std::process::id().to_string(),
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Directory receiving the engines' `p4s.<tag>.<id>.log` files
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Tag naming this run's namespaces and engine logs, the process id by default.
    ///
    /// Two runs on one machine must use different tags.
    pub fn with_run_tag(mut self, tag: impl ToString) -> Self {
        self.run_tag = tag.to_string();
        self
    }

    pub fn runner(&self) -> &Run {
        &self.runner
    }

    /// Namespace holding end host `id`
    pub fn namespace_of(&self, id: &str) -> String {
        format!("p4topo-{}-{}", self.run_tag, id)
    }

    /// Name of the veth end of `port` while it is still in the root namespace
    fn veth_name(port: &Port, handle: &NetnsHandle) -> String {
        match handle {
            NetnsHandle::Host { id, .. } => format!("{}-{}", id, port.interface),
            NetnsHandle::Switch { .. } => port.interface.clone(),
        }
    }

    /// Delete a half-configured veth pair through an end still in the root namespace.
    ///
    /// An end already moved into a host namespace goes away with that namespace.
    fn remove_pair(&self, link: &Link, root_names: [&str; 2]) {
        for name in root_names {
            match self.runner.run(&argv(&["ip", "link", "del", "dev", name])) {
                Ok(()) => return,
                Err(e) => debug!("{} is not in the root namespace: {}", name, e),
            }
        }
        warn!("Veth pair of {} left to its host namespaces", link);
    }

    fn setup_endpoint(&self, port: &Port, handle: &NetnsHandle) -> Result<(), RuntimeError> {
        let iface = port.interface.as_str();
        if let NetnsHandle::Host { namespace, ip, .. } = handle {
            let veth = Self::veth_name(port, handle);
            self.runner
                .run(&argv(&["ip", "link", "set", &veth, "netns", namespace]))?;
            self.runner.run(&handle.in_namespace(argv(&[
                "ip", "link", "set", "dev", &veth, "name", iface,
            ])))?;
            if let Some(mac) = port.mac {
                self.set_mac(handle, iface, mac)?;
            }
            if iface == PRIMARY_INTERFACE {
                self.runner.run(&handle.in_namespace(argv(&[
                    "ip",
                    "addr",
                    "add",
                    &ip.to_string(),
                    "dev",
                    iface,
                ])))?;
            }
        } else {
            if let Some(mac) = port.mac {
                self.set_mac(handle, iface, mac)?;
            }
            // Keep router solicitations off the engine's ports
            self.runner.run(&argv(&[
                "sysctl",
                "-w",
                &format!("net.ipv6.conf.{}.disable_ipv6=1", iface),
            ]))?;
        }
        self.runner.run(&handle.in_namespace(argv(&[
            "ip", "link", "set", "dev", iface, "up",
        ])))
    }

    fn set_mac(&self, handle: &NetnsHandle, iface: &str, mac: MacAddr) -> Result<(), RuntimeError> {
        self.runner.run(&handle.in_namespace(argv(&[
            "ip",
            "link",
            "set",
            "dev",
            iface,
            "address",
            &mac.to_string(),
        ])))
    }

    /// Wait until the engine of `id` accepts connections on its control port
    fn wait_ready(&self, id: &str, control_port: u16, child: &mut Child) -> Result<(), RuntimeError> {
        let address = SocketAddr::from((Ipv4Addr::LOCALHOST, control_port));
        let deadline = Instant::now() + self.startup_timeout;

        loop {
            if TcpStream::connect_timeout(&address, READY_POLL_INTERVAL).is_ok() {
                return Ok(());
            }
            if let Ok(Some(status)) = child.try_wait() {
                return Err(RuntimeError::CommandFailed {
                    command: format!("forwarding engine of {}", id),
                    status: status.to_string(),
                });
            }
            if Instant::now() >= deadline {
                return Err(RuntimeError::NotReady {
                    device: id.to_string(),
                    timeout: self.startup_timeout,
                });
            }
            thread::sleep(READY_POLL_INTERVAL);
        }
    }
}

impl<Run: CommandRunner> VirtualRuntime for NetnsRuntime<Run> {
    type Handle = NetnsHandle;

    fn launch(&self, device: &Device) -> Result<NetnsHandle, RuntimeError> {
        match &device.kind {
            DeviceKind::EndHost { ip, .. } => {
                let handle = NetnsHandle::Host {
                    id: device.id.clone(),
                    namespace: self.namespace_of(&device.id),
                    ip: *ip,
                };
                if let NetnsHandle::Host { namespace, .. } = &handle {
                    self.runner.run(&argv(&["ip", "netns", "add", namespace]))?;
                }
                self.runner
                    .run(&handle.in_namespace(argv(&["ip", "link", "set", "dev", "lo", "up"])))?;
                Ok(handle)
            }
            DeviceKind::ForwardingDevice { control_port, .. } => {
                if !self.runner.is_dry_run() {
                    let address = SocketAddr::from((Ipv4Addr::LOCALHOST, *control_port));
                    if TcpStream::connect_timeout(&address, READY_POLL_INTERVAL).is_ok() {
                        return Err(RuntimeError::Other(format!(
                            "control port {} is already in use",
                            control_port
                        )));
                    }
                }
                Ok(NetnsHandle::Switch {
                    id: device.id.clone(),
                    control_port: *control_port,
                })
            }
        }
    }

    fn attach(&self, link: &Link, a: &NetnsHandle, b: &NetnsHandle) -> Result<(), RuntimeError> {
        let veth_a = Self::veth_name(&link.a, a);
        let veth_b = Self::veth_name(&link.b, b);
        self.runner.run(&argv(&[
            "ip", "link", "add", &veth_a, "type", "veth", "peer", "name", &veth_b,
        ]))?;
        let configured = self
            .setup_endpoint(&link.a, a)
            .and_then(|()| self.setup_endpoint(&link.b, b));
        if configured.is_err() {
            self.remove_pair(link, [veth_a.as_str(), veth_b.as_str()]);
        }
        configured
    }

    fn activate(
        &self,
        topology: &Topology,
        device: &Device,
        handle: &NetnsHandle,
    ) -> Result<(), RuntimeError> {
        let (NetnsHandle::Switch { id, control_port }, DeviceKind::ForwardingDevice { executable, .. }) =
            (handle, &device.kind)
        else {
            return Ok(());
        };

        let program = command_path(executable)
            .map_err(|e| RuntimeError::Other(format!("engine of {}: {}", id, e)))?;
        let command = engine_argv(topology, device, &program.to_string_lossy(), &self.engine)
            .ok_or_else(|| RuntimeError::Other(format!("{} has no engine", id)))?;
        let log = self.log_dir.join(format!("p4s.{}.{}.log", self.run_tag, id));
        info!("Starting forwarding engine of {} on control port {}", id, control_port);

        if let Some(mut child) = self.runner.spawn(&command, &log)? {
            if let Err(e) = self.wait_ready(id, *control_port, &mut child) {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
            lock(&self.engines).insert(id.clone(), child);
        }
        Ok(())
    }

    fn detach(&self, link: &Link, a: &NetnsHandle, _b: &NetnsHandle) -> Result<(), RuntimeError> {
        // Deleting one end of a veth pair removes its peer too
        self.runner.run(&a.in_namespace(argv(&[
            "ip",
            "link",
            "del",
            "dev",
            &link.a.interface,
        ])))
    }

    fn shutdown(&self, _device: &Device, handle: &NetnsHandle) -> Result<(), RuntimeError> {
        match handle {
            NetnsHandle::Host { namespace, .. } => {
                self.runner.run(&argv(&["ip", "netns", "del", namespace]))
            }
            NetnsHandle::Switch { id, .. } => {
                let child = lock(&self.engines).remove(id);
                if let Some(mut child) = child {
                    debug!("Killing forwarding engine of {}", id);
                    let _ = child.kill();
                    child.wait().map_err(|source| RuntimeError::Io {
                        command: format!("wait for forwarding engine of {}", id),
                        source,
                    })?;
                }
                Ok(())
            }
        }
    }

    fn exec(&self, handle: &NetnsHandle, command: &HostCommand) -> Result<(), RuntimeError> {
        if let NetnsHandle::Switch { id, .. } = handle {
            return Err(RuntimeError::Other(format!(
                "cannot run `{}` on forwarding device {}",
                command, id
            )));
        }
        for line in command.argv_list() {
            self.runner.run(&handle.in_namespace(line))?;
        }
        Ok(())
    }
}
