//! Post-start configurator.
//!
//! Once the network is live, every end host is given what it needs to
//! reach its forwarding device: host preparation, a static ARP entry for its
//! gateway and a default route through it.
//!
//! The settle wait happens first so that links have come up before any host
//! is touched.

use crate::process::HostCommand;
use crate::realizer::{LiveNetwork, RuntimeError, VirtualRuntime};
use crate::topology::{DeviceKind, Topology};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::Duration;

/// Default wait between network start and host configuration
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(1);

/// Something able to wait
pub trait Delay {
    fn wait(&self, duration: Duration);
}

/// Blocks the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleep;

impl Delay for ThreadSleep {
    fn wait(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

impl<F: Fn(Duration)> Delay for F {
    fn wait(&self, duration: Duration) {
        self(duration)
    }
}

/// What to do when configuring one host fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and go on with the next host
    #[default]
    BestEffort,
    /// Stop at the first failing host
    FailFast,
}

/// Failure to configure one end host
#[derive(Debug, thiserror::Error)]
pub enum HostConfigurationError {
    #[error("{host} is not an end host")]
    NotAHost { host: String },

    #[error("Host {host} has no link")]
    NoUplink { host: String },

    #[error("Gateway port {port} of host {host} has no MAC address")]
    NoGatewayMac { host: String, port: String },

    #[error("Host {host} is not running")]
    NotLive { host: String },

    #[error("Host {host}: failed to {command}")]
    Command {
        host: String,
        command: String,
        #[source]
        source: RuntimeError,
    },
}

impl HostConfigurationError {
    pub fn host(&self) -> &str {
        match self {
            HostConfigurationError::NotAHost { host }
            | HostConfigurationError::NoUplink { host }
            | HostConfigurationError::NoGatewayMac { host, .. }
            | HostConfigurationError::NotLive { host }
            | HostConfigurationError::Command { host, .. } => host,
        }
    }
}

/// Outcome of [`Configurator::configure`]
#[derive(Debug, Default)]
pub struct ConfigurationReport {
    /// Hosts fully configured, in declaration order
    pub configured: Vec<String>,
    pub failures: Vec<HostConfigurationError>,
    /// Hosts never attempted because of [`FailurePolicy::FailFast`]
    pub skipped: Vec<String>,
}

impl ConfigurationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

/// Applies per-host configuration to a live network
pub struct Configurator<D: Delay = ThreadSleep> {
    settle: Duration,
    policy: FailurePolicy,
    prepare_hosts: bool,
    delay: D,
}

impl Default for Configurator<ThreadSleep> {
    fn default() -> Self {
        Self::new(ThreadSleep)
    }
}

impl<D: Delay> Configurator<D> {
    pub fn new(delay: D) -> Self {
        Self {
            settle: DEFAULT_SETTLE,
            policy: FailurePolicy::default(),
            prepare_hosts: true,
            delay,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether to disable IPv6 and NIC offloads before ARP and routes
    pub fn with_host_preparation(mut self, prepare: bool) -> Self {
        self.prepare_hosts = prepare;
        self
    }

    /// Commands configuring `host`, in the order they must run.
    ///
    /// The gateway MAC is the MAC of the port at the far end of the host's
    /// first link.
    pub fn host_plan(
        &self,
        topology: &Topology,
        host: &str,
    ) -> Result<Vec<HostCommand>, HostConfigurationError> {
        let gateway = match topology.device(host).map(|d| &d.kind) {
            Some(DeviceKind::EndHost { gateway, .. }) => *gateway,
            _ => {
                return Err(HostConfigurationError::NotAHost {
                    host: host.to_string(),
                })
            }
        };
        let (local, peer) = topology
            .uplink(host)
            .ok_or_else(|| HostConfigurationError::NoUplink {
                host: host.to_string(),
            })?;
        let gateway_mac = peer.mac.ok_or_else(|| HostConfigurationError::NoGatewayMac {
            host: host.to_string(),
            port: peer.to_string(),
        })?;

        let mut plan = Vec::with_capacity(4);
        if self.prepare_hosts {
            plan.push(HostCommand::DisableIpv6);
            plan.push(HostCommand::DisableOffload {
                interface: local.interface.clone(),
            });
        }
        plan.push(HostCommand::SetArp {
            interface: local.interface.clone(),
            ip: gateway,
            mac: gateway_mac,
        });
        plan.push(HostCommand::SetDefaultRoute {
            interface: local.interface.clone(),
            gateway,
        });
        Ok(plan)
    }

    fn configure_host<R: VirtualRuntime>(
        &self,
        topology: &Topology,
        live: &LiveNetwork<R::Handle>,
        runtime: &R,
        host: &str,
    ) -> Result<(), HostConfigurationError> {
        let plan = self.host_plan(topology, host)?;
        let handle = live
            .handle(host)
            .ok_or_else(|| HostConfigurationError::NotLive {
                host: host.to_string(),
            })?;

        for command in &plan {
            debug!("{}: {}", host, command);
            runtime
                .exec(handle, command)
                .map_err(|source| HostConfigurationError::Command {
                    host: host.to_string(),
                    command: command.to_string(),
                    source,
                })?;
        }
        Ok(())
    }

    /// Wait for the network to settle, then configure every end host in
    /// declaration order
    pub fn configure<R: VirtualRuntime>(
        &self,
        topology: &Topology,
        live: &LiveNetwork<R::Handle>,
        runtime: &R,
    ) -> ConfigurationReport {
        if !self.settle.is_zero() {
            info!(
                "Waiting {} for links to come up",
                humantime::format_duration(self.settle)
            );
            self.delay.wait(self.settle);
        }

        let mut report = ConfigurationReport::default();
        let mut hosts = topology.hosts();
        for host in hosts.by_ref() {
            match self.configure_host(topology, live, runtime, &host.id) {
                Ok(()) => {
                    info!("Configured {}", host.id);
                    report.configured.push(host.id.clone());
                }
                Err(e) => {
                    warn!("{}", e);
                    report.failures.push(e);
                    if self.policy == FailurePolicy::FailFast {
                        break;
                    }
                }
            }
        }
        report.skipped = hosts.map(|h| h.id.clone()).collect();

        info!(
            "Host configuration done: {} configured, {} failed, {} skipped",
            report.configured.len(),
            report.failures.len(),
            report.skipped.len()
        );
        report
    }
}
