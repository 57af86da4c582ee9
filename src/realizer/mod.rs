//! Network realizer.
//!
//! Turns a finalized [`Topology`] into a running emulated network by driving
//! a [`VirtualRuntime`]. Realization happens in three passes:
//!
//! 1. every device is launched (optionally in parallel),
//! 2. every link is attached, in declaration order,
//! 3. every device is activated, which starts forwarding engines once all
//!    of their interfaces exist.
//!
//! A failure in any pass tears down whatever was already acquired, in
//! reverse order, before the error is returned.

pub mod live;
pub mod netns;

pub use live::{LiveDevice, LiveNetwork};
pub use netns::{CommandRunner, DryRunRunner, NetnsRuntime, SystemRunner};

use crate::process::HostCommand;
use crate::topology::{Device, Link, Topology};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::fmt;
use std::time::Duration;

/// Errors reported by a virtual-networking runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("Failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}")]
    CommandFailed { command: String, status: String },

    #[error("{device} did not become ready within {timeout:?}")]
    NotReady { device: String, timeout: Duration },

    #[error("{0}")]
    Other(String),
}

/// Errors raised while realizing a topology
#[derive(Debug, thiserror::Error)]
pub enum RealizationError {
    #[error("Failed to launch {device}")]
    Launch {
        device: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to attach link {link}")]
    Attach {
        link: String,
        #[source]
        source: RuntimeError,
    },

    #[error("Failed to activate {device}")]
    Activate {
        device: String,
        #[source]
        source: RuntimeError,
    },
}

impl RealizationError {
    /// Device id or link description the error is about
    pub fn subject(&self) -> &str {
        match self {
            RealizationError::Launch { device, .. } | RealizationError::Activate { device, .. } => {
                device
            }
            RealizationError::Attach { link, .. } => link,
        }
    }
}

/// The virtual-networking runtime instantiating devices and links.
///
/// Implementations must be `Sync`: devices may be launched from several
/// threads at once.
pub trait VirtualRuntime: Sync {
    /// Handle of a running device instance
    type Handle: Clone + fmt::Debug + Send;

    /// Create the isolated instance of `device`
    fn launch(&self, device: &Device) -> Result<Self::Handle, RuntimeError>;

    /// Create the virtual link between two launched devices
    fn attach(&self, link: &Link, a: &Self::Handle, b: &Self::Handle) -> Result<(), RuntimeError>;

    /// Start whatever runs inside `device` once all of its links exist
    fn activate(
        &self,
        _topology: &Topology,
        _device: &Device,
        _handle: &Self::Handle,
    ) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Remove a link created by [`VirtualRuntime::attach`]
    fn detach(&self, link: &Link, a: &Self::Handle, b: &Self::Handle) -> Result<(), RuntimeError>;

    /// Stop a device and release everything it holds
    fn shutdown(&self, device: &Device, handle: &Self::Handle) -> Result<(), RuntimeError>;

    /// Run a configuration command inside an end host
    fn exec(&self, handle: &Self::Handle, command: &HostCommand) -> Result<(), RuntimeError>;
}

/// Instantiates topologies on a [`VirtualRuntime`]
pub struct NetworkRealizer<R: VirtualRuntime> {
    runtime: R,
    parallel_launch: bool,
}

impl<R: VirtualRuntime> NetworkRealizer<R> {
    pub fn new(runtime: R) -> Self {
        Self {
            runtime,
            parallel_launch: false,
        }
    }

    /// Launch devices concurrently; links are still attached only after
    /// every launch has finished.
    pub fn with_parallel_launch(mut self, parallel: bool) -> Self {
        self.parallel_launch = parallel;
        self
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    /// Realize `topology`.
    ///
    /// On success every device is launched and activated and every link is
    /// attached. On failure nothing acquired by this call is left running.
    pub fn start(&self, topology: Topology) -> Result<LiveNetwork<R::Handle>, RealizationError> {
        info!(
            "Launching {} devices{}",
            topology.devices().len(),
            if self.parallel_launch { " in parallel" } else { "" }
        );

        let launched: Vec<Result<R::Handle, RuntimeError>> = if self.parallel_launch {
            topology
                .devices()
                .par_iter()
                .map(|device| self.runtime.launch(device))
                .collect()
        } else {
            // Sequential launch stops at the first failure
            let mut results = Vec::with_capacity(topology.devices().len());
            for device in topology.devices() {
                let result = self.runtime.launch(device);
                let failed = result.is_err();
                results.push(result);
                if failed {
                    break;
                }
            }
            results
        };

        let mut devices = Vec::with_capacity(launched.len());
        let mut launch_failure = None;
        for (device, result) in topology.devices().iter().zip(launched) {
            match result {
                Ok(handle) => {
                    debug!("Launched {}", device.id);
                    devices.push(LiveDevice {
                        device: device.clone(),
                        handle,
                    });
                }
                Err(source) if launch_failure.is_none() => {
                    launch_failure = Some(RealizationError::Launch {
                        device: device.id.clone(),
                        source,
                    });
                }
                Err(source) => warn!("Launching {} also failed: {}", device.id, source),
            }
        }

        let mut live = LiveNetwork::new(topology, devices);
        if let Some(err) = launch_failure {
            self.rollback(&mut live);
            return Err(err);
        }

        info!("Attaching {} links", live.topology().links().len());
        for index in 0..live.topology().links().len() {
            let link = &live.topology().links()[index];
            let attached = match (live.handle(&link.a.device), live.handle(&link.b.device)) {
                (Some(a), Some(b)) => self.runtime.attach(link, a, b),
                _ => Err(RuntimeError::Other(format!(
                    "an endpoint of {} was not launched",
                    link
                ))),
            };
            match attached {
                Ok(()) => {
                    debug!("Attached {}", link);
                    live.mark_attached(index);
                }
                Err(source) => {
                    let err = RealizationError::Attach {
                        link: link.to_string(),
                        source,
                    };
                    self.rollback(&mut live);
                    return Err(err);
                }
            }
        }

        for index in 0..live.devices().len() {
            let entry = &live.devices()[index];
            if let Err(source) = self
                .runtime
                .activate(live.topology(), &entry.device, &entry.handle)
            {
                let err = RealizationError::Activate {
                    device: entry.device.id.clone(),
                    source,
                };
                self.rollback(&mut live);
                return Err(err);
            }
        }

        info!("Network is live");
        Ok(live)
    }

    /// Tear down a live network. Calling it again is a no-op.
    pub fn stop(&self, live: &mut LiveNetwork<R::Handle>) {
        if live.is_stopped() {
            debug!("Network already stopped");
            return;
        }
        info!("Stopping network");
        self.release(live);
    }

    fn rollback(&self, live: &mut LiveNetwork<R::Handle>) {
        warn!("Realization failed, releasing acquired resources");
        self.release(live);
    }

    /// Detach links and shut devices down, both in reverse order
    fn release(&self, live: &mut LiveNetwork<R::Handle>) {
        let (devices, attached) = live.take();
        let topology = live.topology();

        for index in attached.into_iter().rev() {
            let link = &topology.links()[index];
            let handles = (
                devices.iter().find(|d| d.device.id == link.a.device),
                devices.iter().find(|d| d.device.id == link.b.device),
            );
            if let (Some(a), Some(b)) = handles {
                if let Err(e) = self.runtime.detach(link, &a.handle, &b.handle) {
                    warn!("Failed to detach {}: {}", link, e);
                }
            }
        }

        for entry in devices.iter().rev() {
            if let Err(e) = self.runtime.shutdown(&entry.device, &entry.handle) {
                warn!("Failed to shut down {}: {}", entry.device.id, e);
            }
        }
    }
}
