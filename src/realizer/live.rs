//! Running network state.

use crate::topology::{Device, Link, Topology};

/// A launched device together with the runtime's handle to it
#[derive(Debug, Clone)]
pub struct LiveDevice<H> {
    pub device: Device,
    pub handle: H,
}

/// A realized topology.
///
/// Only [`super::NetworkRealizer`] creates and mutates it. Once stopped it
/// holds no handles, only the topology it was built from.
#[derive(Debug)]
pub struct LiveNetwork<H> {
    topology: Topology,
    devices: Vec<LiveDevice<H>>,
    /// Indices into `topology.links()` of the attached links, in attach order
    attached: Vec<usize>,
    stopped: bool,
}

impl<H> LiveNetwork<H> {
    pub(crate) fn new(topology: Topology, devices: Vec<LiveDevice<H>>) -> Self {
        Self {
            topology,
            devices,
            attached: Vec::new(),
            stopped: false,
        }
    }

    pub(crate) fn mark_attached(&mut self, link: usize) {
        self.attached.push(link);
    }

    /// Remove every handle and mark the network stopped
    pub(crate) fn take(&mut self) -> (Vec<LiveDevice<H>>, Vec<usize>) {
        self.stopped = true;
        (
            std::mem::take(&mut self.devices),
            std::mem::take(&mut self.attached),
        )
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Running devices in declaration order
    pub fn devices(&self) -> &[LiveDevice<H>] {
        &self.devices
    }

    /// Handle of the running instance of `id`
    pub fn handle(&self, id: &str) -> Option<&H> {
        self.devices
            .iter()
            .find(|d| d.device.id == id)
            .map(|d| &d.handle)
    }

    /// Links currently attached, in attach order
    pub fn attached_links(&self) -> impl Iterator<Item = &Link> {
        self.attached.iter().map(|i| &self.topology.links()[*i])
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}
