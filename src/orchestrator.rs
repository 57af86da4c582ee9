//! Emulation orchestrator.
//!
//! Drives one emulation run through its phases:
//!
//! ```text
//! Declared -> Built -> Live -> Configured -> Stopped
//! ```
//!
//! Any phase may go straight to `Stopped`, which is terminal. Stopping is
//! guaranteed: [`Emulation`] stops the network when dropped, so early
//! returns and panics after `start` still release every device.

use crate::config::RunConfig;
use crate::configurator::{ConfigurationReport, Configurator, FailurePolicy};
use crate::realizer::{LiveNetwork, NetworkRealizer, RealizationError, VirtualRuntime};
use crate::registry::TopologyRegistry;
use crate::topology::{build_shape, EngineParams, Shape, Topology, TopologyError};
use crate::utils::validate_binary_spec;
use color_eyre::eyre::{eyre, WrapErr};
use log::{info, warn};
use std::collections::BTreeSet;
use std::fmt;
use std::io::{BufRead, Write};

/// Lifecycle phase of an emulation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Declared,
    Built,
    Live,
    Configured,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Declared => "declared",
            Phase::Built => "built",
            Phase::Live => "live",
            Phase::Configured => "configured",
            Phase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestrationError {
    #[error("Cannot go from {from} to {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error(transparent)]
    Topology(#[from] TopologyError),

    #[error(transparent)]
    Realization(#[from] RealizationError),
}

/// One emulation run and the resources it holds
pub struct Emulation<R: VirtualRuntime> {
    realizer: NetworkRealizer<R>,
    phase: Phase,
    topology: Option<Topology>,
    live: Option<LiveNetwork<R::Handle>>,
}

impl<R: VirtualRuntime> Emulation<R> {
    pub fn new(realizer: NetworkRealizer<R>) -> Self {
        Self {
            realizer,
            phase: Phase::Declared,
            topology: None,
            live: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn topology(&self) -> Option<&Topology> {
        self.topology.as_ref()
    }

    pub fn live(&self) -> Option<&LiveNetwork<R::Handle>> {
        self.live.as_ref()
    }

    pub fn runtime(&self) -> &R {
        self.realizer.runtime()
    }

    fn transition(&mut self, from: Phase, to: Phase) -> Result<(), OrchestrationError> {
        if self.phase != from {
            return Err(OrchestrationError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        info!("Emulation {} -> {}", from, to);
        self.phase = to;
        Ok(())
    }

    /// Build the topology described by `shape`
    pub fn build(&mut self, shape: &Shape, engine: &EngineParams) -> Result<&Topology, OrchestrationError> {
        if self.phase != Phase::Declared {
            return Err(OrchestrationError::InvalidTransition {
                from: self.phase,
                to: Phase::Built,
            });
        }
        let topology = build_shape(shape, engine)?;
        self.transition(Phase::Declared, Phase::Built)?;
        Ok(self.topology.insert(topology))
    }

    /// Realize the built topology.
    ///
    /// A realization failure leaves the run stopped.
    pub fn start(&mut self) -> Result<(), OrchestrationError> {
        let topology = match (&self.phase, &self.topology) {
            (Phase::Built, Some(topology)) => topology.clone(),
            _ => {
                return Err(OrchestrationError::InvalidTransition {
                    from: self.phase,
                    to: Phase::Live,
                })
            }
        };

        match self.realizer.start(topology) {
            Ok(live) => {
                self.live = Some(live);
                self.transition(Phase::Built, Phase::Live)
            }
            Err(e) => {
                self.phase = Phase::Stopped;
                Err(e.into())
            }
        }
    }

    /// Configure every end host of the live network
    pub fn configure<D: crate::configurator::Delay>(
        &mut self,
        configurator: &Configurator<D>,
    ) -> Result<ConfigurationReport, OrchestrationError> {
        let (Phase::Live, Some(live)) = (self.phase, &self.live) else {
            return Err(OrchestrationError::InvalidTransition {
                from: self.phase,
                to: Phase::Configured,
            });
        };
        let report = configurator.configure(live.topology(), live, self.realizer.runtime());
        self.transition(Phase::Live, Phase::Configured)?;
        Ok(report)
    }

    /// Release everything the run holds. Safe to call in any phase, any
    /// number of times.
    pub fn stop(&mut self) {
        if self.phase == Phase::Stopped {
            return;
        }
        if let Some(live) = self.live.as_mut() {
            self.realizer.stop(live);
        }
        info!("Emulation {} -> {}", self.phase, Phase::Stopped);
        self.phase = Phase::Stopped;
    }
}

impl<R: VirtualRuntime> Drop for Emulation<R> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Interactive session presented once the network is configured
pub trait Session {
    /// Returns when the user is done with the network
    fn run(&mut self, topology: &Topology) -> color_eyre::Result<()>;
}

/// Line-based session reading commands until `exit` or end of input
pub struct LineSession<In: BufRead, Out: Write> {
    input: In,
    output: Out,
}

impl<In: BufRead, Out: Write> LineSession<In, Out> {
    pub fn new(input: In, output: Out) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> Out {
        self.output
    }

    fn describe(&mut self, topology: &Topology, command: &str) -> std::io::Result<()> {
        match command {
            "nodes" => {
                let ids: Vec<&str> = topology.devices().iter().map(|d| d.id.as_str()).collect();
                writeln!(self.output, "{}", ids.join(" "))
            }
            "links" | "net" => {
                for link in topology.links() {
                    writeln!(
                        self.output,
                        "{} <-> {}",
                        link.a.interface_label(),
                        link.b.interface_label()
                    )?;
                }
                Ok(())
            }
            "help" => writeln!(self.output, "commands: nodes, links, help, exit"),
            other => writeln!(self.output, "unknown command: {}", other),
        }
    }
}

impl<In: BufRead, Out: Write> Session for LineSession<In, Out> {
    fn run(&mut self, topology: &Topology) -> color_eyre::Result<()> {
        writeln!(self.output, "Ready !")?;
        let mut line = String::new();
        loop {
            write!(self.output, "p4topo> ")?;
            self.output.flush()?;

            line.clear();
            if self.input.read_line(&mut line).wrap_err("Failed to read command")? == 0 {
                writeln!(self.output)?;
                return Ok(());
            }
            match line.trim() {
                "" => continue,
                "exit" | "quit" => return Ok(()),
                command => self.describe(topology, command)?,
            }
        }
    }
}

/// Check that every forwarding-engine executable of `topology` can be run
pub fn check_executables(topology: &Topology) -> color_eyre::Result<()> {
    let executables: BTreeSet<&str> = topology
        .forwarding_devices()
        .filter_map(|d| match &d.kind {
            crate::topology::DeviceKind::ForwardingDevice { executable, .. } => {
                Some(executable.as_str())
            }
            _ => None,
        })
        .collect();

    for executable in executables {
        let path = validate_binary_spec(executable)
            .wrap_err_with(|| format!("Forwarding engine '{}' is not usable", executable))?;
        info!("Using forwarding engine {:?}", path);
    }
    Ok(())
}

/// Run a complete emulation: build, export, start, configure, hand over to
/// `session`, stop.
///
/// The network is stopped on every path out of this function.
pub fn run<R: VirtualRuntime, S: Session>(
    config: &RunConfig,
    runtime: R,
    session: &mut S,
) -> color_eyre::Result<ConfigurationReport> {
    let realizer = NetworkRealizer::new(runtime).with_parallel_launch(config.setup.parallel_launch);
    let mut emulation = Emulation::new(realizer);

    let topology = emulation
        .build(&config.topology, &config.engine_params())
        .wrap_err("Failed to build topology")?;
    if !config.setup.dry_run {
        check_executables(topology)?;
    }
    if let Some(path) = &config.export {
        TopologyRegistry::from_topology(topology).write(path)?;
    }

    emulation.start().wrap_err("Failed to start network")?;

    let configurator = Configurator::default()
        .with_settle(config.setup.settle)
        .with_policy(config.setup.failure_policy)
        .with_host_preparation(config.setup.prepare_hosts);
    let report = emulation.configure(&configurator)?;

    if config.setup.failure_policy == FailurePolicy::FailFast && !report.failures.is_empty() {
        emulation.stop();
        let host = report.failures[0].host().to_string();
        return Err(eyre!("Host configuration failed at {}", host));
    }
    for failure in &report.failures {
        warn!("Host left unconfigured: {}", failure);
    }

    if let Some(topology) = emulation.topology() {
        session.run(topology)?;
    }

    emulation.stop();
    Ok(report)
}
