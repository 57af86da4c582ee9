use clap::Parser;
use color_eyre::Result;
use env_logger::Env;
use log::info;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use p4topo::config::RunConfig;
use p4topo::config_loader::{self, CliOverrides, ShapeKind};
use p4topo::orchestrator::{self, LineSession, Session};
use p4topo::realizer::{CommandRunner, DryRunRunner, NetnsRuntime, SystemRunner};
use p4topo::topology::Topology;

/// Emulated network around P4 software switches
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the compiled P4 json loaded by every switch
    #[arg(long, required_unless_present = "config")]
    json: Option<PathBuf>,

    /// Switch executable, a name looked up in PATH or a path [default: simple_switch]
    #[arg(long)]
    behavioral_exe: Option<String>,

    /// Thrift server port of the first switch; further switches use the next ports [default: 9090]
    #[arg(long)]
    thrift_port: Option<u16>,

    /// Topology shape [default: fixed]
    #[arg(long, value_enum)]
    shape: Option<ShapeKind>,

    /// Number of hosts of a fan-out topology [default: 2]
    #[arg(long)]
    hosts: Option<u32>,

    /// Run configuration YAML file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Wait between network start and host configuration, e.g. "1s" or "250ms"
    #[arg(long, value_parser = humantime::parse_duration)]
    settle: Option<Duration>,

    /// Stop at the first host that cannot be configured
    #[arg(long)]
    fail_fast: bool,

    /// Launch devices in parallel
    #[arg(long)]
    parallel_launch: bool,

    /// Only log the commands that would be run
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON description of the topology to this file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Forward switch logs to the console
    #[arg(long)]
    log_console: bool,

    /// Write per-port packet captures into this directory
    #[arg(long)]
    pcap: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            json: self.json.clone(),
            behavioral_exe: self.behavioral_exe.clone(),
            thrift_port: self.thrift_port,
            shape: self.shape,
            hosts: self.hosts,
            settle: self.settle,
            fail_fast: self.fail_fast,
            parallel_launch: self.parallel_launch,
            dry_run: self.dry_run,
            export: self.export.clone(),
            log_console: self.log_console,
            pcap_dir: self.pcap.clone(),
        }
    }
}

/// Session of a dry run: there is no network to interact with
struct PlanOnly;

impl Session for PlanOnly {
    fn run(&mut self, _topology: &Topology) -> Result<()> {
        info!("Dry run complete");
        Ok(())
    }
}

fn run_with<Run: CommandRunner, S: Session>(config: &RunConfig, runner: Run, session: &mut S) -> Result<()> {
    // Concurrent runs cannot share a base control port, so it also keys their namespaces
    let runtime = NetnsRuntime::new(runner, config.engine_options(), config.engine.startup_timeout)
        .with_run_tag(config.engine.thrift_port);
    let report = orchestrator::run(config, runtime, session)?;
    info!(
        "Emulation finished: {} hosts configured, {} failed",
        report.configured.len(),
        report.failures.len()
    );
    Ok(())
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Initialize logging with default filter level of "info"
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut config = match &args.config {
        Some(path) => config_loader::load_config(path)?,
        None => RunConfig::default(),
    };
    config_loader::apply_overrides(&mut config, &args.overrides())?;

    info!("Forwarding behavior: {:?}", config.engine.json);
    info!("Topology shape: {}", config.topology.name());

    if config.setup.dry_run {
        run_with(&config, DryRunRunner::new(), &mut PlanOnly)
    } else {
        let stdin = io::stdin();
        let mut session = LineSession::new(stdin.lock(), io::stdout());
        run_with(&config, SystemRunner, &mut session)
    }
}
