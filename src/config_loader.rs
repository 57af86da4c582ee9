//! Run configuration loading.
//!
//! Reads the optional YAML file and applies the command-line flags on top
//! of it. Flags always win over the file.

use crate::config::RunConfig;
use crate::configurator::FailurePolicy;
use crate::topology::Shape;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{info, warn};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Fan-out host count used when `--shape fan-out` comes without `--hosts`
pub const DEFAULT_FAN_OUT_HOSTS: u32 = 2;

/// Topology shapes selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ShapeKind {
    Fixed,
    FanOut,
    Chained,
}

/// Load and parse configuration from a YAML file.
///
/// The result is not validated: overrides may still complete it.
pub fn load_config(config_path: &Path) -> Result<RunConfig> {
    info!("Loading configuration from: {:?}", config_path);

    let file = File::open(config_path)
        .wrap_err_with(|| format!("Failed to open configuration '{}'", config_path.display()))?;
    let config: RunConfig = serde_yaml::from_reader(file)
        .wrap_err_with(|| format!("Failed to parse configuration '{}'", config_path.display()))?;

    info!("Configured topology shape: {}", config.topology.name());
    Ok(config)
}

/// Command-line settings that override the configuration file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub json: Option<PathBuf>,
    pub behavioral_exe: Option<String>,
    pub thrift_port: Option<u16>,
    pub shape: Option<ShapeKind>,
    pub hosts: Option<u32>,
    pub settle: Option<Duration>,
    pub fail_fast: bool,
    pub parallel_launch: bool,
    pub dry_run: bool,
    pub export: Option<PathBuf>,
    pub log_console: bool,
    pub pcap_dir: Option<PathBuf>,
}

/// Apply CLI overrides to a run configuration, then validate it
pub fn apply_overrides(config: &mut RunConfig, overrides: &CliOverrides) -> Result<()> {
    if let Some(json) = &overrides.json {
        config.engine.json = json.clone();
    }
    if let Some(exe) = &overrides.behavioral_exe {
        config.engine.behavioral_exe = exe.clone();
    }
    if let Some(port) = overrides.thrift_port {
        config.engine.thrift_port = port;
    }
    if let Some(settle) = overrides.settle {
        config.setup.settle = settle;
    }
    if let Some(export) = &overrides.export {
        config.export = Some(export.clone());
    }
    if let Some(dir) = &overrides.pcap_dir {
        config.engine.pcap_dir = Some(dir.clone());
    }

    // Boolean flags can only switch things on
    config.engine.log_console |= overrides.log_console;
    config.setup.parallel_launch |= overrides.parallel_launch;
    config.setup.dry_run |= overrides.dry_run;
    if overrides.fail_fast {
        config.setup.failure_policy = FailurePolicy::FailFast;
    }

    match (overrides.shape, overrides.hosts) {
        (Some(ShapeKind::Fixed), _) => config.topology = Shape::Fixed,
        (Some(ShapeKind::Chained), _) => config.topology = Shape::Chained,
        (Some(ShapeKind::FanOut), hosts) => {
            config.topology = Shape::FanOut {
                hosts: hosts.unwrap_or(DEFAULT_FAN_OUT_HOSTS),
            }
        }
        (None, Some(count)) => match &mut config.topology {
            Shape::FanOut { hosts } => *hosts = count,
            other => warn!(
                "--hosts only applies to fan-out topologies, ignoring it for {}",
                other.name()
            ),
        },
        (None, None) => {}
    }

    if matches!(overrides.shape, Some(ShapeKind::Fixed | ShapeKind::Chained))
        && overrides.hosts.is_some()
    {
        warn!("--hosts only applies to fan-out topologies, ignoring it");
    }

    config
        .validate()
        .wrap_err("Invalid run configuration")?;
    Ok(())
}
