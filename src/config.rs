//! Run configuration.
//!
//! A [`RunConfig`] is built once at process entry, from an optional YAML
//! file and the command line, and validated before anything is built:
//!
//! ```yaml
//! engine:
//!   json: build/basic.json
//!   behavioral_exe: simple_switch
//!   thrift_port: 9090
//! topology:
//!   shape: fan_out
//!   hosts: 3
//! setup:
//!   settle: 500ms
//!   failure_policy: best_effort
//! ```

use crate::configurator::{FailurePolicy, DEFAULT_SETTLE};
use crate::ip::MAX_INDEX;
use crate::process::EngineOptions;
use crate::topology::{EngineParams, Shape};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Engine executable used when none is configured
pub const DEFAULT_BEHAVIORAL_EXE: &str = "simple_switch";

/// Control port of the first forwarding device when none is configured
pub const DEFAULT_THRIFT_PORT: u16 = 9090;

fn default_behavioral_exe() -> String {
    DEFAULT_BEHAVIORAL_EXE.to_string()
}

fn default_thrift_port() -> u16 {
    DEFAULT_THRIFT_PORT
}

fn default_startup_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_settle() -> Duration {
    DEFAULT_SETTLE
}

fn default_true() -> bool {
    true
}

/// Complete configuration of one emulation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub topology: Shape,
    #[serde(default)]
    pub setup: SetupConfig,
    /// Where to write the JSON description of the realized topology
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<PathBuf>,
}

/// Forwarding-engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Compiled forwarding-behavior artifact
    #[serde(default)]
    pub json: PathBuf,
    #[serde(default = "default_behavioral_exe")]
    pub behavioral_exe: String,
    /// Control port of the first forwarding device; the others follow it
    #[serde(default = "default_thrift_port")]
    pub thrift_port: u16,
    #[serde(default)]
    pub log_console: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcap_dir: Option<PathBuf>,
    /// How long an engine may take to open its control port
    #[serde(default = "default_startup_timeout", with = "humantime_serde")]
    pub startup_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            json: PathBuf::new(),
            behavioral_exe: default_behavioral_exe(),
            thrift_port: default_thrift_port(),
            log_console: false,
            pcap_dir: None,
            startup_timeout: default_startup_timeout(),
        }
    }
}

/// Realization and host configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupConfig {
    /// Wait between network start and host configuration
    #[serde(default = "default_settle", with = "humantime_serde")]
    pub settle: Duration,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default)]
    pub parallel_launch: bool,
    /// Disable IPv6 and NIC offloads on hosts before routing them
    #[serde(default = "default_true")]
    pub prepare_hosts: bool,
    /// Only log the commands that would be run
    #[serde(default)]
    pub dry_run: bool,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            settle: default_settle(),
            failure_policy: FailurePolicy::default(),
            parallel_launch: false,
            prepare_hosts: true,
            dry_run: false,
        }
    }
}

impl RunConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.engine.json.as_os_str().is_empty() {
            return Err(ValidationError::InvalidEngine(
                "the compiled forwarding-behavior json must be given".to_string(),
            ));
        }
        if self.engine.behavioral_exe.trim().is_empty() {
            return Err(ValidationError::InvalidEngine(
                "behavioral_exe cannot be empty".to_string(),
            ));
        }
        if self.engine.thrift_port == 0 {
            return Err(ValidationError::InvalidEngine(
                "thrift_port must be positive".to_string(),
            ));
        }
        if self.engine.startup_timeout.is_zero() {
            return Err(ValidationError::InvalidEngine(
                "startup_timeout must be positive".to_string(),
            ));
        }

        match &self.topology {
            Shape::FanOut { hosts } if *hosts == 0 || *hosts > MAX_INDEX => {
                return Err(ValidationError::InvalidTopology(format!(
                    "fan-out host count must be between 1 and {}, got {}",
                    MAX_INDEX, hosts
                )));
            }
            Shape::Explicit(decl) if decl.switches.is_empty() && decl.hosts.is_empty() => {
                return Err(ValidationError::InvalidTopology(
                    "explicit topology declares no devices".to_string(),
                ));
            }
            _ => {}
        }

        if matches!(&self.export, Some(path) if path.as_os_str().is_empty()) {
            return Err(ValidationError::InvalidExport(
                "export path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Engine settings shared by the forwarding devices of the topology
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            executable: self.engine.behavioral_exe.clone(),
            control_config_path: self.engine.json.clone(),
            base_control_port: self.engine.thrift_port,
        }
    }

    /// Run-wide engine switches
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            log_console: self.engine.log_console,
            pcap_dir: self.engine.pcap_dir.clone(),
        }
    }
}

/// Custom error type for configuration validation
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid engine configuration: {0}")]
    InvalidEngine(String),
    #[error("Invalid topology configuration: {0}")]
    InvalidTopology(String),
    #[error("Invalid export configuration: {0}")]
    InvalidExport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RunConfig {
        let mut config = RunConfig::default();
        config.engine.json = PathBuf::from("build/basic.json");
        config
    }

    #[test]
    fn test_defaults() {
        let config = valid();
        assert_eq!(config.engine.behavioral_exe, "simple_switch");
        assert_eq!(config.engine.thrift_port, 9090);
        assert_eq!(config.topology, Shape::Fixed);
        assert_eq!(config.setup.settle, Duration::from_secs(1));
        assert_eq!(config.setup.failure_policy, FailurePolicy::BestEffort);
        assert!(config.setup.prepare_hosts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
engine:
  json: build/basic.json
  thrift_port: 9190
topology:
  shape: fan_out
  hosts: 4
setup:
  settle: 250ms
  failure_policy: fail_fast
export: topology.json
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.engine.thrift_port, 9190);
        assert_eq!(config.engine.behavioral_exe, "simple_switch");
        assert_eq!(config.topology, Shape::FanOut { hosts: 4 });
        assert_eq!(config.setup.settle, Duration::from_millis(250));
        assert_eq!(config.setup.failure_policy, FailurePolicy::FailFast);
        assert_eq!(config.export, Some(PathBuf::from("topology.json")));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_explicit_topology() {
        let yaml = r#"
engine:
  json: build/basic.json
topology:
  shape: explicit
  switches:
    - id: s1
  hosts:
    - id: a
    - id: b
      ip: 192.168.0.10/24
  links:
    - a: { device: a }
      b: { device: s1, port: 3 }
    - a: { device: b }
      b: { device: s1 }
"#;
        let config: RunConfig = serde_yaml::from_str(yaml).unwrap();
        let Shape::Explicit(decl) = &config.topology else {
            panic!("expected an explicit topology");
        };
        assert_eq!(decl.switches.len(), 1);
        assert_eq!(decl.hosts.len(), 2);
        assert_eq!(decl.links[0].b.port, Some(3));
    }

    #[test]
    fn test_missing_json_is_rejected() {
        let config = RunConfig::default();
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidEngine(_))
        ));
    }

    #[test]
    fn test_fan_out_bounds() {
        let mut config = valid();
        config.topology = Shape::FanOut { hosts: 0 };
        assert!(config.validate().is_err());
        config.topology = Shape::FanOut { hosts: 256 };
        assert!(config.validate().is_err());
        config.topology = Shape::FanOut { hosts: 255 };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_engine_params_follow_config() {
        let mut config = valid();
        config.engine.thrift_port = 9500;
        let params = config.engine_params();
        assert_eq!(params.base_control_port, 9500);
        assert_eq!(params.control_config_path, PathBuf::from("build/basic.json"));
    }
}
