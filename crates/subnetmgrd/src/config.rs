//! Configuration file support for subnetmgrd.
//!
//! Loads and validates [`SubnetOptions`] from TOML. Every field has a
//! default, so an empty file is a valid configuration. Command-line flags
//! are applied on top by the binary.
//!
//! ```toml
//! guid = "0x0002c90300001234"
//! routing_engine = "minhop"
//! sweep_interval_secs = 10
//!
//! [[local_ports]]
//! guid = "0x0002c90300001234"
//! state = "active"
//!
//! [[topology.nodes]]
//! guid = "0x0002c90300001234"
//! lid = 1
//! kind = "ca"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fabric_types::PortGuid;
use serde::{Deserialize, Serialize};
use sm_common::{SmError, SmResult};

use crate::port_select::LocalPort;
use crate::routing::DEFAULT_ENGINE;
use crate::subnet::TopologyDescription;

/// Whether the local console is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleMode {
    #[default]
    Off,
    Local,
}

impl std::str::FromStr for ConsoleMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "off" => Ok(ConsoleMode::Off),
            "local" => Ok(ConsoleMode::Local),
            other => Err(format!("unknown console mode '{}'", other)),
        }
    }
}

/// Complete subnetmgrd configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubnetOptions {
    /// Local port to bind; 0 picks the first usable port
    #[serde(default = "default_guid")]
    pub guid: PortGuid,

    /// Routing engine name
    #[serde(default = "default_routing_engine")]
    pub routing_engine: String,

    /// Seconds between periodic light sweeps; 0 disables them
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Manager loop poll period in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Dispatcher worker threads
    #[serde(default = "default_dispatcher_threads")]
    pub dispatcher_threads: usize,

    /// Exit once the subnet is up
    #[serde(default)]
    pub run_once: bool,

    /// Dump forwarding tables after every committed sweep
    #[serde(default)]
    pub dump_tables: bool,

    /// Time to let outstanding transactions drain at shutdown
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,

    /// Ports to leave out of path equalization
    #[serde(default)]
    pub ignore_guids_file: Option<PathBuf>,

    #[serde(default)]
    pub console: ConsoleMode,

    /// Log to this file instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Ports of the local host adapter
    #[serde(default)]
    pub local_ports: Vec<LocalPort>,

    /// Fabric served by the built-in discovery
    #[serde(default)]
    pub topology: TopologyDescription,
}

// Default functions
fn default_guid() -> PortGuid {
    PortGuid::ZERO
}

fn default_routing_engine() -> String {
    DEFAULT_ENGINE.to_string()
}

fn default_sweep_interval() -> u64 {
    10
}

fn default_poll_interval() -> u64 {
    10_000
}

fn default_dispatcher_threads() -> usize {
    4
}

fn default_shutdown_grace() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SubnetOptions {
    fn default() -> Self {
        Self {
            guid: default_guid(),
            routing_engine: default_routing_engine(),
            sweep_interval_secs: default_sweep_interval(),
            poll_interval_ms: default_poll_interval(),
            dispatcher_threads: default_dispatcher_threads(),
            run_once: false,
            dump_tables: false,
            shutdown_grace_ms: default_shutdown_grace(),
            ignore_guids_file: None,
            console: ConsoleMode::Off,
            log_file: None,
            log_level: default_log_level(),
            local_ports: Vec::new(),
            topology: TopologyDescription::default(),
        }
    }
}

impl SubnetOptions {
    /// Loads options from a TOML file.
    pub fn load(path: &Path) -> SmResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            SmError::config_parse(path, 0, format!("Cannot read config file: {}", e))
        })?;
        Self::parse(path, &content)
    }

    /// Parses TOML text. `path` is only used in error messages.
    pub fn parse(path: &Path, content: &str) -> SmResult<Self> {
        toml::from_str(content).map_err(|e| {
            let line = e
                .span()
                .map(|span| content[..span.start.min(content.len())].matches('\n').count() + 1)
                .unwrap_or(0);
            SmError::config_parse(path, line, e.message().to_string())
        })
    }

    /// Checks option consistency.
    pub fn validate(&self) -> SmResult<()> {
        if self.dispatcher_threads == 0 {
            return Err(SmError::init("options", "dispatcher_threads must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(SmError::init("options", "poll_interval_ms must be non-zero"));
        }
        if self.routing_engine.trim().is_empty() {
            return Err(SmError::init("options", "routing_engine must not be empty"));
        }
        self.topology
            .build()
            .map_err(|e| SmError::init("topology", e.to_string()))?;
        Ok(())
    }

    /// Writes the effective options as TOML, replacing `path`.
    pub fn write(&self, path: &Path) -> SmResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| SmError::config_parse(path, 0, format!("Cannot encode options: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
