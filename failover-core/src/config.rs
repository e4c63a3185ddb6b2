//! Configuration loading for the failover harness.
//!
//! Configuration is loaded from a TOML file (default: `failover.toml`).
//! Every section may be omitted; missing fields fall back to the values the
//! rescind protocol was tuned with.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::stage::ProtocolTimings;

/// Root configuration for a failover test run.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Workload (testpmd) source and location.
    #[serde(default)]
    pub workload: WorkloadConfig,
    /// Rescind protocol settle delays.
    #[serde(default)]
    pub protocol: ProtocolConfig,
    /// Per-scenario run durations.
    #[serde(default)]
    pub run: RunConfig,
    /// Test interface selection.
    #[serde(default)]
    pub nic: NicConfig,
    /// Remote nodes under test.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

/// Workload configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    /// Git URL DPDK is built from when testpmd is missing on a node.
    #[serde(default = "default_source")]
    pub source: String,
    /// Branch or tag to check out (empty = remote default).
    #[serde(default)]
    pub branch: String,
    /// testpmd binary name or path on the node.
    #[serde(default = "default_testpmd_path")]
    pub testpmd_path: String,
}

/// Rescind protocol settle delays, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolConfig {
    /// Time workloads run before the accelerated path is disabled (default: 10).
    #[serde(default = "default_warmup_secs")]
    pub warmup_secs: u64,
    /// Time workloads run on the fallback path (default: 10).
    #[serde(default = "default_disabled_hold_secs")]
    pub disabled_hold_secs: u64,
    /// Time workloads run after the accelerated path is restored (default: 15).
    #[serde(default = "default_stable_hold_secs")]
    pub stable_hold_secs: u64,
    /// Kernel log poll cadence (default: 1).
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Run durations per scenario, in seconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// Upper bound for the rescind scenarios (default: 600).
    #[serde(default = "default_rescind_max_secs")]
    pub rescind_max_secs: u64,
    /// Send/receive scenarios (default: 15).
    #[serde(default = "default_send_receive_secs")]
    pub send_receive_secs: u64,
    /// Single-node build check (default: 10).
    #[serde(default = "default_build_check_secs")]
    pub build_check_secs: u64,
}

/// Test interface selection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NicConfig {
    /// Upper (synthetic) interface name to test. When unset the last
    /// discovered interface is used; the first one carries management traffic.
    pub test_interface: Option<String>,
}

/// A remote node and the commands that toggle its accelerated networking.
///
/// The toggle commands run on the orchestrating machine. `{node}` is replaced
/// with the node name.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node name (also used in log lines and result keys).
    pub name: String,
    /// SSH host.
    pub host: String,
    /// SSH user.
    pub user: String,
    /// Prints `true` when accelerated networking is enabled.
    pub accelerated_status_cmd: String,
    /// Enables accelerated networking.
    pub accelerated_enable_cmd: String,
    /// Disables accelerated networking.
    pub accelerated_disable_cmd: String,
}

/// Repository DPDK is built from unless `[workload] source` says otherwise.
pub const DEFAULT_WORKLOAD_SOURCE: &str = "http://dpdk.org/git/dpdk-stable";

// Default value functions
fn default_source() -> String {
    DEFAULT_WORKLOAD_SOURCE.to_string()
}

fn default_testpmd_path() -> String {
    "dpdk-testpmd".to_string()
}

fn default_warmup_secs() -> u64 {
    10
}

fn default_disabled_hold_secs() -> u64 {
    10
}

fn default_stable_hold_secs() -> u64 {
    15
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_rescind_max_secs() -> u64 {
    60 * 10
}

fn default_send_receive_secs() -> u64 {
    15
}

fn default_build_check_secs() -> u64 {
    10
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            source: default_source(),
            branch: String::new(),
            testpmd_path: default_testpmd_path(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup_secs(),
            disabled_hold_secs: default_disabled_hold_secs(),
            stable_hold_secs: default_stable_hold_secs(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            rescind_max_secs: default_rescind_max_secs(),
            send_receive_secs: default_send_receive_secs(),
            build_check_secs: default_build_check_secs(),
        }
    }
}

impl ProtocolConfig {
    /// Settle delays as durations.
    pub fn timings(&self) -> ProtocolTimings {
        ProtocolTimings {
            warmup: Duration::from_secs(self.warmup_secs),
            disabled_hold: Duration::from_secs(self.disabled_hold_secs),
            stable_hold: Duration::from_secs(self.stable_hold_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.name == name)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
