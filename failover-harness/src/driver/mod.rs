//! Workload drivers.
//!
//! A [`WorkloadDriver`] installs and runs the traffic generator on one node
//! and answers throughput queries about its last run.
//!
//! Available implementations:
//! - [`Testpmd`]: DPDK testpmd over [`Node`](crate::node::Node) (production)
//! - [`MockDriver`]: scripted output, blocks until terminated (testing)

mod mock;
mod testpmd;

pub use mock::MockDriver;
pub use testpmd::{Testpmd, DPDK_SOURCE_DIR};

use std::time::Duration;

use async_trait::async_trait;
use failover_core::{
    ForwardMode, NicInfo, PmdMode, RescindSamples, TestpmdCommand, TestpmdOutput, WorkloadConfig,
    DEFAULT_WORKLOAD_SOURCE,
};

use crate::error::HarnessError;

/// Where the workload is installed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSource {
    /// Git repository URL.
    pub repo: String,
    /// Branch; empty for the default branch.
    pub branch: String,
}

impl WorkloadSource {
    /// Build from the `[workload]` config section.
    pub fn from_config(config: &WorkloadConfig) -> Self {
        Self {
            repo: config.source.clone(),
            branch: config.branch.clone(),
        }
    }

    /// Whether a repository or branch other than the default was asked for.
    pub fn is_override(&self) -> bool {
        self.repo != DEFAULT_WORKLOAD_SOURCE || !self.branch.is_empty()
    }
}

/// Traffic generator bound to one node.
#[async_trait]
pub trait WorkloadDriver: Send + Sync {
    /// Install the workload if it is not already present.
    async fn install(&self, source: &WorkloadSource) -> Result<(), HarnessError>;

    /// Command builder for this driver's binary.
    fn command(&self, nic: &NicInfo, mode: ForwardMode, pmd: PmdMode) -> TestpmdCommand;

    /// Run `command` for at most `duration` and return its output.
    ///
    /// Returns early when [`WorkloadDriver::terminate_current`] is called.
    async fn start(&self, command: &str, duration: Duration) -> Result<String, HarnessError>;

    /// Stop the running workload, if any.
    async fn terminate_current(&self) -> Result<(), HarnessError>;

    /// Output of the last completed run.
    fn last_output(&self) -> TestpmdOutput;

    /// Mean transmit PPS of the last run.
    fn tx_pps(&self) -> Result<u64, HarnessError> {
        Ok(self.last_output().tx_pps()?)
    }

    /// Mean receive PPS of the last run.
    fn rx_pps(&self) -> Result<u64, HarnessError> {
        Ok(self.last_output().rx_pps()?)
    }

    /// Transmit PPS before, during and after the VF rescind.
    fn tx_pps_rescind(&self) -> Result<RescindSamples, HarnessError> {
        Ok(self.last_output().tx_pps_rescind()?)
    }

    /// Receive PPS before, during and after the VF rescind.
    fn rx_pps_rescind(&self) -> Result<RescindSamples, HarnessError> {
        Ok(self.last_output().rx_pps_rescind()?)
    }
}
