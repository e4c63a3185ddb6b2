//! Error types for failover-harness.

use failover_core::{OutputError, ParseError, PathEvent, ProtocolStage};

use crate::node::NodeError;

/// Main error type for harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Command execution error.
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// Interface discovery output was malformed.
    #[error("interface discovery error: {0}")]
    Discovery(#[from] ParseError),

    /// testpmd output could not answer a counter query.
    #[error("workload output error: {0}")]
    Output(#[from] OutputError),

    /// Accelerated networking is off; the test environment is misconfigured.
    #[error("accelerated networking is disabled on {node}")]
    AcceleratedNetworkingDisabled {
        /// Node name.
        node: String,
    },

    /// No VF-backed interface was found.
    #[error("no accelerated network interfaces found on {node}")]
    NoNetworkInterfaces {
        /// Node name.
        node: String,
    },

    /// The configured test interface does not exist or has no VF.
    #[error("test interface {interface} not found on {node}")]
    TestInterfaceNotFound {
        /// Node name.
        node: String,
        /// Requested interface.
        interface: String,
    },

    /// The test interface has no IPv4 address to aim traffic at.
    #[error("test interface {interface} on {node} has no IPv4 address")]
    MissingIpAddress {
        /// Node name.
        node: String,
        /// Interface name.
        interface: String,
    },

    /// A multi-node scenario was given a local node.
    #[error("{node} is not a remote node")]
    NotRemote {
        /// Node name.
        node: String,
    },

    /// The kernel never reported the expected path change.
    #[error("{event} not observed on {node} during {stage} stage within {timeout_secs}s")]
    ConfirmationTimeout {
        /// Node name.
        node: String,
        /// Stage waiting for confirmation.
        stage: ProtocolStage,
        /// Awaited event.
        event: PathEvent,
        /// Wait limit in seconds.
        timeout_secs: u64,
    },

    /// A workload exited with an unexpected status.
    #[error("workload failed on {node}: exit={exit_code}, stderr={stderr}")]
    Workload {
        /// Node name.
        node: String,
        /// Exit code.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The worker pool was shut down underneath a task.
    #[error("worker pool closed")]
    PoolClosed,
}
