//! # failover-harness
//!
//! Multi-node DPDK workload orchestration with accelerated-networking fault
//! injection.
//!
//! This crate drives the I/O side of a failover test:
//! - per-node setup in parallel (hugepages, testpmd, interface binding)
//! - concurrent workload execution with a shared deadline
//! - the rescind/reenable protocol, gated on kernel log evidence
//!
//! Decisions and parsers live in `failover-core`; nodes, network controllers
//! and workload drivers are collaborators behind traits, with mock
//! implementations for tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod controller;
pub mod driver;
pub mod error;
pub mod node;
pub mod orchestrator;
pub mod pool;
pub mod resources;
pub mod telemetry;
pub mod watcher;

pub use controller::{CommandController, NetworkController};
pub use driver::{MockDriver, Testpmd, WorkloadDriver, WorkloadSource};
pub use error::HarnessError;
pub use node::{
    CommandOutput, ExecOptions, Journal, MockController, MockNode, Node, NodeError, SshNode,
};
pub use orchestrator::{send_receive_plan, Orchestrator, RunOutcome, WorkItem, WorkPlan};
pub use pool::TaskPool;
pub use resources::{DriverFactory, Initializer, NodeResources};
pub use watcher::LogWatcher;
