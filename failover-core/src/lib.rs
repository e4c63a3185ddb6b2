//! # failover-core
//!
//! Pure logic for the accelerated-networking failover harness (no I/O, instant tests).
//!
//! This crate implements the decisions and parsers the harness relies on
//! without touching any node, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects:
//! - `cursor` diffs kernel log snapshots so an event is observed exactly once
//! - `stage` is the rescind/reenable stage machine
//! - `throughput` classifies PPS samples against the 2^20 threshold
//! - `nic` and `pmd` parse interface discovery and plan driver binding
//! - `testpmd` builds testpmd command lines and parses their output
//!
//! The actual I/O (ssh, sleeps, log polling) is performed by `failover-harness`,
//! which interprets the plans produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod cursor;
pub mod nic;
pub mod pmd;
pub mod stage;
pub mod testpmd;
pub mod throughput;

pub use config::{
    Config, ConfigError, NicConfig, NodeConfig, ProtocolConfig, RunConfig, WorkloadConfig,
    DEFAULT_WORKLOAD_SOURCE,
};
pub use cursor::LogCursor;
pub use nic::{
    parse_detached_devices, parse_nic_listing, select_test_nic, DetachedDevice, NicInfo, ParseError,
    DISCOVERY_SCRIPT,
};
pub use pmd::{
    plan_binding, reclaim_commands, BindPlan, PmdMode, UnknownPmd, HV_UIO_GENERIC_UUID,
};
pub use stage::{PathEvent, ProtocolStage, ProtocolTimings};
pub use testpmd::{ForwardMode, OutputError, RescindSamples, TestpmdCommand, TestpmdOutput};
pub use throughput::{
    check_ring_ping_latency, classify, classify_rescind, parse_ring_ping_percentile,
    ExpectedPath, ThroughputError, MAX_RING_PING_LIMIT_NS, PPS_THRESHOLD,
};
