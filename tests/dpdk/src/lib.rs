//! # dpdk-suite
//!
//! DPDK accelerated networking scenarios.
//!
//! Every scenario initializes its nodes, runs testpmd (or the ring ping
//! utility) and checks the measured throughput or latency:
//! - `build`: DPDK builds, and testpmd transmits above 2^20 PPS
//! - `send_receive`: two nodes, sender and receiver both above 2^20 PPS
//! - `rescind`: VF rescind mid-run, throughput drops and recovers
//! - `ring_ping`: 99.999th percentile ring latency under 200us
//!
//! Live runs need SR-IOV nodes described by the file `FAILOVER_CONFIG` points
//! to; see [`environment::Environment::from_env`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod environment;
pub mod scenarios;

pub use environment::{Environment, CONFIG_ENV};
