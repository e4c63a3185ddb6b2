//! Live scenarios against real SR-IOV nodes.
//!
//! Run with `FAILOVER_CONFIG=nodes.toml cargo test -p dpdk-suite -- --ignored`.
//! Scenarios share the nodes, so they run one at a time.

use failover_core::PmdMode;
use serial_test::serial;

use super::*;
use crate::environment::Environment;

fn live_env() -> Environment {
    failover_harness::telemetry::init_for_tests();
    Environment::from_env().unwrap()
}

// =========================================================================
// Build
// =========================================================================

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn build_netvsc() {
    let report = verify_build(&live_env(), PmdMode::Netvsc).await.unwrap();
    tracing::info!(?report, "build netvsc passed");
}

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn build_failsafe() {
    let report = verify_build(&live_env(), PmdMode::Failsafe).await.unwrap();
    tracing::info!(?report, "build failsafe passed");
}

// =========================================================================
// Send / receive
// =========================================================================

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn send_receive_failsafe() {
    verify_send_receive(&live_env(), PmdMode::Failsafe, 1)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn send_receive_failsafe_multiq() {
    verify_send_receive(&live_env(), PmdMode::Failsafe, 16)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn send_receive_netvsc() {
    verify_send_receive(&live_env(), PmdMode::Netvsc, 1)
        .await
        .unwrap();
}

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn send_receive_netvsc_multiq() {
    verify_send_receive(&live_env(), PmdMode::Netvsc, 16)
        .await
        .unwrap();
}

// =========================================================================
// Rescind
// =========================================================================

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn rescind_receiver() {
    verify_rescind_receiver(&live_env()).await.unwrap();
}

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn rescind_send_only() {
    verify_rescind_send_only(&live_env()).await.unwrap();
}

// =========================================================================
// Ring ping
// =========================================================================

#[tokio::test]
#[ignore = "requires sriov nodes"]
#[serial]
async fn ring_ping() {
    let latency_ns = verify_ring_ping(&live_env()).await.unwrap();
    tracing::info!(latency_ns, "ring ping passed");
}
