//! Ring latency with dpdk-ring-ping.
//!
//! dpdk-ring-ping bounces messages between two lcores over DPDK rings and
//! prints latency percentiles; no NIC is involved.

use anyhow::Context;
use failover_core::{check_ring_ping_latency, parse_ring_ping_percentile, PmdMode};
use failover_harness::driver::DPDK_SOURCE_DIR;
use failover_harness::ExecOptions;

use crate::environment::Environment;

/// dpdk-ring-ping upstream.
pub const RING_PING_REPO: &str = "https://github.com/shemminger/dpdk-ring-ping.git";

/// Checkout directory, relative to the login user's home.
pub const RING_PING_DIR: &str = "dpdk-ring-ping";

/// Two lcores, no PCI devices, no hugepages; 5 s delay, 10 s run.
pub const RING_PING_COMMAND: &str =
    "./build/rping -c 0x03 -n 2 --no-pci --no-huge -- -d 5 -t 10";

/// Build dpdk-ring-ping against the installed DPDK on the first node and
/// verify the 99.999th percentile latency is under 200000 ns.
pub async fn verify_ring_ping(env: &Environment) -> anyhow::Result<u64> {
    let node = env.require_nodes(1)?.remove(0);
    let resources = env
        .initializer(PmdMode::Failsafe)
        .initialize_one(node)
        .await?;
    let node = resources.node();

    let build_env = format!("RTE_TARGET=build RTE_SDK=$HOME/{DPDK_SOURCE_DIR}");
    node.execute_ok(
        &format!("rm -rf {RING_PING_DIR} && git clone {RING_PING_REPO} {RING_PING_DIR}"),
        ExecOptions::user(),
    )
    .await?;
    node.execute_ok(
        &format!("cd {RING_PING_DIR} && {build_env} make"),
        ExecOptions::user(),
    )
    .await
    .context("make could not build rping project")?;

    let result = node
        .execute_ok(
            &format!("cd {RING_PING_DIR} && {RING_PING_COMMAND}"),
            ExecOptions::user(),
        )
        .await
        .context("rping program failed to run correctly")?;

    let measured_ns = parse_ring_ping_percentile(&result.stdout).with_context(|| {
        format!(
            "could not get latency data from rping result, searched for \
             'percentile 99.999 = ([0-9]+)'\n{}",
            result.stdout
        )
    })?;
    tracing::info!(node = %node.name(), measured_ns, "ring ping 99.999th percentile");
    check_ring_ping_latency(measured_ns)?;
    Ok(measured_ns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::fixtures::mock_env;
    use failover_core::ThroughputError;
    use failover_harness::CommandOutput;

    const RPING_OUTPUT: &str = "\
min latency = 310
max latency = 84013
percentile 99.999 = 12302
";

    #[tokio::test(start_paused = true)]
    async fn low_latency_passes() {
        let (env, nodes, _journal) = mock_env(1, "");
        nodes[0].respond("./build/rping", CommandOutput::ok(RPING_OUTPUT));

        assert_eq!(verify_ring_ping(&env).await.unwrap(), 12302);

        let executed = nodes[0].executed();
        assert!(executed.iter().any(|c| c.contains(&format!("git clone {RING_PING_REPO}"))));
        assert!(executed
            .iter()
            .any(|c| c.contains("RTE_TARGET=build RTE_SDK=$HOME/dpdk make")));
    }

    #[tokio::test(start_paused = true)]
    async fn high_latency_fails() {
        let (env, nodes, _journal) = mock_env(1, "");
        nodes[0].respond(
            "./build/rping",
            CommandOutput::ok("percentile 99.999 = 250000\n"),
        );

        let err = verify_ring_ping(&env).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ThroughputError>(),
            Some(ThroughputError::Latency { measured_ns: 250000, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_percentile_is_error() {
        let (env, nodes, _journal) = mock_env(1, "");
        nodes[0].respond("./build/rping", CommandOutput::ok("EAL: init done\n"));

        let err = verify_ring_ping(&env).await.unwrap_err();
        assert!(err.to_string().contains("could not get latency data"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_build_is_reported() {
        let (env, nodes, _journal) = mock_env(1, "");
        nodes[0].respond("RTE_TARGET=build", CommandOutput::failed(2, "rte.vars.mk: No such file"));

        let err = verify_ring_ping(&env).await.unwrap_err();
        assert!(err.to_string().contains("make could not build rping project"));
    }
}
