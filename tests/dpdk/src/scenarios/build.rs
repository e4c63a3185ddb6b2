//! DPDK build check: install, bind, transmit.

use failover_core::{classify, ExpectedPath, ForwardMode, PmdMode};

use super::secs;
use crate::environment::Environment;

/// Measured result of a build check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Node the check ran on.
    pub node: String,
    /// Mean transmit PPS.
    pub tx_pps: u64,
}

/// Build DPDK on the first node and verify testpmd transmits above 2^20 PPS
/// on the test interface with `pmd`.
pub async fn verify_build(env: &Environment, pmd: PmdMode) -> anyhow::Result<BuildReport> {
    let node = env.require_nodes(1)?.remove(0);
    let resources = env.initializer(pmd).initialize_one(node).await?;

    let command = resources
        .driver()
        .command(resources.nic(), ForwardMode::TxOnly, pmd)
        .build();
    resources
        .driver()
        .start(&command, secs(env.config().run.build_check_secs))
        .await?;

    let tx_pps = resources.driver().tx_pps()?;
    let nic = resources.nic();
    tracing::info!(
        "TX-PPS:{} from {}/{}:{}",
        tx_pps,
        nic.upper,
        nic.lower,
        nic.pci_slot
    );
    classify("TX", tx_pps, ExpectedPath::Accelerated)?;

    Ok(BuildReport {
        node: resources.name().to_string(),
        tx_pps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::fixtures::{mock_env, steady};
    use failover_core::ThroughputError;

    #[tokio::test(start_paused = true)]
    async fn passes_above_threshold() {
        let (env, nodes, _journal) = mock_env(1, &steady(1_500_000, 0, 4));

        let report = verify_build(&env, PmdMode::Failsafe).await.unwrap();
        assert_eq!(report.node, "node-0");
        assert_eq!(report.tx_pps, 1_500_000);
        assert!(!nodes[0].executed().iter().any(|c| c.contains("unbind")));
    }

    #[tokio::test(start_paused = true)]
    async fn fails_below_threshold() {
        let (env, _nodes, _journal) = mock_env(1, &steady(900_000, 0, 4));

        let err = verify_build(&env, PmdMode::Netvsc).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ThroughputError>(),
            Some(ThroughputError::Pps { pps: 900_000, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn runs_for_configured_duration() {
        let (env, _nodes, _journal) = mock_env(1, &steady(1_500_000, 0, 4));
        let begin = tokio::time::Instant::now();

        verify_build(&env, PmdMode::Failsafe).await.unwrap();
        assert!(begin.elapsed() >= secs(env.config().run.build_check_secs));
    }
}
