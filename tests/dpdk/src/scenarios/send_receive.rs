//! Two-node send/receive throughput.

use failover_core::{classify, ExpectedPath, PmdMode};
use failover_harness::{send_receive_plan, Orchestrator};

use super::secs;
use crate::environment::Environment;

/// Measured result of a send/receive run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceiveReport {
    /// Mean transmit PPS of the sender.
    pub sender_tx_pps: u64,
    /// Mean receive PPS of the receiver.
    pub receiver_rx_pps: u64,
}

/// Run txonly on the first node against rxonly on the second, with `queues`
/// TX and RX queues each, and verify both sides exceed 2^20 PPS.
///
/// Both nodes must be remote machines.
pub async fn verify_send_receive(
    env: &Environment,
    pmd: PmdMode,
    queues: u32,
) -> anyhow::Result<SendReceiveReport> {
    let nodes = env.require_remote_nodes(2)?;
    let mut initialized = env.initializer(pmd).initialize_all(nodes).await?;
    let receiver = initialized.remove(1);
    let sender = initialized.remove(0);
    let (sender_name, receiver_name) = (sender.name().to_string(), receiver.name().to_string());

    let mut plan = send_receive_plan(pmd, sender, receiver, queues, queues)?;
    let outcome = Orchestrator::from_config(env.config())
        .run(&mut plan, secs(env.config().run.send_receive_secs), false)
        .await?;

    tracing::debug!(
        "\nSENDER:\n{}",
        outcome.output(&sender_name).unwrap_or_default()
    );
    tracing::debug!(
        "\nRECEIVER:\n{}",
        outcome.output(&receiver_name).unwrap_or_default()
    );

    let [sender, receiver] = plan.items() else {
        anyhow::bail!("send/receive plan must hold exactly two nodes");
    };
    let receiver_rx_pps = receiver.resources.driver().rx_pps()?;
    let sender_tx_pps = sender.resources.driver().tx_pps()?;
    tracing::info!(receiver_rx_pps, sender_tx_pps, queues, pmd = %pmd, "send/receive measured");

    // NIC types differ in throughput; 2^20 PPS is the baseline for both sides.
    classify("RX", receiver_rx_pps, ExpectedPath::Accelerated)?;
    classify("TX", sender_tx_pps, ExpectedPath::Accelerated)?;

    Ok(SendReceiveReport {
        sender_tx_pps,
        receiver_rx_pps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::fixtures::{mock_env, steady};
    use failover_core::ThroughputError;
    use failover_harness::{HarnessError, MockDriver, Node, WorkloadDriver};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn both_sides_above_threshold() {
        let (env, _nodes, journal) = mock_env(2, &steady(2_000_000, 1_800_000, 5));

        let report = verify_send_receive(&env, PmdMode::Failsafe, 1)
            .await
            .unwrap();
        assert_eq!(report.sender_tx_pps, 2_000_000);
        assert_eq!(report.receiver_rx_pps, 1_800_000);
        assert_eq!(journal.count("start:node-0"), 1);
        assert_eq!(journal.count("start:node-1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sender_targets_receiver_with_queues() {
        let (env, _nodes, _journal) = mock_env(2, "");
        let drivers = Arc::new(std::sync::Mutex::new(Vec::<MockDriver>::new()));
        let seen = Arc::clone(&drivers);
        let output = steady(2_000_000, 1_800_000, 5);
        let journal = failover_harness::Journal::new();
        let env = env.with_driver_factory(Arc::new(move |node: Arc<dyn Node>| {
            let driver = MockDriver::new(node.name(), journal.clone(), &output);
            seen.lock().unwrap().push(driver.clone());
            Arc::new(driver) as Arc<dyn WorkloadDriver>
        }));

        verify_send_receive(&env, PmdMode::Netvsc, 16).await.unwrap();

        let drivers = drivers.lock().unwrap();
        let all: Vec<String> = drivers.iter().flat_map(|d| d.commands()).collect();
        let send = all.iter().find(|c| c.contains("txonly")).unwrap();
        let recv = all.iter().find(|c| c.contains("rxonly")).unwrap();
        assert!(send.contains("--tx-ip=10.0.1.4,10.0.1.5"));
        assert!(send.contains("--txq=16") && send.contains("--rxq=16"));
        assert!(recv.contains("--txq=16") && recv.contains("--rxq=16"));
        assert!(!send.contains("net_vdev_netvsc"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_receiver_fails() {
        let (env, _nodes, _journal) = mock_env(2, &steady(2_000_000, 500_000, 5));

        let err = verify_send_receive(&env, PmdMode::Failsafe, 1)
            .await
            .unwrap_err();
        match err.downcast_ref::<ThroughputError>() {
            Some(ThroughputError::Pps { tag, pps, .. }) => {
                assert_eq!(tag, "RX");
                assert_eq!(*pps, 500_000);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn local_node_is_rejected_before_setup() {
        let (env, nodes, journal) = mock_env(2, &steady(2_000_000, 2_000_000, 5));
        nodes[0].set_remote(false);

        let err = verify_send_receive(&env, PmdMode::Failsafe, 1)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HarnessError>(),
            Some(HarnessError::NotRemote { .. })
        ));
        assert!(journal.entries().is_empty());
    }
}
