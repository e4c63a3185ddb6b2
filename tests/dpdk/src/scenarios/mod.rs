//! DPDK scenarios.
//!
//! | Module | Nodes | Checks |
//! |--------|-------|--------|
//! | `build` | 1 | TX > 2^20 PPS after a 10 s txonly run |
//! | `send_receive` | 2 remote | sender TX and receiver RX > 2^20 PPS |
//! | `rescind` | 1 or 2 | PPS above / below / above 2^20 around a VF rescind |
//! | `ring_ping` | 1 | 99.999th percentile latency < 200000 ns |
//!
//! Each module's live tests are `#[ignore = "requires sriov nodes"]`.
//!
//! Run: `FAILOVER_CONFIG=nodes.toml cargo test -p dpdk-suite -- --ignored`

pub mod build;
pub mod ring_ping;
pub mod send_receive;

pub use build::{verify_build, BuildReport};
pub use rescind::{verify_rescind_receiver, verify_rescind_send_only};
pub use ring_ping::verify_ring_ping;
pub use send_receive::{verify_send_receive, SendReceiveReport};

use std::time::Duration;

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Mock environments for scenario tests.

    use std::sync::Arc;

    use failover_core::Config;
    use failover_harness::{Journal, MockDriver, MockNode, Node, WorkloadDriver};

    use crate::environment::Environment;

    /// One testpmd statistics block.
    pub fn stats(tx: u64, rx: u64) -> String {
        format!(
            "  ######################## NIC statistics for port 0  ########################\n\
             \x20 Rx-pps:     {rx}          Rx-bps:  0\n\
             \x20 Tx-pps:     {tx}          Tx-bps:  0\n"
        )
    }

    /// Several blocks at the same rate.
    pub fn steady(tx: u64, rx: u64, blocks: usize) -> String {
        (0..blocks).map(|_| stats(tx, rx)).collect()
    }

    /// testpmd output of a run with a VF rescind in the middle.
    pub fn rescind_output(before: u64, during: u64, after: u64) -> String {
        format!(
            "{}Port 0: device removal event\n{}\
             EAL: PCI device 7870:00:02.0 on NUMA socket 0\n{}",
            steady(before, before, 3),
            steady(during, during, 3),
            steady(after, after, 3),
        )
    }

    /// `count` remote mock nodes whose workloads all print `output`.
    pub fn mock_env(count: usize, output: &str) -> (Environment, Vec<MockNode>, Journal) {
        let journal = Journal::new();
        let nodes: Vec<MockNode> = (0..count)
            .map(|i| {
                MockNode::new(&format!("node-{i}"))
                    .with_journal(journal.clone())
                    .with_test_ip(&format!("10.0.1.{}", i + 4))
            })
            .collect();
        let dyn_nodes = nodes
            .iter()
            .map(|n| Arc::new(n.clone()) as Arc<dyn Node>)
            .collect();

        let output = output.to_string();
        let factory_journal = journal.clone();
        let env = Environment::new(Config::default(), dyn_nodes).with_driver_factory(Arc::new(
            move |node: Arc<dyn Node>| {
                Arc::new(MockDriver::new(node.name(), factory_journal.clone(), &output))
                    as Arc<dyn WorkloadDriver>
            },
        ));
        (env, nodes, journal)
    }
}

#[cfg(test)]
mod live;
