//! Concurrent workload runs with accelerated path fault injection.
//!
//! Every node's workload is started on the worker pool. With fault injection
//! on, the orchestrator then walks [`ProtocolStage`] in order while the
//! workloads run:
//!
//! ```text
//! Warmup ─hold─► Disabling ─► Disabled ─confirm,hold─► Reenabling ─► Stable ─confirm,hold─► Terminating
//! ```
//!
//! Each toggle and each confirmation fans out over all nodes before the next
//! stage starts, so no node is re-enabled before every node confirmed the
//! disable.

use std::collections::BTreeMap;
use std::time::Duration;

use failover_core::{Config, ForwardMode, PathEvent, PmdMode, ProtocolStage, ProtocolTimings};

use crate::error::HarnessError;
use crate::pool::TaskPool;
use crate::resources::NodeResources;

/// A node and the workload command it runs.
#[derive(Debug)]
pub struct WorkItem {
    /// The node.
    pub resources: NodeResources,
    /// Shell command line of the workload.
    pub command: String,
}

/// The workloads of one run, one per node.
#[derive(Debug, Default)]
pub struct WorkPlan {
    items: Vec<WorkItem>,
}

impl WorkPlan {
    /// Create an empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node running `command`.
    pub fn push(&mut self, resources: NodeResources, command: impl Into<String>) {
        self.items.push(WorkItem {
            resources,
            command: command.into(),
        });
    }

    /// Number of nodes in the plan.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the plan has no nodes.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Planned items, in insertion order.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    /// Resources of the node called `name`.
    pub fn resources(&self, name: &str) -> Option<&NodeResources> {
        self.items
            .iter()
            .map(|item| &item.resources)
            .find(|r| r.name() == name)
    }

    /// Give the node resources back, in insertion order.
    pub fn into_resources(self) -> Vec<NodeResources> {
        self.items.into_iter().map(|item| item.resources).collect()
    }
}

/// Result of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// Workload output per node name.
    pub outputs: BTreeMap<String, String>,
    /// Protocol stages visited, in order. Empty without fault injection.
    pub stages: Vec<ProtocolStage>,
}

impl RunOutcome {
    /// Output of the node called `name`.
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }
}

/// Runs workload plans, optionally rescinding the accelerated path midway.
#[derive(Debug, Clone, Copy, Default)]
pub struct Orchestrator {
    timings: ProtocolTimings,
}

impl Orchestrator {
    /// Create an orchestrator with the given stage holds.
    pub fn new(timings: ProtocolTimings) -> Self {
        Self { timings }
    }

    /// Create an orchestrator from the `[protocol]` config section.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.protocol.timings())
    }

    /// Stage holds in use.
    pub fn timings(&self) -> ProtocolTimings {
        self.timings
    }

    /// Run every workload in `plan` for at most `duration`.
    ///
    /// With `fault_inject`, the rescind/reenable protocol runs while the
    /// workloads do and stops them once the accelerated path is back.
    ///
    /// If a confirmation times out, workloads are told to terminate
    /// (best effort) and the timeout is returned without waiting for them.
    pub async fn run(
        &self,
        plan: &mut WorkPlan,
        duration: Duration,
        fault_inject: bool,
    ) -> Result<RunOutcome, HarnessError> {
        let mut pool = TaskPool::new(plan.len());
        for item in plan.items() {
            let driver = item.resources.driver().clone();
            let name = item.resources.name().to_string();
            let command = item.command.clone();
            pool.submit(async move {
                let output = driver.start(&command, duration).await?;
                Ok((name, output))
            });
        }
        tracing::info!(nodes = plan.len(), secs = duration.as_secs(), fault_inject, "workloads started");

        let mut stages = Vec::new();
        if fault_inject {
            if let Err(e) = self.rescind(plan, duration, &mut stages).await {
                tracing::error!(error = %e, "rescind protocol failed; terminating workloads");
                self.terminate_all(plan).await;
                return Err(e);
            }
        }

        let mut outputs = BTreeMap::new();
        pool.wait(|(name, output)| {
            outputs.insert(name, output);
        })
        .await?;
        tracing::info!(nodes = outputs.len(), "workloads finished");

        Ok(RunOutcome { outputs, stages })
    }

    async fn rescind(
        &self,
        plan: &mut WorkPlan,
        duration: Duration,
        stages: &mut Vec<ProtocolStage>,
    ) -> Result<(), HarnessError> {
        for stage in ProtocolStage::sequence() {
            tracing::info!(stage = %stage, "entering stage");
            stages.push(stage);

            match stage {
                ProtocolStage::Disabling => set_accelerated(plan, false).await?,
                ProtocolStage::Reenabling => set_accelerated(plan, true).await?,
                ProtocolStage::Terminating => {
                    for item in plan.items() {
                        item.resources.driver().terminate_current().await?;
                    }
                }
                ProtocolStage::Warmup | ProtocolStage::Disabled | ProtocolStage::Stable => {}
            }

            if let Some(event) = stage.confirmation() {
                confirm(plan, stage, event, event.timeout(duration)).await?;
            }
            if let Some(hold) = self.timings.hold(stage) {
                tokio::time::sleep(hold).await;
            }
        }
        Ok(())
    }

    async fn terminate_all(&self, plan: &WorkPlan) {
        for item in plan.items() {
            if let Err(e) = item.resources.driver().terminate_current().await {
                tracing::warn!(node = %item.resources.name(), error = %e, "terminate failed");
            }
        }
    }
}

async fn set_accelerated(plan: &WorkPlan, enabled: bool) -> Result<(), HarnessError> {
    for item in plan.items() {
        item.resources.controller().set_accelerated(enabled).await?;
    }
    Ok(())
}

/// Wait for `event` on every node, one after another.
async fn confirm(
    plan: &mut WorkPlan,
    stage: ProtocolStage,
    event: PathEvent,
    timeout: Duration,
) -> Result<(), HarnessError> {
    for item in plan.items.iter_mut() {
        if !item.resources.wait_for(event, timeout).await? {
            return Err(HarnessError::ConfirmationTimeout {
                node: item.resources.name().to_string(),
                stage,
                event,
                timeout_secs: timeout.as_secs(),
            });
        }
    }
    Ok(())
}

/// Plan a sender/receiver pair: the sender transmits to the receiver's test
/// interface, the receiver counts what arrives.
pub fn send_receive_plan(
    pmd: PmdMode,
    sender: NodeResources,
    receiver: NodeResources,
    txq: u32,
    rxq: u32,
) -> Result<WorkPlan, HarnessError> {
    let src = ip_of(&sender)?;
    let dst = ip_of(&receiver)?;

    let send_cmd = sender
        .driver()
        .command(sender.nic(), ForwardMode::TxOnly, pmd)
        .tx_ip(&src, &dst)
        .txq(txq)
        .rxq(rxq)
        .build();
    let recv_cmd = receiver
        .driver()
        .command(receiver.nic(), ForwardMode::RxOnly, pmd)
        .txq(txq)
        .rxq(rxq)
        .build();

    let mut plan = WorkPlan::new();
    plan.push(sender, send_cmd);
    plan.push(receiver, recv_cmd);
    Ok(plan)
}

fn ip_of(resources: &NodeResources) -> Result<String, HarnessError> {
    resources
        .nic()
        .ip_addr
        .clone()
        .ok_or_else(|| HarnessError::MissingIpAddress {
            node: resources.name().to_string(),
            interface: resources.nic().upper.clone(),
        })
}
