//! Per-node test resources and their initialization.
//!
//! Initialization of a node, in order:
//! 1. refuse nodes with accelerated networking off
//! 2. reserve and mount hugepages
//! 3. install the workload
//! 4. discover the accelerated interfaces and pick the test interface,
//!    first returning devices a netvsc run left on `uio_hv_generic`
//! 5. bind it to the driver the PMD needs
//!
//! Nodes are initialized concurrently; see [`Initializer::initialize_all`].

use std::sync::Arc;
use std::time::Duration;

use failover_core::{
    parse_detached_devices, parse_nic_listing, plan_binding, reclaim_commands, select_test_nic,
    BindPlan, Config, LogCursor, NicInfo, PathEvent, PmdMode, DISCOVERY_SCRIPT,
};

use crate::controller::NetworkController;
use crate::driver::{Testpmd, WorkloadDriver, WorkloadSource};
use crate::error::HarnessError;
use crate::node::{ExecOptions, Node, NodeError};
use crate::pool::TaskPool;
use crate::watcher::LogWatcher;

/// Hugepage setup: a 2MB and a 1GB hugetlbfs mount, 1024 2MB pages and one
/// 1GB page on NUMA node 0.
pub const HUGEPAGE_COMMANDS: [&str; 4] = [
    "mountpoint -q /mnt/huge || (mkdir -p /mnt/huge && mount -t hugetlbfs nodev /mnt/huge)",
    "mountpoint -q /mnt/huge-1G || (mkdir -p /mnt/huge-1G && mount -t hugetlbfs -o pagesize=1G nodev /mnt/huge-1G)",
    "echo 1024 > /sys/devices/system/node/node0/hugepages/hugepages-2048kB/nr_hugepages",
    "echo 1 > /sys/devices/system/node/node0/hugepages/hugepages-1048576kB/nr_hugepages",
];

/// Time for a reclaimed device's netdev to appear and re-enslave its VF.
pub const RECLAIM_SETTLE: Duration = Duration::from_secs(5);

/// Builds the workload driver for a node.
pub type DriverFactory = Arc<dyn Fn(Arc<dyn Node>) -> Arc<dyn WorkloadDriver> + Send + Sync>;

/// Everything a test needs about one initialized node.
pub struct NodeResources {
    node: Arc<dyn Node>,
    nic: NicInfo,
    driver: Arc<dyn WorkloadDriver>,
    controller: Arc<dyn NetworkController>,
    watcher: LogWatcher,
}

impl NodeResources {
    /// Bundle a node with its test interface and driver.
    pub fn new(
        node: Arc<dyn Node>,
        nic: NicInfo,
        driver: Arc<dyn WorkloadDriver>,
        poll_interval: Duration,
    ) -> Self {
        let controller = node.network_controller();
        let watcher = LogWatcher::new(&nic, poll_interval);
        Self {
            node,
            nic,
            driver,
            controller,
            watcher,
        }
    }

    /// Treat `cursor` as already scanned by the log watcher.
    pub fn with_cursor(mut self, cursor: LogCursor) -> Self {
        self.watcher = self.watcher.with_cursor(cursor);
        self
    }

    /// Node name.
    pub fn name(&self) -> &str {
        self.node.name()
    }

    /// The node.
    pub fn node(&self) -> &Arc<dyn Node> {
        &self.node
    }

    /// Interface under test.
    pub fn nic(&self) -> &NicInfo {
        &self.nic
    }

    /// Workload driver.
    pub fn driver(&self) -> &Arc<dyn WorkloadDriver> {
        &self.driver
    }

    /// Accelerated networking controller.
    pub fn controller(&self) -> &Arc<dyn NetworkController> {
        &self.controller
    }

    /// Kernel log watcher.
    pub fn watcher(&self) -> &LogWatcher {
        &self.watcher
    }

    /// Wait for `event` on this node's test interface.
    pub async fn wait_for(&mut self, event: PathEvent, timeout: Duration) -> Result<bool, NodeError> {
        self.watcher
            .wait_for(self.node.as_ref(), event, timeout)
            .await
    }
}

impl std::fmt::Debug for NodeResources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeResources")
            .field("node", &self.node.name())
            .field("nic", &self.nic)
            .finish_non_exhaustive()
    }
}

/// Prepares nodes for a scenario.
#[derive(Clone)]
pub struct Initializer {
    config: Arc<Config>,
    pmd: PmdMode,
    driver_factory: DriverFactory,
}

impl Initializer {
    /// Initializer installing testpmd from the configured source.
    pub fn new(config: Arc<Config>, pmd: PmdMode) -> Self {
        let binary = config.workload.testpmd_path.clone();
        let driver_factory: DriverFactory = Arc::new(move |node: Arc<dyn Node>| {
            Arc::new(Testpmd::new(node, binary.clone())) as Arc<dyn WorkloadDriver>
        });
        Self {
            config,
            pmd,
            driver_factory,
        }
    }

    /// Use `factory` to build workload drivers.
    pub fn with_driver_factory(mut self, factory: DriverFactory) -> Self {
        self.driver_factory = factory;
        self
    }

    /// PMD the nodes are prepared for.
    pub fn pmd(&self) -> PmdMode {
        self.pmd
    }

    /// Initialize every node concurrently.
    ///
    /// Results come back in the order of `nodes`. All nodes are driven to
    /// completion; the first failure is returned.
    pub async fn initialize_all(
        &self,
        nodes: Vec<Arc<dyn Node>>,
    ) -> Result<Vec<NodeResources>, HarnessError> {
        let mut pool = TaskPool::new(nodes.len());
        for (index, node) in nodes.into_iter().enumerate() {
            let init = self.clone();
            pool.submit(async move { Ok((index, init.initialize_one(node).await?)) });
        }

        let mut initialized = Vec::new();
        pool.wait(|done| initialized.push(done)).await?;
        initialized.sort_by_key(|(index, _)| *index);
        Ok(initialized.into_iter().map(|(_, r)| r).collect())
    }

    /// Initialize one node.
    pub async fn initialize_one(&self, node: Arc<dyn Node>) -> Result<NodeResources, HarnessError> {
        let name = node.name().to_string();
        tracing::info!(node = %name, pmd = %self.pmd, "initializing node");

        let controller = node.network_controller();
        if !controller.is_accelerated_enabled().await? {
            return Err(HarnessError::AcceleratedNetworkingDisabled { node: name });
        }

        let lspci = node.execute("lspci", ExecOptions::user()).await?;
        tracing::debug!(node = %name, "pci devices:\n{}", lspci.stdout);

        init_hugepages(node.as_ref()).await?;

        let driver = (self.driver_factory)(Arc::clone(&node));
        driver
            .install(&WorkloadSource::from_config(&self.config.workload))
            .await?;

        let mut nic = self.discover_test_nic(node.as_ref()).await?;
        bind_nic(node.as_ref(), &mut nic, self.pmd).await?;

        // Events logged before the run must not confirm anything.
        let cursor = LogCursor::at(node.kernel_log().await?);
        let resources = NodeResources::new(
            node,
            nic,
            driver,
            self.config.protocol.timings().poll_interval,
        )
        .with_cursor(cursor);

        tracing::info!(
            node = %name,
            upper = %resources.nic().upper,
            lower = %resources.nic().lower,
            pci = %resources.nic().pci_slot,
            "node ready"
        );
        Ok(resources)
    }

    async fn discover_test_nic(&self, node: &dyn Node) -> Result<NicInfo, HarnessError> {
        let mut listing = node.execute_ok(DISCOVERY_SCRIPT, ExecOptions::sudo()).await?;
        if reclaim_detached(node, &listing.stdout).await? {
            tokio::time::sleep(RECLAIM_SETTLE).await;
            listing = node.execute_ok(DISCOVERY_SCRIPT, ExecOptions::sudo()).await?;
        }
        let nics = parse_nic_listing(&listing.stdout)?;
        if nics.is_empty() {
            return Err(HarnessError::NoNetworkInterfaces {
                node: node.name().to_string(),
            });
        }

        let preferred = self.config.nic.test_interface.as_deref();
        select_test_nic(&nics, preferred)
            .cloned()
            .ok_or_else(|| HarnessError::TestInterfaceNotFound {
                node: node.name().to_string(),
                interface: preferred.unwrap_or_default().to_string(),
            })
    }
}

/// Return every device in `listing` that is off `hv_netvsc` to it.
///
/// Such a device has no interface name, so it cannot be selected, and the
/// management interface could be picked in its place. Returns whether
/// anything was rebound.
async fn reclaim_detached(node: &dyn Node, listing: &str) -> Result<bool, HarnessError> {
    let detached = parse_detached_devices(listing)?;
    for device in &detached {
        tracing::warn!(
            node = %node.name(),
            device = %device.device_id,
            driver = device.driver.as_deref().unwrap_or("none"),
            "returning detached device to hv_netvsc"
        );
        for command in reclaim_commands(device) {
            node.execute_ok(&command, ExecOptions::sudo()).await?;
        }
    }
    Ok(!detached.is_empty())
}

/// Mount hugetlbfs and reserve hugepages on `node`.
pub async fn init_hugepages(node: &dyn Node) -> Result<(), NodeError> {
    for command in HUGEPAGE_COMMANDS {
        node.execute_ok(command, ExecOptions::sudo()).await?;
    }
    Ok(())
}

/// Put `nic` on the kernel driver `pmd` needs. A no-op when it already is.
pub async fn bind_nic(node: &dyn Node, nic: &mut NicInfo, pmd: PmdMode) -> Result<(), NodeError> {
    let plan = plan_binding(nic, pmd);
    let BindPlan::Rebind { from, to } = &plan else {
        tracing::debug!(node = %node.name(), driver = %nic.bound_driver, "interface already bound");
        return Ok(());
    };

    tracing::info!(node = %node.name(), device = %nic.device_id, from = %from, to = %to, "rebinding interface");
    for command in plan.commands(nic) {
        node.execute_ok(&command, ExecOptions::sudo()).await?;
    }
    nic.bound_driver = to.to_string();
    Ok(())
}
