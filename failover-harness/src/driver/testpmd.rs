//! DPDK testpmd driver.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use failover_core::{ForwardMode, NicInfo, PmdMode, TestpmdCommand, TestpmdOutput};

use super::{WorkloadDriver, WorkloadSource};
use crate::error::HarnessError;
use crate::node::{ExecOptions, Node};

/// Packages needed to build DPDK from source.
const BUILD_PACKAGES: &str =
    "build-essential git meson ninja-build pkg-config python3-pyelftools libnuma-dev";

/// DPDK checkout directory, relative to the login user's home.
pub const DPDK_SOURCE_DIR: &str = "dpdk";

/// Extra time granted to a run past its duration before the ssh session is
/// torn down.
const RUN_GRACE: Duration = Duration::from_secs(60);

const INSTALL_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// `timeout` exits 124 when it had to deliver the signal; testpmd itself
/// exits 130 when interrupted by `killall`.
const ACCEPTED_EXIT_CODES: [i32; 3] = [0, 124, 130];

/// testpmd on one node.
pub struct Testpmd {
    node: Arc<dyn Node>,
    binary: String,
    last_output: Mutex<TestpmdOutput>,
}

impl Testpmd {
    /// Create a driver running `binary` on `node`.
    pub fn new(node: Arc<dyn Node>, binary: impl Into<String>) -> Self {
        Self {
            node,
            binary: binary.into(),
            last_output: Mutex::new(TestpmdOutput::default()),
        }
    }

    fn process_name(&self) -> &str {
        self.binary.rsplit('/').next().unwrap_or(&self.binary)
    }

    fn clone_command(source: &WorkloadSource) -> String {
        let branch = if source.branch.is_empty() {
            String::new()
        } else {
            format!(" --branch {}", source.branch)
        };
        format!(
            "rm -rf {dir} && git clone --depth 1{branch} {repo} {dir}",
            dir = DPDK_SOURCE_DIR,
            repo = source.repo
        )
    }
}

#[async_trait]
impl WorkloadDriver for Testpmd {
    async fn install(&self, source: &WorkloadSource) -> Result<(), HarnessError> {
        let probe = self
            .node
            .execute(&format!("command -v {}", self.binary), ExecOptions::user())
            .await?;
        if probe.success() {
            tracing::info!(node = %self.node.name(), "testpmd already installed at {}", probe.stdout.trim());
            if source.is_override() {
                // The installed build is used as is; remove it to rebuild from the override.
                tracing::warn!(
                    node = %self.node.name(),
                    repo = %source.repo,
                    branch = %source.branch,
                    "workload source override ignored: testpmd is already installed"
                );
            }
            return Ok(());
        }

        tracing::info!(node = %self.node.name(), repo = %source.repo, "building DPDK from source");
        let install = ExecOptions::sudo().timeout(INSTALL_TIMEOUT);
        self.node
            .execute_ok(
                &format!("apt-get update && apt-get install -y {BUILD_PACKAGES}"),
                install,
            )
            .await?;
        self.node
            .execute_ok(&Self::clone_command(source), ExecOptions::user())
            .await?;
        self.node
            .execute_ok(
                &format!("cd {DPDK_SOURCE_DIR} && meson setup build && ninja -C build"),
                ExecOptions::user().timeout(INSTALL_TIMEOUT),
            )
            .await?;
        self.node
            .execute_ok(
                &format!("cd {DPDK_SOURCE_DIR} && ninja -C build install && ldconfig"),
                install,
            )
            .await?;

        // Fails with the node's error if the build did not produce the binary.
        self.node
            .execute_ok(&format!("command -v {}", self.binary), ExecOptions::user())
            .await?;
        tracing::info!(node = %self.node.name(), "DPDK installed");
        Ok(())
    }

    fn command(&self, nic: &NicInfo, mode: ForwardMode, pmd: PmdMode) -> TestpmdCommand {
        TestpmdCommand::new(&self.binary, nic, mode, pmd)
    }

    async fn start(&self, command: &str, duration: Duration) -> Result<String, HarnessError> {
        let secs = duration.as_secs().max(1);
        let wrapped = format!("timeout -s INT {secs} {command}");
        tracing::info!(node = %self.node.name(), secs, "starting testpmd");

        let output = self
            .node
            .execute(&wrapped, ExecOptions::sudo().timeout(duration + RUN_GRACE))
            .await?;
        if !ACCEPTED_EXIT_CODES.contains(&output.exit_code) {
            return Err(HarnessError::Workload {
                node: self.node.name().to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }

        let text = output.stdout;
        match self.last_output.lock() {
            Ok(mut last) => *last = TestpmdOutput::new(text.clone()),
            Err(poisoned) => *poisoned.into_inner() = TestpmdOutput::new(text.clone()),
        }
        Ok(text)
    }

    async fn terminate_current(&self) -> Result<(), HarnessError> {
        // killall exits 1 when nothing is running; that is fine.
        let output = self
            .node
            .execute(
                &format!("killall -s INT {}", self.process_name()),
                ExecOptions::sudo(),
            )
            .await?;
        tracing::info!(node = %self.node.name(), running = output.success(), "testpmd terminated");
        Ok(())
    }

    fn last_output(&self) -> TestpmdOutput {
        match self.last_output.lock() {
            Ok(last) => last.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
