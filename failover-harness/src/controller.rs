//! Accelerated networking control plane.
//!
//! Toggling accelerated networking rescinds (or re-offers) the SR-IOV VF
//! from the host side. The guest sees it only as kernel log lines, which the
//! [`LogWatcher`](crate::watcher::LogWatcher) waits for.

use async_trait::async_trait;
use failover_core::NodeConfig;

use crate::node::NodeError;

/// Placeholder in control-plane commands replaced by the node name.
pub const NODE_PLACEHOLDER: &str = "{node}";

/// Switches accelerated networking for one node.
#[async_trait]
pub trait NetworkController: Send + Sync {
    /// Whether accelerated networking is currently enabled.
    async fn is_accelerated_enabled(&self) -> Result<bool, NodeError>;

    /// Enable or disable accelerated networking.
    async fn set_accelerated(&self, enabled: bool) -> Result<(), NodeError>;
}

/// Controller running local shell commands (e.g. a cloud CLI).
///
/// The status command must print `true` when accelerated networking is
/// enabled.
#[derive(Debug, Clone)]
pub struct CommandController {
    node: String,
    status_cmd: String,
    enable_cmd: String,
    disable_cmd: String,
}

impl CommandController {
    /// Build from a node's config entry.
    pub fn from_config(config: &NodeConfig) -> Self {
        Self {
            node: config.name.clone(),
            status_cmd: config.accelerated_status_cmd.clone(),
            enable_cmd: config.accelerated_enable_cmd.clone(),
            disable_cmd: config.accelerated_disable_cmd.clone(),
        }
    }

    fn render(&self, template: &str) -> String {
        template.replace(NODE_PLACEHOLDER, &self.node)
    }

    async fn run(&self, template: &str) -> Result<String, NodeError> {
        let command = self.render(template);
        tracing::debug!(node = %self.node, "control plane: {}", command);

        let output = tokio::process::Command::new("sh")
            .args(["-c", &command])
            .output()
            .await?;

        if !output.status.success() {
            return Err(NodeError::CommandFailed {
                host: "localhost".to_string(),
                command,
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl NetworkController for CommandController {
    async fn is_accelerated_enabled(&self) -> Result<bool, NodeError> {
        let stdout = self.run(&self.status_cmd).await?;
        Ok(stdout.trim().eq_ignore_ascii_case("true"))
    }

    async fn set_accelerated(&self, enabled: bool) -> Result<(), NodeError> {
        let template = if enabled {
            &self.enable_cmd
        } else {
            &self.disable_cmd
        };
        self.run(template).await?;
        tracing::info!(node = %self.node, enabled, "accelerated networking toggled");
        Ok(())
    }
}
