//! Remote nodes reached over `ssh`.
//!
//! Uses `tokio::process::Command` to shell out to `ssh`. Keys must be
//! pre-configured; `BatchMode` makes a missing key fail instead of prompting.

use std::sync::Arc;

use async_trait::async_trait;
use failover_core::NodeConfig;

use super::{CommandOutput, ExecOptions, Node, NodeError};
use crate::controller::{CommandController, NetworkController};

/// A test VM reachable over ssh.
pub struct SshNode {
    name: String,
    host: String,
    user: String,
    controller: Arc<dyn NetworkController>,
}

impl SshNode {
    /// Create a node with an explicit network controller.
    pub fn new(
        name: impl Into<String>,
        host: impl Into<String>,
        user: impl Into<String>,
        controller: Arc<dyn NetworkController>,
    ) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            user: user.into(),
            controller,
        }
    }

    /// Create a node from its config entry. Accelerated networking is
    /// toggled with the entry's control-plane commands.
    pub fn from_config(config: &NodeConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.host.clone(),
            config.user.clone(),
            Arc::new(CommandController::from_config(config)),
        )
    }

    /// ssh destination, `user@host`.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

impl std::fmt::Debug for SshNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshNode")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Wrap `command` so it runs as root through a single remote shell.
pub(crate) fn sudo_wrap(command: &str) -> String {
    format!("sudo sh -c '{}'", command.replace('\'', r"'\''"))
}

#[async_trait]
impl Node for SshNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_remote(&self) -> bool {
        true
    }

    async fn execute(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> Result<CommandOutput, NodeError> {
        let remote = if options.sudo {
            sudo_wrap(command)
        } else {
            command.to_string()
        };

        tracing::debug!(node = %self.name, sudo = options.sudo, "exec: {}", command);

        let child = tokio::process::Command::new("ssh")
            .args([
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "ConnectTimeout=30",
                "-o",
                "BatchMode=yes",
                &self.destination(),
                &remote,
            ])
            .kill_on_drop(true)
            .output();

        let output = match options.timeout {
            Some(timeout) => tokio::time::timeout(timeout, child).await.map_err(|_| {
                NodeError::Timeout {
                    host: self.name.clone(),
                    command: command.to_string(),
                    timeout,
                }
            })??,
            None => child.await?,
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    fn network_controller(&self) -> Arc<dyn NetworkController> {
        Arc::clone(&self.controller)
    }
}
