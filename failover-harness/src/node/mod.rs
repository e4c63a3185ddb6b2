//! Command execution on test nodes.
//!
//! A [`Node`] runs shell commands, reads the kernel log and hands out the
//! [`NetworkController`] that toggles its accelerated networking.
//!
//! Available implementations:
//! - [`SshNode`]: shells out to `ssh` (production)
//! - [`MockNode`]: scripted responses and in-memory kernel log (testing)

mod mock;
mod ssh;

pub use mock::{Journal, MockController, MockNode};
pub use ssh::SshNode;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::controller::NetworkController;

/// Errors from executing commands on a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The command could not be started (process spawn error).
    #[error("spawn error: {0}")]
    Spawn(#[from] std::io::Error),

    /// The command returned a non-zero exit code.
    #[error("command failed on {host}: `{command}` exit={exit_code}, stderr={stderr}")]
    CommandFailed {
        /// Target node.
        host: String,
        /// The command as submitted.
        command: String,
        /// Exit code.
        exit_code: i32,
        /// Standard error output.
        stderr: String,
    },

    /// The command did not finish within its timeout.
    #[error("command timed out on {host} after {timeout:?}: `{command}`")]
    Timeout {
        /// Target node.
        host: String,
        /// The command as submitted.
        command: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },
}

/// Result of executing a command on a node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    /// Failed output with the given exit code.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// How a command is executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Run as root.
    pub sudo: bool,
    /// Give up after this long.
    pub timeout: Option<Duration>,
}

impl ExecOptions {
    /// Plain execution as the login user.
    pub fn user() -> Self {
        Self::default()
    }

    /// Execution as root.
    pub fn sudo() -> Self {
        Self {
            sudo: true,
            timeout: None,
        }
    }

    /// Set a timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A machine taking part in a test.
#[async_trait]
pub trait Node: Send + Sync {
    /// Node name, used as the key for per-node results.
    fn name(&self) -> &str;

    /// Whether the node is a remote machine. Multi-node scenarios refuse to
    /// run on anything else.
    fn is_remote(&self) -> bool;

    /// Execute a shell command.
    ///
    /// Returns the raw result including exit code, stdout, and stderr.
    /// Does NOT fail on non-zero exit; use [`Node::execute_ok`] for that.
    async fn execute(&self, command: &str, options: ExecOptions)
        -> Result<CommandOutput, NodeError>;

    /// Controller toggling this node's accelerated networking.
    fn network_controller(&self) -> Arc<dyn NetworkController>;

    /// Execute a shell command, failing on non-zero exit.
    async fn execute_ok(
        &self,
        command: &str,
        options: ExecOptions,
    ) -> Result<CommandOutput, NodeError> {
        let output = self.execute(command, options).await?;
        if !output.success() {
            return Err(NodeError::CommandFailed {
                host: self.name().to_string(),
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        Ok(output)
    }

    /// Full snapshot of the kernel log ring buffer.
    async fn kernel_log(&self) -> Result<String, NodeError> {
        Ok(self.execute_ok("dmesg", ExecOptions::sudo()).await?.stdout)
    }
}
