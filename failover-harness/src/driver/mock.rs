//! Mock workload driver for testing.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use failover_core::{ForwardMode, NicInfo, PmdMode, TestpmdCommand, TestpmdOutput};
use tokio::sync::Notify;

use super::{WorkloadDriver, WorkloadSource};
use crate::error::HarnessError;
use crate::node::Journal;

/// Mock driver for testing.
///
/// `start` runs until the duration elapses or `terminate_current` is called,
/// then returns the scripted output. Calls are recorded in a [`Journal`].
#[derive(Debug, Clone)]
pub struct MockDriver {
    name: String,
    journal: Journal,
    terminate: Arc<Notify>,
    inner: Arc<Mutex<MockDriverInner>>,
}

#[derive(Debug, Default)]
struct MockDriverInner {
    output: String,
    last_output: TestpmdOutput,
    commands: Vec<String>,
    installs: usize,
    fail_next_start: Option<i32>,
}

impl MockDriver {
    /// Create a driver for node `name` that returns `output` from every run.
    pub fn new(name: &str, journal: Journal, output: &str) -> Self {
        Self {
            name: name.to_string(),
            journal,
            terminate: Arc::new(Notify::new()),
            inner: Arc::new(Mutex::new(MockDriverInner {
                output: output.to_string(),
                ..MockDriverInner::default()
            })),
        }
    }

    /// Cause the next `start` to fail with `exit_code`.
    pub fn fail_next_start(&self, exit_code: i32) {
        self.inner.lock().unwrap().fail_next_start = Some(exit_code);
    }

    /// Commands passed to `start`.
    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().unwrap().commands.clone()
    }

    /// Number of `install` calls.
    pub fn installs(&self) -> usize {
        self.inner.lock().unwrap().installs
    }
}

#[async_trait]
impl WorkloadDriver for MockDriver {
    async fn install(&self, _source: &WorkloadSource) -> Result<(), HarnessError> {
        self.inner.lock().unwrap().installs += 1;
        self.journal.record(format!("install:{}", self.name));
        Ok(())
    }

    fn command(&self, nic: &NicInfo, mode: ForwardMode, pmd: PmdMode) -> TestpmdCommand {
        TestpmdCommand::new("dpdk-testpmd", nic, mode, pmd)
    }

    async fn start(&self, command: &str, duration: Duration) -> Result<String, HarnessError> {
        let failure = {
            let mut inner = self.inner.lock().unwrap();
            inner.commands.push(command.to_string());
            inner.fail_next_start.take()
        };
        self.journal.record(format!("start:{}", self.name));

        if let Some(exit_code) = failure {
            return Err(HarnessError::Workload {
                node: self.name.clone(),
                exit_code,
                stderr: "scripted failure".to_string(),
            });
        }

        tokio::select! {
            _ = self.terminate.notified() => {}
            _ = tokio::time::sleep(duration) => {}
        }
        self.journal.record(format!("exit:{}", self.name));

        let mut inner = self.inner.lock().unwrap();
        let text = inner.output.clone();
        inner.last_output = TestpmdOutput::new(text.clone());
        Ok(text)
    }

    async fn terminate_current(&self) -> Result<(), HarnessError> {
        self.journal.record(format!("terminate:{}", self.name));
        self.terminate.notify_one();
        Ok(())
    }

    fn last_output(&self) -> TestpmdOutput {
        self.inner.lock().unwrap().last_output.clone()
    }
}
