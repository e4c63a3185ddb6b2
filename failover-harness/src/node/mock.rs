//! Mock node and network controller for testing.
//!
//! A [`MockNode`] answers commands from scripted rules and keeps an in-memory
//! kernel log. Its [`MockController`] appends the VF removal / hot-add lines
//! to that log when accelerated networking is toggled, the way the guest
//! kernel would.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use failover_core::{NicInfo, PathEvent, DISCOVERY_SCRIPT};

use super::{CommandOutput, ExecOptions, Node, NodeError};
use crate::controller::NetworkController;

/// Ordered record of cross-node actions, shared between mocks.
///
/// Entries look like `disable:sender`, `log:receiver`, `start:sender`.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    /// Create an empty journal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry.
    pub fn record(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    /// All entries so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }

    /// Index of the first entry equal to `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().unwrap().iter().position(|e| e == entry)
    }

    /// Index of the last entry equal to `entry`.
    pub fn last_position(&self, entry: &str) -> Option<usize> {
        self.entries.lock().unwrap().iter().rposition(|e| e == entry)
    }

    /// Number of entries equal to `entry`.
    pub fn count(&self, entry: &str) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| *e == entry)
            .count()
    }
}

/// Mock node for testing.
///
/// Commands are answered by the first rule whose pattern is a substring of
/// the command. Without a matching rule, interface discovery lists the
/// configured NICs, VMBus `bind`/`unbind` writes move a NIC between drivers,
/// and everything else succeeds with empty output.
#[derive(Debug, Clone)]
pub struct MockNode {
    name: String,
    inner: Arc<Mutex<MockNodeInner>>,
}

#[derive(Debug)]
struct MockNodeInner {
    remote: bool,
    nics: Vec<NicInfo>,
    rules: Vec<(String, CommandOutput)>,
    executed: Vec<String>,
    kernel_log: String,
    log_reads: usize,
    fail_next_log: Option<String>,
    accelerated: bool,
    toggles: Vec<bool>,
    silent: Vec<PathEvent>,
    journal: Journal,
}

impl MockNode {
    /// Create a remote mock node with one management NIC (no VF) and one
    /// accelerated test NIC `eth1`/`enP30832s1` on `hv_netvsc`.
    pub fn new(name: &str) -> Self {
        let nics = vec![
            NicInfo {
                upper: "eth0".into(),
                lower: "-".into(),
                pci_slot: "-".into(),
                ip_addr: Some("10.0.0.4".into()),
                bound_driver: "hv_netvsc".into(),
                device_id: format!("{name}-dev0"),
            },
            NicInfo {
                upper: "eth1".into(),
                lower: "enP30832s1".into(),
                pci_slot: "7870:00:02.0".into(),
                ip_addr: Some("10.0.1.4".into()),
                bound_driver: "hv_netvsc".into(),
                device_id: format!("{name}-dev1"),
            },
        ];

        Self {
            name: name.to_string(),
            inner: Arc::new(Mutex::new(MockNodeInner {
                remote: true,
                nics,
                rules: Vec::new(),
                executed: Vec::new(),
                kernel_log: "[    0.000000] Linux version 5.15.0-1049-azure\n".to_string(),
                log_reads: 0,
                fail_next_log: None,
                accelerated: true,
                toggles: Vec::new(),
                silent: Vec::new(),
                journal: Journal::new(),
            })),
        }
    }

    /// Share `journal` with this node.
    pub fn with_journal(self, journal: Journal) -> Self {
        self.inner.lock().unwrap().journal = journal;
        self
    }

    /// Replace the NICs reported by discovery.
    pub fn with_nics(self, nics: Vec<NicInfo>) -> Self {
        self.inner.lock().unwrap().nics = nics;
        self
    }

    /// Set the IPv4 address of every accelerated NIC.
    pub fn with_test_ip(self, ip: &str) -> Self {
        {
            let mut inner = self.inner.lock().unwrap();
            for nic in inner.nics.iter_mut().filter(|n| n.lower != "-") {
                nic.ip_addr = Some(ip.to_string());
            }
        }
        self
    }

    /// Mark the node as local (`false`) or remote (`true`).
    pub fn set_remote(&self, remote: bool) {
        self.inner.lock().unwrap().remote = remote;
    }

    /// Set the current accelerated networking state without logging events.
    pub fn set_accelerated(&self, enabled: bool) {
        self.inner.lock().unwrap().accelerated = enabled;
    }

    /// Answer commands containing `pattern` with `output`.
    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        self.inner
            .lock()
            .unwrap()
            .rules
            .push((pattern.to_string(), output));
    }

    /// Append a line to the kernel log.
    pub fn append_kernel_log(&self, line: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.kernel_log.push_str(line);
        inner.kernel_log.push('\n');
    }

    /// Replace the whole kernel log (simulates ring buffer wrap).
    pub fn replace_kernel_log(&self, text: &str) {
        self.inner.lock().unwrap().kernel_log = text.to_string();
    }

    /// Never log `event` when accelerated networking is toggled.
    pub fn silence(&self, event: PathEvent) {
        self.inner.lock().unwrap().silent.push(event);
    }

    /// Cause the next kernel log read to fail.
    pub fn fail_next_log(&self, error: &str) {
        self.inner.lock().unwrap().fail_next_log = Some(error.to_string());
    }

    /// All commands executed so far.
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().unwrap().executed.clone()
    }

    /// Number of kernel log reads.
    pub fn log_reads(&self) -> usize {
        self.inner.lock().unwrap().log_reads
    }

    /// Accelerated networking toggles, in order (`false` = disable).
    pub fn toggles(&self) -> Vec<bool> {
        self.inner.lock().unwrap().toggles.clone()
    }

    /// The journal this node records into.
    pub fn journal(&self) -> Journal {
        self.inner.lock().unwrap().journal.clone()
    }

    /// A controller bound to this node.
    pub fn controller(&self) -> MockController {
        MockController {
            name: self.name.clone(),
            inner: Arc::clone(&self.inner),
        }
    }

    fn listing(nics: &[NicInfo]) -> String {
        nics.iter()
            .map(|n| {
                // Off hv_netvsc there is no netdev to name.
                if n.bound_driver != "hv_netvsc" {
                    return format!("- - - - {} {}\n", n.bound_driver, n.device_id);
                }
                format!(
                    "{} {} {} {} {} {}\n",
                    n.upper,
                    n.lower,
                    n.pci_slot,
                    n.ip_addr.as_deref().unwrap_or("-"),
                    n.bound_driver,
                    n.device_id
                )
            })
            .collect()
    }
}

#[async_trait]
impl Node for MockNode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_remote(&self) -> bool {
        self.inner.lock().unwrap().remote
    }

    async fn execute(
        &self,
        command: &str,
        _options: ExecOptions,
    ) -> Result<CommandOutput, NodeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.executed.push(command.to_string());

        if let Some((_, output)) = inner.rules.iter().find(|(p, _)| command.contains(p.as_str())) {
            return Ok(output.clone());
        }
        if let Some((device, driver)) = vmbus_write(command) {
            if let Some(nic) = inner.nics.iter_mut().find(|n| n.device_id == device) {
                nic.bound_driver = driver.to_string();
            }
            return Ok(CommandOutput::ok(""));
        }
        if command == DISCOVERY_SCRIPT {
            return Ok(CommandOutput::ok(Self::listing(&inner.nics)));
        }
        Ok(CommandOutput::ok(""))
    }

    fn network_controller(&self) -> Arc<dyn NetworkController> {
        Arc::new(self.controller())
    }

    async fn kernel_log(&self) -> Result<String, NodeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.log_reads += 1;
        inner.journal.record(format!("log:{}", self.name));

        if let Some(error) = inner.fail_next_log.take() {
            return Err(NodeError::CommandFailed {
                host: self.name.clone(),
                command: "dmesg".to_string(),
                exit_code: 1,
                stderr: error,
            });
        }
        Ok(inner.kernel_log.clone())
    }
}

/// Parse `echo <device> > /sys/bus/vmbus/drivers/<driver>/{bind,unbind}`
/// into the device and the driver it ends up on (`-` after an unbind).
fn vmbus_write(command: &str) -> Option<(&str, &str)> {
    let (device, path) = command.strip_prefix("echo ")?.split_once(" > /sys/bus/vmbus/drivers/")?;
    if let Some(driver) = path.strip_suffix("/bind") {
        Some((device, driver))
    } else {
        path.strip_suffix("/unbind").map(|_| (device, "-"))
    }
}

/// Mock network controller, bound to a [`MockNode`].
#[derive(Debug, Clone)]
pub struct MockController {
    name: String,
    inner: Arc<Mutex<MockNodeInner>>,
}

#[async_trait]
impl NetworkController for MockController {
    async fn is_accelerated_enabled(&self) -> Result<bool, NodeError> {
        Ok(self.inner.lock().unwrap().accelerated)
    }

    async fn set_accelerated(&self, enabled: bool) -> Result<(), NodeError> {
        let mut inner = self.inner.lock().unwrap();
        inner.accelerated = enabled;
        inner.toggles.push(enabled);
        let action = if enabled { "enable" } else { "disable" };
        inner.journal.record(format!("{action}:{}", self.name));

        let event = if enabled {
            PathEvent::PathReenabled
        } else {
            PathEvent::PathDisabled
        };
        if inner.silent.contains(&event) {
            return Ok(());
        }

        let lines: Vec<String> = inner
            .nics
            .iter()
            .filter(|n| n.lower != "-")
            .map(|n| {
                format!(
                    "[  {:>4}.000000] hv_netvsc {} {}: {}\n",
                    inner.kernel_log.lines().count(),
                    n.device_id,
                    n.upper,
                    event.log_text(&n.upper, &n.lower)
                )
            })
            .collect();
        for line in lines {
            inner.kernel_log.push_str(&line);
        }
        Ok(())
    }
}
