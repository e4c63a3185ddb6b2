//! testpmd command builder and output parser.
//!
//! Builds the command line a workload driver starts on a node and extracts
//! per-second packet counters from what testpmd printed while running.
//! testpmd prints port statistics every `--stats-period` seconds; each block
//! carries `Tx-pps:` and `Rx-pps:` samples.

use regex::Regex;
use std::sync::OnceLock;

use crate::nic::NicInfo;
use crate::pmd::PmdMode;

/// testpmd forwarding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    /// Generate and send packets only.
    TxOnly,
    /// Receive and drop packets only.
    RxOnly,
}

impl ForwardMode {
    /// Mode name as testpmd expects it.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TxOnly => "txonly",
            Self::RxOnly => "rxonly",
        }
    }
}

/// testpmd command line for one node.
#[derive(Debug, Clone)]
pub struct TestpmdCommand {
    binary: String,
    pci_slot: String,
    upper: String,
    core: u32,
    mode: ForwardMode,
    pmd: PmdMode,
    tx_ip: Option<(String, String)>,
    txq: u32,
    rxq: u32,
    stats_period_secs: u32,
}

impl TestpmdCommand {
    /// Create a command forwarding on `nic` with one queue each way.
    pub fn new(binary: &str, nic: &NicInfo, mode: ForwardMode, pmd: PmdMode) -> Self {
        Self {
            binary: binary.into(),
            pci_slot: nic.pci_slot.clone(),
            upper: nic.upper.clone(),
            core: 0,
            mode,
            pmd,
            tx_ip: None,
            txq: 1,
            rxq: 1,
            stats_period_secs: 2,
        }
    }

    /// First lcore to run on (the forwarding core is the next one).
    pub fn core(mut self, core: u32) -> Self {
        self.core = core;
        self
    }

    /// Source and destination IP for generated packets.
    pub fn tx_ip(mut self, src: &str, dst: &str) -> Self {
        self.tx_ip = Some((src.into(), dst.into()));
        self
    }

    /// Number of TX queues.
    pub fn txq(mut self, n: u32) -> Self {
        self.txq = n;
        self
    }

    /// Number of RX queues.
    pub fn rxq(mut self, n: u32) -> Self {
        self.rxq = n;
        self
    }

    /// Build the argument vector (binary first).
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.binary.clone(),
            "-l".into(),
            format!("{}-{}", self.core, self.core + 1),
            "-a".into(),
            self.pci_slot.clone(),
        ];

        if self.pmd == PmdMode::Failsafe {
            args.push(format!("--vdev=net_vdev_netvsc0,iface={}", self.upper));
        }

        args.push("--".into());
        args.push(format!("--forward-mode={}", self.mode.as_str()));
        if let Some((src, dst)) = &self.tx_ip {
            args.push(format!("--tx-ip={},{}", src, dst));
        }
        args.push("-a".into());
        args.push("--stats-period".into());
        args.push(self.stats_period_secs.to_string());
        args.push("--nb-cores=1".into());
        args.push(format!("--txq={}", self.txq));
        args.push(format!("--rxq={}", self.rxq));

        args
    }

    /// Build the shell command line.
    pub fn build(&self) -> String {
        self.to_args().join(" ")
    }
}

/// Mean PPS before, during and after an accelerated path rescind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RescindSamples {
    /// Before the VF was removed.
    pub before: u64,
    /// While traffic ran over the synthetic path.
    pub during: u64,
    /// After the VF was hot-added back.
    pub after: u64,
}

/// testpmd output that cannot answer a counter query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    /// No statistics block carried this counter.
    #[error("testpmd output had no {key} samples")]
    NoSamples {
        /// Counter key, e.g. `Tx-pps`.
        key: &'static str,
    },
    /// The VF removal was never reported by testpmd.
    #[error("testpmd output did not contain a device removal event")]
    NoRemovalEvent,
    /// The VF hot-add was never reported by testpmd.
    #[error("testpmd output did not contain a hotplug event")]
    NoHotplugEvent,
}

const TX_PPS: &str = "Tx-pps";
const RX_PPS: &str = "Rx-pps";
const DEVICE_REMOVAL: &str = "device removal event";

fn tx_pps_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Tx-pps:\s+([0-9]+)").expect("valid Tx-pps regex"))
}

fn rx_pps_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Rx-pps:\s+([0-9]+)").expect("valid Rx-pps regex"))
}

fn hotplug_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"EAL: PCI device [a-fA-F0-9]{4}:[a-fA-F0-9]{2}:[a-fA-F0-9]{2}\.[a-fA-F0-9] on NUMA socket [0-9]+",
        )
        .expect("valid hotplug regex")
    })
}

/// Captured output of one testpmd run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestpmdOutput {
    text: String,
}

impl TestpmdOutput {
    /// Wrap captured stdout.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Raw text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Mean of the non-zero TX PPS samples over the whole run.
    pub fn tx_pps(&self) -> Result<u64, OutputError> {
        whole_run_mean(&self.text, tx_pps_regex(), TX_PPS)
    }

    /// Mean of the non-zero RX PPS samples over the whole run.
    pub fn rx_pps(&self) -> Result<u64, OutputError> {
        whole_run_mean(&self.text, rx_pps_regex(), RX_PPS)
    }

    /// TX PPS before, during and after a rescind.
    pub fn tx_pps_rescind(&self) -> Result<RescindSamples, OutputError> {
        self.rescind_samples(tx_pps_regex())
    }

    /// RX PPS before, during and after a rescind.
    pub fn rx_pps_rescind(&self) -> Result<RescindSamples, OutputError> {
        self.rescind_samples(rx_pps_regex())
    }

    /// Split the run at the removal event and the last hotplug event.
    ///
    /// testpmd reports the VF coming back once per probe attempt; the last
    /// report marks the point where traffic moved back to the VF.
    pub fn split_rescind(&self) -> Result<(&str, &str, &str), OutputError> {
        let removal = self
            .text
            .find(DEVICE_REMOVAL)
            .ok_or(OutputError::NoRemovalEvent)?;
        let (before, rest) = self.text.split_at(removal);

        let last_hotplug = hotplug_regex()
            .find_iter(rest)
            .last()
            .ok_or(OutputError::NoHotplugEvent)?;
        let during = &rest[..last_hotplug.start()];
        let after = &rest[last_hotplug.end()..];

        Ok((before, during, after))
    }

    fn rescind_samples(&self, re: &Regex) -> Result<RescindSamples, OutputError> {
        let (before, during, after) = self.split_rescind()?;
        Ok(RescindSamples {
            before: mean_nonzero(re, before),
            during: mean_nonzero(re, during),
            after: mean_nonzero(re, after),
        })
    }
}

fn whole_run_mean(text: &str, re: &Regex, key: &'static str) -> Result<u64, OutputError> {
    if !re.is_match(text) {
        return Err(OutputError::NoSamples { key });
    }
    Ok(mean_nonzero(re, text))
}

/// Mean of the non-zero samples `re` captures in `text`; 0 if there are none.
///
/// Zero samples come from the stats blocks printed before the port starts
/// forwarding and after it stops; they would drag the mean down.
fn mean_nonzero(re: &Regex, text: &str) -> u64 {
    let samples: Vec<u64> = re
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .filter(|&pps| pps > 0)
        .collect();
    if samples.is_empty() {
        return 0;
    }
    samples.iter().sum::<u64>() / samples.len() as u64
}
