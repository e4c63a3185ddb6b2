//! Rescind/reenable stage machine.
//!
//! This module provides the pure stage sequence the orchestrator walks while
//! workloads run. The orchestrator performs the actual toggles, log waits and
//! sleeps; this module only decides what comes next and what each stage waits
//! for. Every stage is visited exactly once, in order.

use std::time::Duration;

/// Stage of the rescind/reenable protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolStage {
    /// Workloads ramp up to steady throughput.
    Warmup,
    /// Accelerated path disable issued to every node.
    Disabling,
    /// Waiting for, then holding, the fallback path on every node.
    Disabled,
    /// Accelerated path re-enable issued to every node.
    Reenabling,
    /// Accelerated path confirmed restored; workloads keep running.
    Stable,
    /// Workloads are stopped early.
    Terminating,
}

impl ProtocolStage {
    /// First stage of the protocol.
    pub const FIRST: Self = Self::Warmup;

    /// The stage that follows this one, or `None` after `Terminating`.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Warmup => Some(Self::Disabling),
            Self::Disabling => Some(Self::Disabled),
            Self::Disabled => Some(Self::Reenabling),
            Self::Reenabling => Some(Self::Stable),
            Self::Stable => Some(Self::Terminating),
            Self::Terminating => None,
        }
    }

    /// All stages in protocol order.
    pub fn sequence() -> impl Iterator<Item = Self> {
        std::iter::successors(Some(Self::FIRST), |stage| stage.next())
    }

    /// Kernel log event that must be confirmed on every node before leaving
    /// this stage.
    pub fn confirmation(self) -> Option<PathEvent> {
        match self {
            Self::Disabled => Some(PathEvent::PathDisabled),
            Self::Stable => Some(PathEvent::PathReenabled),
            _ => None,
        }
    }

    /// Stable name for logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Warmup => "warmup",
            Self::Disabling => "disabling",
            Self::Disabled => "disabled",
            Self::Reenabling => "reenabling",
            Self::Stable => "stable",
            Self::Terminating => "terminating",
        }
    }
}

impl std::fmt::Display for ProtocolStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kernel log evidence of an accelerated path transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathEvent {
    /// The VF was unregistered; traffic is on the synthetic path.
    PathDisabled,
    /// The data path switched back to the VF.
    PathReenabled,
}

impl PathEvent {
    /// Confirmation deadline for a run of `run_duration`.
    ///
    /// Disable must show up within a third of the run, re-enable within half.
    pub fn timeout(self, run_duration: Duration) -> Duration {
        match self {
            Self::PathDisabled => run_duration / 3,
            Self::PathReenabled => run_duration / 2,
        }
    }

    /// Kernel log text for this event on the interface pair `upper`/`lower`.
    pub fn log_text(self, upper: &str, lower: &str) -> String {
        match self {
            Self::PathDisabled => format!("VF unregistering: {}", lower),
            Self::PathReenabled => format!("{}: Data path switched to VF: {}", upper, lower),
        }
    }
}

impl std::fmt::Display for PathEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PathDisabled => write!(f, "accelerated path disable"),
            Self::PathReenabled => write!(f, "accelerated path re-enable"),
        }
    }
}

/// Settle delays for the stages that hold for a fixed time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTimings {
    /// Hold in `Warmup` after workloads were submitted.
    pub warmup: Duration,
    /// Hold in `Disabled` after every node confirmed the disable.
    pub disabled_hold: Duration,
    /// Hold in `Stable` after every node confirmed the re-enable.
    pub stable_hold: Duration,
    /// Kernel log poll cadence while waiting for confirmations.
    pub poll_interval: Duration,
}

impl ProtocolTimings {
    /// Fixed hold for `stage`, if it has one.
    pub fn hold(&self, stage: ProtocolStage) -> Option<Duration> {
        match stage {
            ProtocolStage::Warmup => Some(self.warmup),
            ProtocolStage::Disabled => Some(self.disabled_hold),
            ProtocolStage::Stable => Some(self.stable_hold),
            _ => None,
        }
    }

    /// Sum of all fixed holds; a lower bound for a protocol run.
    pub fn total_hold(&self) -> Duration {
        self.warmup + self.disabled_hold + self.stable_hold
    }
}

impl Default for ProtocolTimings {
    fn default() -> Self {
        Self {
            warmup: Duration::from_secs(10),
            disabled_hold: Duration::from_secs(10),
            stable_hold: Duration::from_secs(15),
            poll_interval: Duration::from_secs(1),
        }
    }
}
