//! Throughput and latency classification.
//!
//! These are coarse order-of-magnitude checks, not SLOs: the accelerated path
//! should forward more than 2^20 packets per second, the synthetic fallback
//! path measurably less.

use regex::Regex;
use std::sync::OnceLock;

use crate::testpmd::RescindSamples;

/// PPS threshold separating the accelerated path from the fallback path.
pub const PPS_THRESHOLD: u64 = 1 << 20;

/// Ring ping bound for the 99.999th percentile latency, in nanoseconds.
pub const MAX_RING_PING_LIMIT_NS: u64 = 200_000;

/// Which datapath a sample is expected to come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedPath {
    /// Accelerated path enabled: PPS must exceed the threshold.
    Accelerated,
    /// Accelerated path disabled: PPS must stay below the threshold.
    Fallback,
}

/// A measured value on the wrong side of its bound.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ThroughputError {
    /// PPS sample on the wrong side of [`PPS_THRESHOLD`].
    #[error("{tag}-PPS ({pps}) should have been {} than 2^20 ({threshold}) PPS {}", direction(.expected), phase(.expected))]
    Pps {
        /// Sample label, e.g. `TX` or `RX`.
        tag: String,
        /// Measured packets per second.
        pps: u64,
        /// Threshold the sample was compared against.
        threshold: u64,
        /// Path the sample was expected to come from.
        expected: ExpectedPath,
    },
    /// Ring ping latency above [`MAX_RING_PING_LIMIT_NS`].
    #[error("ring ping measured {measured_ns}ns as maximum latency, maximum should be less than {limit_ns}ns")]
    Latency {
        /// Measured 99.999th percentile latency.
        measured_ns: u64,
        /// Upper bound.
        limit_ns: u64,
    },
}

fn direction(expected: &ExpectedPath) -> &'static str {
    match expected {
        ExpectedPath::Accelerated => "greater",
        ExpectedPath::Fallback => "less",
    }
}

fn phase(expected: &ExpectedPath) -> &'static str {
    match expected {
        ExpectedPath::Accelerated => "with accelerated networking enabled",
        ExpectedPath::Fallback => "with accelerated networking disabled",
    }
}

/// Check one PPS sample against the threshold.
///
/// A sample exactly at the threshold fails both expectations.
pub fn classify(tag: &str, pps: u64, expected: ExpectedPath) -> Result<(), ThroughputError> {
    let passed = match expected {
        ExpectedPath::Accelerated => pps > PPS_THRESHOLD,
        ExpectedPath::Fallback => pps < PPS_THRESHOLD,
    };
    if passed {
        Ok(())
    } else {
        Err(ThroughputError::Pps {
            tag: tag.to_string(),
            pps,
            threshold: PPS_THRESHOLD,
            expected,
        })
    }
}

/// Check the three samples of a rescind run: fast, then slow, then fast again.
pub fn classify_rescind(tag: &str, samples: RescindSamples) -> Result<(), ThroughputError> {
    classify(tag, samples.before, ExpectedPath::Accelerated)?;
    classify(tag, samples.during, ExpectedPath::Fallback)?;
    classify(tag, samples.after, ExpectedPath::Accelerated)
}

/// Check a ring ping 99.999th percentile latency against its bound.
pub fn check_ring_ping_latency(measured_ns: u64) -> Result<(), ThroughputError> {
    if measured_ns < MAX_RING_PING_LIMIT_NS {
        Ok(())
    } else {
        Err(ThroughputError::Latency {
            measured_ns,
            limit_ns: MAX_RING_PING_LIMIT_NS,
        })
    }
}

/// Extract the 99.999th percentile latency from ring ping output.
///
/// ring ping ends its report with e.g. `percentile 99.999 = 12302`.
pub fn parse_ring_ping_percentile(output: &str) -> Option<u64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"percentile 99\.999 = ([0-9]+)").expect("valid percentile regex")
    });
    re.captures(output)?.get(1)?.as_str().parse().ok()
}
