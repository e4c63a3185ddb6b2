//! Kernel log watching.
//!
//! Accelerated networking changes are confirmed from the guest side by
//! polling the kernel log for the hv_netvsc messages of the test interface.
//! A [`LogCursor`] makes every message count once: a line that confirmed one
//! stage can never confirm a later one.

use std::time::Duration;

use failover_core::{LogCursor, NicInfo, PathEvent};
use regex::Regex;
use tokio::time::Instant;

use crate::node::{Node, NodeError};

/// Polls one node's kernel log for path change events.
#[derive(Debug, Clone)]
pub struct LogWatcher {
    cursor: LogCursor,
    removal: Regex,
    hotplug: Regex,
    poll_interval: Duration,
}

impl LogWatcher {
    /// Watch for events on `nic`, polling every `poll_interval`.
    pub fn new(nic: &NicInfo, poll_interval: Duration) -> Self {
        Self {
            cursor: LogCursor::new(),
            removal: literal(&PathEvent::PathDisabled.log_text(&nic.upper, &nic.lower)),
            hotplug: literal(&PathEvent::PathReenabled.log_text(&nic.upper, &nic.lower)),
            poll_interval,
        }
    }

    /// Start from `cursor` instead of an empty log.
    pub fn with_cursor(mut self, cursor: LogCursor) -> Self {
        self.cursor = cursor;
        self
    }

    /// Current cursor.
    pub fn cursor(&self) -> &LogCursor {
        &self.cursor
    }

    /// Pattern confirming `event`.
    pub fn pattern(&self, event: PathEvent) -> &Regex {
        match event {
            PathEvent::PathDisabled => &self.removal,
            PathEvent::PathReenabled => &self.hotplug,
        }
    }

    /// Check one snapshot. On a match the cursor moves to the end of it.
    pub fn observe(&mut self, event: PathEvent, snapshot: String) -> bool {
        let matched = self.pattern(event).is_match(self.cursor.delta(&snapshot));
        if matched {
            self.cursor.advance(snapshot);
        }
        matched
    }

    /// Poll `node` until `event` shows up in new log output.
    ///
    /// Returns `Ok(false)` once `timeout` has elapsed without a match, never
    /// earlier. Log read failures are returned as errors.
    pub async fn wait_for(
        &mut self,
        node: &dyn Node,
        event: PathEvent,
        timeout: Duration,
    ) -> Result<bool, NodeError> {
        let start = Instant::now();
        loop {
            let snapshot = node.kernel_log().await?;
            if self.observe(event, snapshot) {
                tracing::info!(
                    node = %node.name(),
                    elapsed_secs = start.elapsed().as_secs(),
                    "{} confirmed",
                    event
                );
                return Ok(true);
            }

            if start.elapsed() >= timeout {
                tracing::warn!(node = %node.name(), timeout_secs = timeout.as_secs(), "{} not observed", event);
                return Ok(false);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn literal(text: &str) -> Regex {
    Regex::new(&regex::escape(text)).expect("escaped literal is a valid pattern")
}
