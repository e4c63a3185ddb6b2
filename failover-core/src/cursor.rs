//! Kernel log cursor for exactly-once event observation.
//!
//! The kernel log of a test node accumulates for the whole lifetime of the
//! machine. Searching the full text would re-match events produced by earlier
//! test cases, or by the disable step while waiting for re-enable. The cursor
//! remembers the snapshot that was last scanned up to a match, so the next
//! search only looks at what the kernel wrote afterwards.

/// Tracks the already-scanned prefix of a node's kernel log.
///
/// The cursor only moves forward: it is replaced wholesale by the latest full
/// snapshot whenever a match is found in that snapshot's delta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogCursor {
    /// Full log text as of the last match.
    scanned: String,
}

impl LogCursor {
    /// Create an empty cursor (nothing scanned yet).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cursor that treats `snapshot` as already scanned.
    ///
    /// Useful to ignore boot-time messages before a run starts.
    pub fn at(snapshot: impl Into<String>) -> Self {
        Self {
            scanned: snapshot.into(),
        }
    }

    /// Text scanned so far.
    pub fn scanned(&self) -> &str {
        &self.scanned
    }

    /// The part of `snapshot` not yet scanned.
    ///
    /// Normally the snapshot starts with the scanned text and the delta is the
    /// remainder. When it does not (the kernel ring buffer wrapped, or the log
    /// was cleared) the delta starts after the last scanned line still present
    /// in the snapshot, or is the whole snapshot if none is.
    pub fn delta<'a>(&self, snapshot: &'a str) -> &'a str {
        if self.scanned.is_empty() {
            return snapshot;
        }
        if let Some(rest) = snapshot.strip_prefix(self.scanned.as_str()) {
            return rest;
        }

        let last_line = self
            .scanned
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty());
        match last_line.and_then(|line| snapshot.rfind(line).map(|pos| pos + line.len())) {
            Some(end) => &snapshot[end..],
            None => snapshot,
        }
    }

    /// Record `snapshot` as fully scanned.
    pub fn advance(&mut self, snapshot: impl Into<String>) {
        self.scanned = snapshot.into();
    }
}
