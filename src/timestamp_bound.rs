//! Spanner staleness specifiers for read-only transactions and single-use reads.

use std::time::{Duration, SystemTime};

/// How stale a read-only transaction's snapshot is allowed to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampBound {
    /// Read at a timestamp where all previously committed writes are visible.
    Strong,
    /// Read at a timestamp no older than the given duration in the past.
    ExactStaleness(Duration),
    /// Read at a timestamp no older than the given duration, chosen by the server.
    MaxStaleness(Duration),
    /// Read at the given exact timestamp.
    ReadTimestamp(SystemTime),
    /// Read at a timestamp no older than the given timestamp, chosen by the server.
    MinReadTimestamp(SystemTime),
}

impl TimestampBound {
    pub fn strong_read() -> Self {
        TimestampBound::Strong
    }
}

impl Default for TimestampBound {
    fn default() -> Self {
        TimestampBound::Strong
    }
}
