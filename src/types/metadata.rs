//! Per-call stream metadata

use serde::{Deserialize, Serialize};

/// Timing and burst information exchanged with the streaming calls.
///
/// On reads the connection fills both fields; on writes and stream control the caller
/// sets them. `timestamp` counts samples in the device clock domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamMetadata {
    /// `None` when no timestamp applies.
    pub timestamp: Option<u64>,
    pub end_of_burst: bool,
}

impl StreamMetadata {
    /// Metadata pinning the first sample to `timestamp`.
    pub fn at(timestamp: u64) -> Self {
        Self { timestamp: Some(timestamp), end_of_burst: false }
    }

    pub fn with_end_of_burst(mut self, end_of_burst: bool) -> Self {
        self.end_of_burst = end_of_burst;
        self
    }
}
