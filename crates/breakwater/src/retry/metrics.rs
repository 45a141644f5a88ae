//! Retry metrics for monitoring

use serde::Serialize;

/// Point-in-time snapshot of a retry entity's outcome counters
///
/// Each protected call lands in exactly one bucket at its terminal outcome,
/// so the four counters partition the call history. Ignored errors count as
/// failures without retry. Counters never reset and never decrease.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RetryMetrics {
    /// Calls that succeeded on the first attempt
    pub successful_calls_without_retry: u64,
    /// Calls that succeeded after at least one retry
    pub successful_calls_with_retry: u64,
    /// Calls that failed terminally without a single retry
    pub failed_calls_without_retry: u64,
    /// Calls that failed terminally after exhausting all retries
    pub failed_calls_with_retry: u64,
}

impl RetryMetrics {
    /// Total number of terminal outcomes recorded
    pub fn total_calls(&self) -> u64 {
        self.successful_calls_without_retry
            + self.successful_calls_with_retry
            + self.failed_calls_without_retry
            + self.failed_calls_with_retry
    }
}
