//! The shared failure counter of a sub-experiment run.

use std::sync::Mutex;

/// Counts failed requests and decides when a run must be aborted.
///
/// The threshold is a tenth of the nominal request count, computed from the first burst size as
/// `bursts * burst_sizes[0] / 10` with integer division. The budget is exceeded once the number of
/// failures is strictly greater than the threshold.
#[derive(Debug)]
pub struct ErrorBudget {
    count: Mutex<usize>,
    threshold: usize,
}

impl ErrorBudget {
    /// Creates an empty budget for the given schedule.
    pub fn new(bursts: usize, first_burst_size: usize) -> Self {
        Self::with_threshold(bursts.saturating_mul(first_burst_size) / 10)
    }

    /// Creates an empty budget with an explicit threshold.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            count: Mutex::new(0),
            threshold,
        }
    }

    /// Records one failed request and returns the updated count.
    pub fn record_failure(&self) -> usize {
        let mut count = self.count.lock().unwrap_or_else(|poison| poison.into_inner());
        *count += 1;
        *count
    }

    /// Returns the number of failures recorded so far.
    pub fn count(&self) -> usize {
        *self.count.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Returns the maximum number of failures tolerated.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns `true` once the failure count strictly exceeds the threshold.
    pub fn is_exceeded(&self) -> bool {
        self.count() > self.threshold
    }
}
