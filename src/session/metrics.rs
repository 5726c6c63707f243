//! Request performance accounting.

use serde::Serialize;

/// Running request statistics, updated exactly once per completed request.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PerformanceMetrics {
    /// Running mean over all requests, successes and failures alike.
    pub average_response_time_ms: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
    /// `failed_requests / total_requests`, recomputed every update.
    pub failure_rate: f64,
}

impl PerformanceMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one completed request into the running statistics.
    pub fn record(&mut self, duration_ms: f64, succeeded: bool) {
        self.total_requests += 1;
        if !succeeded {
            self.failed_requests += 1;
        }
        // Incremental mean: avg += (x - avg) / n
        self.average_response_time_ms +=
            (duration_ms - self.average_response_time_ms) / self.total_requests as f64;
        self.failure_rate = self.failed_requests as f64 / self.total_requests as f64;
    }
}
