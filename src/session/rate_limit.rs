//! Fixed-window rate limiting for outbound requests.
//!
//! Every attempted request is counted before dispatch, so rejected requests
//! still consume budget and a retry storm cannot reset the window.

use std::time::Instant;

use serde::Serialize;

use crate::config::RateLimitConfig;

/// Published view of the current window, for the presentation layer.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateLimitInfo {
    pub request_count: u32,
    pub limited: bool,
    /// Milliseconds until the current window expires.
    pub window_remaining_ms: u64,
}

/// Sliding fixed-window counter.
#[derive(Debug)]
pub struct RateLimitWindow {
    config: RateLimitConfig,
    request_count: u32,
    window_start: Instant,
    limited: bool,
}

impl RateLimitWindow {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            request_count: 0,
            window_start: Instant::now(),
            limited: false,
        }
    }

    /// Count an attempted request and report whether it may proceed.
    ///
    /// An expired window is reset before evaluation; `window_start` only
    /// ever moves forward. Once the count exceeds the limit, `limited`
    /// stays set until the window rolls over.
    pub fn check(&mut self) -> bool {
        self.check_at(Instant::now())
    }

    /// Clock-injected variant of [`RateLimitWindow::check`] for tests.
    pub fn check_at(&mut self, now: Instant) -> bool {
        if now.duration_since(self.window_start) > self.config.window() {
            self.request_count = 0;
            self.window_start = now;
            self.limited = false;
        }

        self.request_count += 1;
        if self.request_count > self.config.max_requests {
            if !self.limited {
                tracing::warn!(
                    count = self.request_count,
                    limit = self.config.max_requests,
                    "rate limit reached"
                );
            }
            self.limited = true;
            return false;
        }
        true
    }

    pub fn is_limited(&self) -> bool {
        self.limited
    }

    pub fn request_count(&self) -> u32 {
        self.request_count
    }

    pub fn info(&self) -> RateLimitInfo {
        self.info_at(Instant::now())
    }

    fn info_at(&self, now: Instant) -> RateLimitInfo {
        let elapsed = now.duration_since(self.window_start);
        let remaining = self.config.window().saturating_sub(elapsed);
        RateLimitInfo {
            request_count: self.request_count,
            limited: self.limited,
            window_remaining_ms: remaining.as_millis() as u64,
        }
    }
}
