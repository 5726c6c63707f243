//! Configuration for the resilience core.
//!
//! All structs use `#[serde(default)]` so a partial TOML file (or an empty
//! one) is valid; missing fields fall back to defaults.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Root configuration, one section per subsystem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub memory: MemoryConfig,
    pub offline_queue: OfflineQueueConfig,
}

impl TetherConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing file yields defaults; a present but malformed file is a
    /// validation error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SyncError::Validation(format!("failed to read config: {e}")))?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| SyncError::Validation(format!("failed to parse config: {e}")))
    }
}

/// Retry behavior for document reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum underlying attempts per operation (1 = no retries).
    /// Default: 3
    pub attempts: u32,

    /// Delay before the first retry, in milliseconds.
    /// Default: 250
    pub base_delay_ms: u64,

    /// Double the delay after each failed attempt.
    /// Default: true
    pub exponential: bool,

    /// Upper bound on a single retry delay, in milliseconds.
    /// Default: 5000
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay_ms: 250,
            exponential: true,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before attempt `attempt` (1-based; attempt 1 has no
    /// preceding delay).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let millis = if self.exponential {
            let shift = (attempt - 2).min(16);
            self.base_delay_ms.saturating_mul(1u64 << shift)
        } else {
            self.base_delay_ms
        };
        Duration::from_millis(millis.min(self.max_delay_ms))
    }
}

/// Fixed-window outbound request budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window.
    /// Default: 30
    pub max_requests: u32,

    /// Window duration in milliseconds.
    /// Default: 60000 (one minute)
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window_ms: 60_000,
        }
    }
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Bounds on the in-memory message log footprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Estimated-size budget in bytes before pruning kicks in.
    /// Default: 262144 (256 KiB)
    pub max_estimated_size: usize,

    /// Number of most recent messages whose metadata is never pruned.
    /// Default: 10
    pub protected_recent: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_estimated_size: 256 * 1024,
            protected_recent: 10,
        }
    }
}

/// Bounds on the offline write queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OfflineQueueConfig {
    /// Maximum retained records; the oldest is dropped on overflow.
    /// Default: 200
    pub max_records: usize,

    /// Maximum retained age in seconds; older records are dropped.
    /// Default: 86400 (one day)
    pub max_age_secs: u64,

    /// Replay attempts per record before it is dropped.
    /// Default: 5
    pub max_replay_attempts: u32,
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            max_records: 200,
            max_age_secs: 86_400,
            max_replay_attempts: 5,
        }
    }
}
