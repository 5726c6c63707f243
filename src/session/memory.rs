//! Memory accounting and pruning for the message log.
//!
//! The footprint estimate is the length of the canonical JSON form of the
//! log: deterministic, and monotone in both message count and content
//! length. When the estimate exceeds the configured budget, unkept metadata
//! is pruned from older messages, oldest first, leaving a protected recent
//! tail untouched. Message id/role/text/timestamp are never removed.

use chrono::Utc;
use serde::Serialize;

use crate::config::MemoryConfig;

use super::message::Message;

/// Published memory footprint of the message log.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStats {
    pub message_count: usize,
    /// Length of the canonical serialized form of the log, in bytes.
    pub estimated_size: usize,
    /// Age of the oldest retained message, if any.
    pub oldest_message_age_ms: Option<u64>,
}

/// Outcome of one [`optimize`] pass.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PruneOutcome {
    /// Messages whose metadata lost at least one entry.
    pub pruned_messages: usize,
    pub size_before: usize,
    pub size_after: usize,
    /// Whether any pruning happened at all.
    pub pruned: bool,
}

/// Serialization-based size estimate for the log. An empty log is 0.
pub fn estimate_size(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }
    serde_json::to_string(messages).map_or(0, |s| s.len())
}

/// Current footprint of the log.
pub fn stats(messages: &[Message]) -> MemoryStats {
    let now = Utc::now();
    MemoryStats {
        message_count: messages.len(),
        estimated_size: estimate_size(messages),
        oldest_message_age_ms: messages.first().map(|m| m.age_ms(now)),
    }
}

/// Prune unkept metadata from older messages until the estimate fits the
/// budget (or there is nothing left to prune).
///
/// The most recent `protected_recent` messages are never touched. The pass
/// is idempotent: running it again without new appends removes nothing and
/// leaves the estimate unchanged. The estimate never increases.
pub fn optimize(messages: &mut [Message], config: &MemoryConfig) -> PruneOutcome {
    let size_before = estimate_size(messages);
    if size_before <= config.max_estimated_size {
        return PruneOutcome {
            pruned_messages: 0,
            size_before,
            size_after: size_before,
            pruned: false,
        };
    }

    let prunable_end = messages.len().saturating_sub(config.protected_recent);
    let mut pruned_messages = 0;
    let mut size_after = size_before;

    for idx in 0..prunable_end {
        if size_after <= config.max_estimated_size {
            break;
        }
        if messages[idx].metadata.prune() {
            pruned_messages += 1;
            size_after = estimate_size(messages);
        }
    }

    if pruned_messages > 0 {
        tracing::debug!(
            pruned_messages,
            size_before,
            size_after,
            "pruned message metadata"
        );
    }

    PruneOutcome {
        pruned_messages,
        size_before,
        size_after,
        pruned: pruned_messages > 0,
    }
}
