//! Offline write queue.
//!
//! Mutations that fail for connectivity reasons are parked here and replayed
//! once the network monitor reports online again. Order is FIFO per document
//! path; the queue is bounded by record count and age so a long offline
//! stretch cannot grow memory without limit.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::OfflineQueueConfig;

use super::conflict::ResolveConflict;
use super::{DocumentRef, Fields};

/// Whether a queued mutation replaces the document or merges into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Replace,
    Merge,
}

/// A deferred document mutation.
pub struct OfflineWriteRecord {
    pub doc: DocumentRef,
    pub fields: Fields,
    pub kind: WriteKind,
    /// Conflict strategy captured at enqueue time, applied at replay.
    pub conflict: Option<Arc<dyn ResolveConflict>>,
    pub queued_at: DateTime<Utc>,
    /// Replay attempts so far.
    pub attempts: u32,
}

impl OfflineWriteRecord {
    pub fn new(
        doc: DocumentRef,
        fields: Fields,
        kind: WriteKind,
        conflict: Option<Arc<dyn ResolveConflict>>,
    ) -> Self {
        Self {
            doc,
            fields,
            kind,
            conflict,
            queued_at: Utc::now(),
            attempts: 0,
        }
    }
}

impl std::fmt::Debug for OfflineWriteRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineWriteRecord")
            .field("doc", &self.doc)
            .field("kind", &self.kind)
            .field("conflict", &self.conflict.as_ref().map(|c| c.name()))
            .field("queued_at", &self.queued_at)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

/// Bounded FIFO of deferred mutations.
pub struct OfflineQueue {
    records: VecDeque<OfflineWriteRecord>,
    config: OfflineQueueConfig,
}

impl OfflineQueue {
    pub fn new(config: OfflineQueueConfig) -> Self {
        Self {
            records: VecDeque::new(),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Replay attempts a record gets before the replay pass drops it.
    pub fn max_replay_attempts(&self) -> u32 {
        self.config.max_replay_attempts
    }

    /// Append a record, dropping the oldest entry if the queue is full.
    pub fn push(&mut self, record: OfflineWriteRecord) {
        if self.records.len() >= self.config.max_records {
            if let Some(dropped) = self.records.pop_front() {
                tracing::warn!(
                    doc = %dropped.doc,
                    "offline queue full, dropping oldest record"
                );
            }
        }
        tracing::debug!(doc = %record.doc, kind = ?record.kind, "queued offline write");
        self.records.push_back(record);
    }

    /// Remove and return every record, oldest first.
    pub fn drain(&mut self) -> Vec<OfflineWriteRecord> {
        self.records.drain(..).collect()
    }

    /// Put back records that could not be replayed, preserving their
    /// relative order ahead of anything queued meanwhile.
    pub fn restore(&mut self, records: Vec<OfflineWriteRecord>) {
        for record in records.into_iter().rev() {
            self.records.push_front(record);
        }
    }

    /// Drop records older than the configured maximum age. Returns how many
    /// were discarded.
    pub fn evict_expired(&mut self) -> usize {
        self.evict_expired_at(Utc::now())
    }

    fn evict_expired_at(&mut self, now: DateTime<Utc>) -> usize {
        let max_age = ChronoDuration::seconds(self.config.max_age_secs as i64);
        let before = self.records.len();
        self.records.retain(|record| now - record.queued_at <= max_age);
        let dropped = before - self.records.len();
        if dropped > 0 {
            tracing::warn!(dropped, "evicted expired offline writes");
        }
        dropped
    }

    /// Document paths currently queued, oldest first.
    pub fn pending_paths(&self) -> Vec<String> {
        self.records.iter().map(|r| r.doc.path().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(path: &str) -> OfflineWriteRecord {
        OfflineWriteRecord::new(DocumentRef::new(path), Fields::new(), WriteKind::Replace, None)
    }

    fn queue(max_records: usize, max_age_secs: u64) -> OfflineQueue {
        OfflineQueue::new(OfflineQueueConfig {
            max_records,
            max_age_secs,
            max_replay_attempts: 5,
        })
    }

    #[test]
    fn test_fifo_order() {
        let mut q = queue(10, 3600);
        q.push(record("a"));
        q.push(record("b"));
        q.push(record("a"));

        assert_eq!(q.pending_paths(), vec!["a", "b", "a"]);
        let drained = q.drain();
        assert_eq!(drained.len(), 3);
        assert!(q.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut q = queue(2, 3600);
        q.push(record("a"));
        q.push(record("b"));
        q.push(record("c"));

        assert_eq!(q.pending_paths(), vec!["b", "c"]);
    }

    #[test]
    fn test_restore_preserves_order_ahead_of_new_records() {
        let mut q = queue(10, 3600);
        q.push(record("a"));
        q.push(record("b"));

        let drained = q.drain();
        q.push(record("c"));
        q.restore(drained);

        assert_eq!(q.pending_paths(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_expired_records_are_evicted() {
        let mut q = queue(10, 60);
        let mut old = record("stale");
        old.queued_at = Utc::now() - ChronoDuration::seconds(120);
        q.push(old);
        q.push(record("fresh"));

        assert_eq!(q.evict_expired(), 1);
        assert_eq!(q.pending_paths(), vec!["fresh"]);
    }
}
