//! Resilient access to the remote document store.
//!
//! The remote store is an opaque key→value document service reached through
//! the [`DocumentBackend`] trait. [`client::ResilientDocumentClient`] wraps
//! every backend call in retry-with-backoff, resolves conflicting concurrent
//! writes through a pluggable strategy, and parks mutations in an offline
//! queue while the [`crate::network::NetworkMonitor`] reports no
//! connectivity.

pub mod client;
pub mod conflict;
pub mod memory;
pub mod offline;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use client::{
    NoDelay, ReadOptions, ReplayReport, ResilientDocumentClient, RetryDelay, TokioDelay,
    UpdateOptions, WriteOptions,
};
pub use conflict::{ClientWins, ResolveConflict, ServerWins};
pub use memory::MemoryBackend;
pub use offline::{OfflineQueue, OfflineWriteRecord, WriteKind};

/// Open mapping of field name → value carried by a document.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// Path-like key identifying a document in the remote store,
/// e.g. `"sessions/abc123"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentRef(String);

impl DocumentRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentRef {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// A stored document: its fields plus the version marker stamped on every
/// write. The marker is only ever compared for ordering/equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub fields: Fields,
    /// Wall-clock time of the last successful write.
    pub updated_at: DateTime<Utc>,
    /// Monotonic revision counter, starting at 1.
    pub version: u64,
}

impl Document {
    /// Stamp `fields` with a fresh version marker following `prior_version`.
    pub fn stamp(fields: Fields, prior_version: Option<u64>) -> Self {
        Self {
            fields,
            updated_at: Utc::now(),
            version: prior_version.map_or(1, |v| v + 1),
        }
    }

    /// Whether two documents carry the same version marker.
    pub fn same_version(&self, other: &Document) -> bool {
        self.version == other.version && self.updated_at == other.updated_at
    }
}

/// Transport boundary to the remote document store.
///
/// Implementations map their own failure modes onto the
/// [`crate::error::SyncError`] taxonomy; a missing document is `Ok(None)`,
/// never an error.
#[async_trait]
pub trait DocumentBackend: Send + Sync {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>>;

    async fn put(&self, doc: &DocumentRef, document: Document) -> Result<()>;
}
