//! Resilient document client.
//!
//! Wraps every backend read/write/update in retry-with-backoff, resolves
//! write conflicts through the configured strategy, and falls back to the
//! offline queue when the network monitor reports no connectivity. Retry
//! pacing goes through the [`RetryDelay`] trait so tests can run the loops
//! without real sleeps.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::{RetryConfig, TetherConfig};
use crate::error::{Result, SyncError};
use crate::network::NetworkMonitor;
use crate::observer::SubscriberId;

use super::conflict::ResolveConflict;
use super::offline::{OfflineQueue, OfflineWriteRecord, WriteKind};
use super::{Document, DocumentBackend, DocumentRef, Fields};

/// Pacing between retry attempts.
#[async_trait]
pub trait RetryDelay: Send + Sync {
    async fn wait(&self, pause: Duration);
}

/// Real delays via the tokio timer.
pub struct TokioDelay;

#[async_trait]
impl RetryDelay for TokioDelay {
    async fn wait(&self, pause: Duration) {
        tokio::time::sleep(pause).await;
    }
}

/// No-op delay for tests.
pub struct NoDelay;

#[async_trait]
impl RetryDelay for NoDelay {
    async fn wait(&self, _pause: Duration) {}
}

/// Per-call options for [`ResilientDocumentClient::read`].
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    /// Override the configured maximum attempt count.
    pub retry_attempts: Option<u32>,
}

/// Per-call options for [`ResilientDocumentClient::write`].
#[derive(Clone, Default)]
pub struct WriteOptions {
    /// Strategy applied when a prior version of the document exists.
    pub conflict_resolution: Option<Arc<dyn ResolveConflict>>,
    /// Queue the mutation for replay instead of failing on connectivity
    /// errors.
    pub offline_support: bool,
}

/// Per-call options for [`ResilientDocumentClient::update`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    pub offline_support: bool,
}

/// Outcome of one offline-queue replay pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ReplayReport {
    /// Records written successfully.
    pub replayed: usize,
    /// Records put back for a later pass.
    pub requeued: usize,
    /// Records discarded for exceeding the retained age.
    pub dropped: usize,
}

/// Document store access with retry, conflict resolution, and offline
/// queuing.
pub struct ResilientDocumentClient {
    backend: Arc<dyn DocumentBackend>,
    network: Arc<NetworkMonitor>,
    queue: Mutex<OfflineQueue>,
    retry: RetryConfig,
    delay: Arc<dyn RetryDelay>,
}

impl ResilientDocumentClient {
    pub fn new(
        backend: Arc<dyn DocumentBackend>,
        network: Arc<NetworkMonitor>,
        config: &TetherConfig,
    ) -> Self {
        Self::with_delay(backend, network, config, Arc::new(TokioDelay))
    }

    /// Construct with a custom [`RetryDelay`], letting tests drive retry
    /// loops without waiting out real backoff.
    pub fn with_delay(
        backend: Arc<dyn DocumentBackend>,
        network: Arc<NetworkMonitor>,
        config: &TetherConfig,
        delay: Arc<dyn RetryDelay>,
    ) -> Self {
        Self {
            backend,
            network,
            queue: Mutex::new(OfflineQueue::new(config.offline_queue.clone())),
            retry: config.retry.clone(),
            delay,
        }
    }

    /// Read a document.
    ///
    /// A missing document is `Ok(None)`, not an error. Retryable failures
    /// are retried up to the attempt budget with backoff between attempts;
    /// the terminal error is the last one observed.
    pub async fn read(&self, doc: &DocumentRef, opts: &ReadOptions) -> Result<Option<Document>> {
        Self::validate_ref(doc)?;
        let attempts = opts.retry_attempts.unwrap_or(self.retry.attempts);
        self.get_with_retry(doc, attempts).await
    }

    /// Write the full payload of a document.
    ///
    /// If a prior version exists and a strategy is configured, the strategy
    /// resolves the final fields before writing. The resolved fields are
    /// stamped with a fresh version marker. Connectivity failures queue the
    /// mutation when `offline_support` is set, reported as
    /// [`SyncError::QueuedOffline`] so callers can tell "queued" apart from
    /// "failed".
    pub async fn write(
        &self,
        doc: &DocumentRef,
        fields: Fields,
        opts: &WriteOptions,
    ) -> Result<Document> {
        Self::validate_ref(doc)?;
        if !self.network.is_online() {
            return self.park_or_fail(
                doc,
                fields,
                WriteKind::Replace,
                opts.conflict_resolution.clone(),
                opts.offline_support,
                SyncError::Network(format!("offline: {doc}")),
            );
        }

        let queued_fields = opts.offline_support.then(|| fields.clone());
        match self
            .write_online(doc, fields, opts.conflict_resolution.clone(), WriteKind::Replace)
            .await
        {
            Ok(written) => Ok(written),
            Err(err) if err.is_retryable() => {
                if let Some(fields) = queued_fields {
                    self.park_or_fail(
                        doc,
                        fields,
                        WriteKind::Replace,
                        opts.conflict_resolution.clone(),
                        true,
                        err,
                    )
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Merge a partial payload onto an existing document.
    ///
    /// Missing documents are created from the partial payload. Always stamps
    /// a fresh `updated_at`. Same retry/offline semantics as
    /// [`ResilientDocumentClient::write`].
    pub async fn update(
        &self,
        doc: &DocumentRef,
        partial: Fields,
        opts: &UpdateOptions,
    ) -> Result<Document> {
        Self::validate_ref(doc)?;
        if !self.network.is_online() {
            return self.park_or_fail(
                doc,
                partial,
                WriteKind::Merge,
                None,
                opts.offline_support,
                SyncError::Network(format!("offline: {doc}")),
            );
        }

        let queued_fields = opts.offline_support.then(|| partial.clone());
        match self.write_online(doc, partial, None, WriteKind::Merge).await {
            Ok(written) => Ok(written),
            Err(err) if err.is_retryable() => {
                if let Some(fields) = queued_fields {
                    self.park_or_fail(doc, fields, WriteKind::Merge, None, true, err)
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Replay queued mutations, strictly FIFO per document path.
    ///
    /// A record that fails again is re-queued and blocks later records for
    /// the same path in this pass, so a stale write can never clobber a
    /// newer one. Expired records are discarded first, and a record that
    /// reaches the configured replay-attempt limit is dropped.
    pub async fn replay_offline_queue(&self) -> ReplayReport {
        let (drained, dropped, max_attempts) = {
            let mut queue = self.queue.lock();
            let dropped = queue.evict_expired();
            let max_attempts = queue.max_replay_attempts();
            (queue.drain(), dropped, max_attempts)
        };

        let mut report = ReplayReport {
            dropped,
            ..Default::default()
        };
        if drained.is_empty() {
            return report;
        }

        let mut blocked: HashSet<String> = HashSet::new();
        let mut kept = Vec::new();

        for mut record in drained {
            if blocked.contains(record.doc.path()) {
                report.requeued += 1;
                kept.push(record);
                continue;
            }

            let outcome = self
                .write_online(
                    &record.doc,
                    record.fields.clone(),
                    record.conflict.clone(),
                    record.kind,
                )
                .await;
            match outcome {
                Ok(_) => {
                    tracing::debug!(doc = %record.doc, "replayed offline write");
                    report.replayed += 1;
                }
                Err(err) => {
                    tracing::warn!(doc = %record.doc, "offline replay failed: {err}");
                    record.attempts += 1;
                    blocked.insert(record.doc.path().to_string());
                    if record.attempts >= max_attempts {
                        tracing::warn!(
                            doc = %record.doc,
                            attempts = record.attempts,
                            "dropping offline write after repeated replay failures"
                        );
                        report.dropped += 1;
                    } else {
                        report.requeued += 1;
                        kept.push(record);
                    }
                }
            }
        }

        self.queue.lock().restore(kept);
        report
    }

    /// Register on the network monitor so an offline→online transition
    /// triggers a replay pass. The replay runs on a spawned task; requires
    /// a tokio runtime.
    pub fn watch_network(self: &Arc<Self>) -> SubscriberId {
        let weak = Arc::downgrade(self);
        self.network.subscribe(move |online| {
            if !*online {
                return;
            }
            let Some(client) = weak.upgrade() else {
                return;
            };
            tokio::spawn(async move {
                let report = client.replay_offline_queue().await;
                tracing::debug!(?report, "reconnect replay finished");
            });
        })
    }

    /// Mutations currently waiting for connectivity.
    pub fn queued_writes(&self) -> usize {
        self.queue.lock().len()
    }

    fn validate_ref(doc: &DocumentRef) -> Result<()> {
        if doc.is_empty() {
            return Err(SyncError::Validation("empty document path".into()));
        }
        Ok(())
    }

    fn park_or_fail(
        &self,
        doc: &DocumentRef,
        fields: Fields,
        kind: WriteKind,
        conflict: Option<Arc<dyn ResolveConflict>>,
        offline_support: bool,
        err: SyncError,
    ) -> Result<Document> {
        if !offline_support {
            return Err(err);
        }
        self.queue
            .lock()
            .push(OfflineWriteRecord::new(doc.clone(), fields, kind, conflict));
        Err(SyncError::QueuedOffline(doc.path().to_string()))
    }

    async fn write_online(
        &self,
        doc: &DocumentRef,
        fields: Fields,
        conflict: Option<Arc<dyn ResolveConflict>>,
        kind: WriteKind,
    ) -> Result<Document> {
        let prior = self.get_with_retry(doc, self.retry.attempts).await?;

        let resolved = match kind {
            WriteKind::Replace => match (&prior, &conflict) {
                (Some(server), Some(strategy)) => {
                    tracing::debug!(doc = %doc, strategy = strategy.name(), "resolving write conflict");
                    strategy.resolve(&fields, &server.fields)
                }
                _ => fields,
            },
            WriteKind::Merge => {
                let mut base = prior
                    .as_ref()
                    .map(|server| server.fields.clone())
                    .unwrap_or_default();
                for (key, value) in fields {
                    base.insert(key, value);
                }
                base
            }
        };

        let stamped = Document::stamp(resolved, prior.as_ref().map(|p| p.version));
        self.put_with_retry(doc, stamped.clone()).await?;
        Ok(stamped)
    }

    async fn get_with_retry(&self, doc: &DocumentRef, attempts: u32) -> Result<Option<Document>> {
        let attempts = attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            let pause = self.retry.delay_before(attempt);
            if !pause.is_zero() {
                self.delay.wait(pause).await;
            }
            match self.backend.get(doc).await {
                Ok(found) => return Ok(found),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::debug!(doc = %doc, attempt, "read attempt failed: {err}");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| SyncError::Unknown("retry budget exhausted".into())))
    }

    async fn put_with_retry(&self, doc: &DocumentRef, document: Document) -> Result<()> {
        let attempts = self.retry.attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            let pause = self.retry.delay_before(attempt);
            if !pause.is_zero() {
                self.delay.wait(pause).await;
            }
            match self.backend.put(doc, document.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    tracing::debug!(doc = %doc, attempt, "write attempt failed: {err}");
                    last_err = Some(err);
                }
                Err(err) => return Err(err),
            }
        }
        Err(last_err.unwrap_or_else(|| SyncError::Unknown("retry budget exhausted".into())))
    }
}
