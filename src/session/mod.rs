//! Session state controller.
//!
//! [`SessionController`] is the single owner of the user-visible
//! conversation and its operational envelope: the ordered message log,
//! loading/error flags, the rate-limit window, performance metrics, and
//! memory accounting. It is the only surface the presentation layer talks
//! to; the document client and network monitor feed it results and
//! connectivity changes.

pub mod memory;
pub mod message;
pub mod metrics;
pub mod rate_limit;

use std::time::Instant;

use serde::Serialize;
use uuid::Uuid;

use crate::config::{MemoryConfig, TetherConfig};
use crate::error::{ErrorSeverity, Result, SyncError};
use crate::observer::{Publisher, SubscriberId};
use crate::store::{Document, DocumentRef, Fields, ResilientDocumentClient, WriteOptions};

pub use memory::{MemoryStats, PruneOutcome};
pub use message::{Message, MessageMetadata, MessageRole};
pub use metrics::PerformanceMetrics;
pub use rate_limit::{RateLimitInfo, RateLimitWindow};

/// State changes published for the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    MessageAppended { id: String },
    MessageDeleted { id: String },
    MessagesCleared { session_id: String },
    ErrorChanged { error: Option<String> },
    OnlineChanged { online: bool },
}

/// Phases of one outbound request, for observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPhase {
    Idle,
    CheckingRateLimit,
    Rejected,
    Dispatching,
    Succeeded,
    FailedTerminal,
}

/// How a dispatched request ended.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The write reached the store; the stamped document is returned.
    Completed(Document),
    /// The write was parked in the offline queue for later replay.
    Queued,
    /// The rate limiter rejected the request before dispatch.
    Rejected,
}

/// Read-only view of the controller state, serializable for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub is_loading: bool,
    pub error: Option<String>,
    pub is_online: bool,
    pub metrics: PerformanceMetrics,
    pub rate_limit: RateLimitInfo,
    pub memory: MemoryStats,
}

/// Canonical in-memory session state.
pub struct SessionController {
    session_id: String,
    messages: Vec<Message>,
    is_loading: bool,
    error: Option<String>,
    is_online: bool,
    rate_limit: RateLimitWindow,
    metrics: PerformanceMetrics,
    memory_config: MemoryConfig,
    phase: RequestPhase,
    events: Publisher<SessionEvent>,
}

impl SessionController {
    pub fn new(config: &TetherConfig) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            is_loading: false,
            error: None,
            is_online: true,
            rate_limit: RateLimitWindow::new(config.rate_limit.clone()),
            metrics: PerformanceMetrics::new(),
            memory_config: config.memory.clone(),
            phase: RequestPhase::Idle,
            events: Publisher::new(),
        }
    }

    /// Opaque token identifying the current conversation; regenerated by
    /// [`SessionController::clear_messages`].
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.is_loading = loading;
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_online(&self) -> bool {
        self.is_online
    }

    pub fn metrics(&self) -> PerformanceMetrics {
        self.metrics
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    /// Register an event listener; fired on log, error, and online changes.
    pub fn subscribe_events<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler)
    }

    pub fn unsubscribe_events(&self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Append a message to the log. Appends are ordered by call order.
    /// Returns the message id.
    pub fn append_message(&mut self, message: Message) -> String {
        let id = message.id.clone();
        self.messages.push(message);
        self.events.publish(&SessionEvent::MessageAppended { id: id.clone() });
        id
    }

    /// Append streamed text to an existing message in place.
    pub fn append_to_message(&mut self, id: &str, chunk: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == id) {
            Some(message) => {
                message.text.push_str(chunk);
                true
            }
            None => false,
        }
    }

    /// Remove a message by id. Returns false if no message matched.
    pub fn delete_message(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        let deleted = self.messages.len() != before;
        if deleted {
            self.events.publish(&SessionEvent::MessageDeleted { id: id.to_string() });
        }
        deleted
    }

    /// Empty the log, reset memory usage to zero, and start a fresh session
    /// identity.
    pub fn clear_messages(&mut self) {
        self.messages.clear();
        self.session_id = Uuid::new_v4().to_string();
        tracing::debug!(session_id = %self.session_id, "cleared conversation");
        self.events.publish(&SessionEvent::MessagesCleared {
            session_id: self.session_id.clone(),
        });
    }

    /// Count an attempted outbound request against the current window.
    /// Call exactly once per attempt, before dispatch; rejected requests
    /// still count.
    pub fn check_rate_limit(&mut self) -> bool {
        self.rate_limit.check()
    }

    pub fn rate_limit_info(&self) -> RateLimitInfo {
        self.rate_limit.info()
    }

    /// Fold one completed request into the performance metrics.
    pub fn record_request(&mut self, duration_ms: f64, succeeded: bool) {
        self.metrics.record(duration_ms, succeeded);
    }

    pub fn memory_stats(&self) -> MemoryStats {
        memory::stats(&self.messages)
    }

    /// Prune metadata from older messages if the log exceeds its budget.
    /// Idempotent; never increases the estimate.
    pub fn optimize_memory(&mut self) -> PruneOutcome {
        memory::optimize(&mut self.messages, &self.memory_config)
    }

    /// Mirror the network monitor's broadcast into published state.
    pub fn set_online(&mut self, online: bool) {
        if self.is_online == online {
            return;
        }
        self.is_online = online;
        self.events.publish(&SessionEvent::OnlineChanged { online });
    }

    /// Surface an error to the user, worded by severity.
    pub fn apply_error(&mut self, err: &SyncError) {
        let notice = match err.severity() {
            ErrorSeverity::Transient => format!("Temporary connection problem: {err}"),
            ErrorSeverity::Low => "Saved locally; will sync when the connection returns".to_string(),
            ErrorSeverity::High => err.to_string(),
        };
        self.error = Some(notice.clone());
        self.events.publish(&SessionEvent::ErrorChanged { error: Some(notice) });
    }

    /// Reset the error field without touching any other state.
    pub fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.events.publish(&SessionEvent::ErrorChanged { error: None });
        }
    }

    /// Run one outbound request through its full lifecycle:
    /// rate-limit check → dispatch via the client → error/metrics update.
    ///
    /// Terminal outcomes (completed, queued, failed) record metrics exactly
    /// once; a rate-limit rejection never dispatches and records nothing.
    pub async fn dispatch(
        &mut self,
        client: &ResilientDocumentClient,
        doc: &DocumentRef,
        fields: Fields,
        opts: &WriteOptions,
    ) -> Result<DispatchOutcome> {
        self.phase = RequestPhase::CheckingRateLimit;
        if !self.check_rate_limit() {
            self.phase = RequestPhase::Rejected;
            tracing::debug!(doc = %doc, "request rejected by rate limiter");
            self.phase = RequestPhase::Idle;
            return Ok(DispatchOutcome::Rejected);
        }

        self.phase = RequestPhase::Dispatching;
        self.is_loading = true;
        let started = Instant::now();
        let result = client.write(doc, fields, opts).await;
        let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.is_loading = false;

        let outcome = match result {
            Ok(document) => {
                self.phase = RequestPhase::Succeeded;
                self.record_request(duration_ms, true);
                self.clear_error();
                Ok(DispatchOutcome::Completed(document))
            }
            Err(err) if err.is_queued() => {
                // Deferred success: the mutation is safe in the queue.
                self.phase = RequestPhase::Succeeded;
                self.record_request(duration_ms, true);
                self.apply_error(&err);
                Ok(DispatchOutcome::Queued)
            }
            Err(err) => {
                self.phase = RequestPhase::FailedTerminal;
                self.record_request(duration_ms, false);
                self.apply_error(&err);
                Err(err)
            }
        };
        self.phase = RequestPhase::Idle;
        outcome
    }

    /// Serializable view of everything the presentation layer reads.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            messages: self.messages.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            is_online: self.is_online,
            metrics: self.metrics,
            rate_limit: self.rate_limit.info(),
            memory: self.memory_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::network::NetworkMonitor;
    use crate::store::{DocumentBackend, MemoryBackend, NoDelay};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn controller() -> SessionController {
        SessionController::new(&TetherConfig::default())
    }

    fn client_over(
        backend: &Arc<MemoryBackend>,
        network: &Arc<NetworkMonitor>,
    ) -> ResilientDocumentClient {
        ResilientDocumentClient::with_delay(
            Arc::clone(backend) as Arc<dyn DocumentBackend>,
            Arc::clone(network),
            &TetherConfig::default(),
            Arc::new(NoDelay),
        )
    }

    fn fields(pairs: &[(&str, serde_json::Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_log_integrity_after_deletion() {
        let mut session = controller();
        let first = session.append_message(Message::user("one"));
        let second = session.append_message(Message::assistant("two"));

        assert!(session.delete_message(&first));
        assert_eq!(session.messages().len(), 1);
        assert_eq!(session.messages()[0].id, second);
        assert!(!session.delete_message(&first));
    }

    #[test]
    fn test_clear_resets_session_identity_and_memory() {
        let mut session = controller();
        session.append_message(Message::user("hello"));
        let old_id = session.session_id().to_string();
        assert!(session.memory_stats().estimated_size > 0);

        session.clear_messages();

        assert!(session.messages().is_empty());
        assert_eq!(session.memory_stats().estimated_size, 0);
        assert_ne!(session.session_id(), old_id);
    }

    #[test]
    fn test_metrics_running_mean() {
        let mut session = controller();
        session.record_request(1000.0, true);
        session.record_request(2000.0, true);

        let metrics = session.metrics();
        assert_eq!(metrics.average_response_time_ms, 1500.0);
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.failure_rate, 0.0);
    }

    #[test]
    fn test_streaming_append_mutates_in_place() {
        let mut session = controller();
        let id = session.append_message(Message::assistant(""));

        assert!(session.append_to_message(&id, "Hello"));
        assert!(session.append_to_message(&id, ", world"));
        assert!(!session.append_to_message("no-such-id", "x"));

        assert_eq!(session.messages()[0].text, "Hello, world");
    }

    #[test]
    fn test_clear_error_leaves_other_state() {
        let mut session = controller();
        session.append_message(Message::user("hi"));
        session.apply_error(&SyncError::Network("down".into()));
        assert!(session.error().is_some());

        session.clear_error();

        assert!(session.error().is_none());
        assert_eq!(session.messages().len(), 1);
    }

    #[test]
    fn test_set_online_mirrors_and_dedupes_events() {
        let mut session = controller();
        let flips = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&flips);
        session.subscribe_events(move |event| {
            if let SessionEvent::OnlineChanged { online } = event {
                seen.lock().push(*online);
            }
        });

        session.set_online(true); // already online
        session.set_online(false);
        session.set_online(false);
        session.set_online(true);

        assert_eq!(*flips.lock(), vec![false, true]);
    }

    #[test]
    fn test_optimize_memory_second_call_is_noop() {
        let mut session = SessionController::new(&TetherConfig {
            memory: MemoryConfig {
                max_estimated_size: 1,
                protected_recent: 0,
            },
            ..Default::default()
        });
        for i in 0..3 {
            let mut message = Message::user(format!("m{i}"));
            message
                .metadata
                .extra
                .insert("blob".into(), json!("x".repeat(300)));
            session.append_message(message);
        }

        let first = session.optimize_memory();
        let second = session.optimize_memory();
        assert!(first.pruned);
        assert_eq!(second.size_after, first.size_after);
        assert!(!second.pruned);
    }

    #[test]
    fn test_snapshot_exposes_read_surface() {
        let mut session = controller();
        session.append_message(Message::user("hi"));
        session.record_request(250.0, true);

        let snapshot = session.snapshot();
        assert_eq!(snapshot.messages.len(), 1);
        assert!(snapshot.is_online);
        assert_eq!(snapshot.metrics.total_requests, 1);
        assert_eq!(snapshot.memory.message_count, 1);

        // The snapshot must serialize cleanly for the frontend.
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"session_id\""));
    }

    #[tokio::test]
    async fn test_dispatch_success_records_metrics_once() {
        let backend = Arc::new(MemoryBackend::new());
        let network = Arc::new(NetworkMonitor::new());
        let client = client_over(&backend, &network);
        let mut session = controller();

        let outcome = session
            .dispatch(
                &client,
                &DocumentRef::new("sessions/1"),
                fields(&[("n", json!(1))]),
                &WriteOptions::default(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Completed(_)));
        assert_eq!(session.metrics().total_requests, 1);
        assert_eq!(session.metrics().failure_rate, 0.0);
        assert!(session.error().is_none());
        assert_eq!(session.phase(), RequestPhase::Idle);
        assert!(!session.is_loading());
    }

    #[tokio::test]
    async fn test_dispatch_rate_limited_never_dispatches() {
        let backend = Arc::new(MemoryBackend::new());
        let network = Arc::new(NetworkMonitor::new());
        let client = client_over(&backend, &network);
        let mut session = SessionController::new(&TetherConfig {
            rate_limit: RateLimitConfig {
                max_requests: 0,
                window_ms: 60_000,
            },
            ..Default::default()
        });

        let outcome = session
            .dispatch(
                &client,
                &DocumentRef::new("sessions/1"),
                Fields::new(),
                &WriteOptions::default(),
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Rejected));
        assert_eq!(backend.put_calls(), 0);
        // Rejected before dispatch: no completed request to account for.
        assert_eq!(session.metrics().total_requests, 0);
    }

    #[tokio::test]
    async fn test_dispatch_offline_queues_as_deferred_success() {
        let backend = Arc::new(MemoryBackend::new());
        let network = Arc::new(NetworkMonitor::new());
        network.set_online(false);
        let client = client_over(&backend, &network);
        let mut session = controller();

        let outcome = session
            .dispatch(
                &client,
                &DocumentRef::new("sessions/1"),
                fields(&[("n", json!(1))]),
                &WriteOptions {
                    conflict_resolution: None,
                    offline_support: true,
                },
            )
            .await
            .unwrap();

        assert!(matches!(outcome, DispatchOutcome::Queued));
        assert_eq!(client.queued_writes(), 1);
        assert_eq!(session.metrics().total_requests, 1);
        assert_eq!(session.metrics().failure_rate, 0.0);
        assert_eq!(
            session.error(),
            Some("Saved locally; will sync when the connection returns")
        );
    }

    #[tokio::test]
    async fn test_dispatch_terminal_failure_sets_error_and_metrics() {
        let backend = Arc::new(MemoryBackend::new());
        let network = Arc::new(NetworkMonitor::new());
        let client = client_over(&backend, &network);
        let mut session = controller();
        backend.inject_failures([SyncError::Permission("rules".into())]);

        let err = session
            .dispatch(
                &client,
                &DocumentRef::new("sessions/1"),
                Fields::new(),
                &WriteOptions::default(),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "permission");
        assert_eq!(session.metrics().total_requests, 1);
        assert_eq!(session.metrics().failure_rate, 1.0);
        assert!(session.error().is_some());
        assert_eq!(session.phase(), RequestPhase::Idle);
    }
}
