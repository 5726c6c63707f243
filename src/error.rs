//! Error taxonomy for the sync and session layers.
//!
//! Every failure that crosses a module boundary is a [`SyncError`]. The
//! variants map onto how callers should react: retry, resolve, surface, or
//! treat as deferred success ([`SyncError::QueuedOffline`]).

use serde::Serialize;
use thiserror::Error;

/// Severity hint for presenting an error to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    /// Transient notice, safe to auto-dismiss.
    Transient,
    /// Data is safe locally; sync is unavailable.
    Low,
    /// Requires user attention.
    High,
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// Transient transport failure. Retryable.
    #[error("network error: {0}")]
    Network(String),

    /// A concurrent write changed the document since it was last read.
    /// Not retryable without a conflict-resolution strategy.
    #[error("write conflict on {path}: {detail}")]
    Conflict { path: String, detail: String },

    /// The backend rejected the caller's credentials or access level.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The caller supplied an invalid payload or reference.
    #[error("validation error: {0}")]
    Validation(String),

    /// The mutation was accepted into the offline queue instead of being
    /// written. A deferred success, not a failure.
    #[error("queued for offline replay: {0}")]
    QueuedOffline(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl SyncError {
    /// Whether a retry loop should attempt this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Unknown(_))
    }

    /// Whether this represents a mutation parked for later replay rather
    /// than a real failure.
    pub fn is_queued(&self) -> bool {
        matches!(self, SyncError::QueuedOffline(_))
    }

    /// How the presentation layer should weight this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SyncError::Network(_) | SyncError::Unknown(_) => ErrorSeverity::Transient,
            // Permission failures mean "sync unavailable, data safe locally",
            // same presentation weight as a queued write.
            SyncError::Permission(_) | SyncError::QueuedOffline(_) => ErrorSeverity::Low,
            SyncError::Conflict { .. } | SyncError::Validation(_) => ErrorSeverity::High,
        }
    }

    /// Stable machine-readable kind, used in logs and published state.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "network",
            SyncError::Conflict { .. } => "conflict",
            SyncError::Permission(_) => "permission",
            SyncError::Validation(_) => "validation",
            SyncError::QueuedOffline(_) => "queued_offline",
            SyncError::Unknown(_) => "unknown",
        }
    }
}

/// Result type alias using [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        assert!(SyncError::Network("timeout".into()).is_retryable());
        assert!(SyncError::Unknown("???".into()).is_retryable());
        assert!(!SyncError::Permission("denied".into()).is_retryable());
        assert!(!SyncError::Validation("bad ref".into()).is_retryable());
        assert!(!SyncError::Conflict {
            path: "sessions/1".into(),
            detail: "version moved".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_queued_is_not_a_failure_kind() {
        let err = SyncError::QueuedOffline("sessions/1".into());
        assert!(err.is_queued());
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_kind_strings() {
        assert_eq!(SyncError::Network("x".into()).kind(), "network");
        assert_eq!(
            SyncError::Conflict {
                path: "p".into(),
                detail: "d".into()
            }
            .kind(),
            "conflict"
        );
        assert_eq!(SyncError::QueuedOffline("p".into()).kind(), "queued_offline");
    }
}
