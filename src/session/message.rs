//! Conversation messages.
//!
//! Messages are owned exclusively by the session controller's log. Metadata
//! carries the common annotations as typed fields plus an open `extra`
//! bucket for anything else; pruning may empty the unkept part of `extra`
//! but never touches id, role, text, or timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    Error,
}

/// Auxiliary per-message annotations.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MessageMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_in: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_out: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    /// Open bucket for arbitrary per-response annotations.
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,

    /// Keys in `extra` that survive memory pruning.
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub keep: BTreeSet<String>,
}

impl MessageMetadata {
    /// Drop every `extra` entry not marked as must-keep. Returns true if
    /// anything was removed. Typed fields are always retained.
    pub fn prune(&mut self) -> bool {
        let before = self.extra.len();
        let keep = std::mem::take(&mut self.keep);
        self.extra.retain(|key, _| keep.contains(key));
        self.keep = keep;
        self.extra.len() != before
    }
}

/// A single entry in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Unique id, assigned at creation.
    pub id: String,
    pub role: MessageRole,
    /// May be empty while a response is still streaming in.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MessageMetadata,
}

impl Message {
    pub fn new(role: MessageRole, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            metadata: MessageMetadata::default(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Error, text)
    }

    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Age relative to `now`, in milliseconds.
    pub fn age_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.timestamp).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_constructors_assign_unique_ids() {
        let a = Message::user("hi");
        let b = Message::assistant("hello");
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, MessageRole::User);
        assert_eq!(b.role, MessageRole::Assistant);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::error("oops")).unwrap();
        assert!(json.contains("\"role\":\"error\""));
    }

    #[test]
    fn test_prune_keeps_marked_extras() {
        let mut metadata = MessageMetadata {
            tokens_in: Some(12),
            ..Default::default()
        };
        metadata.extra.insert("diagnostics".into(), json!({"trace": "very long"}));
        metadata.extra.insert("vote".into(), json!("keep me"));
        metadata.keep.insert("vote".into());

        assert!(metadata.prune());
        assert!(!metadata.extra.contains_key("diagnostics"));
        assert_eq!(metadata.extra["vote"], json!("keep me"));
        assert_eq!(metadata.tokens_in, Some(12));

        // Second prune has nothing left to remove.
        assert!(!metadata.prune());
    }

    #[test]
    fn test_metadata_roundtrip() {
        let mut metadata = MessageMetadata::default();
        metadata.extra.insert("provider_breakdown".into(), json!({"a": 1}));
        let message = Message::assistant("answer").with_metadata(metadata);

        let json = serde_json::to_string(&message).unwrap();
        let restored: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, message);
    }
}
