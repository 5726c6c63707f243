//! In-memory [`DocumentBackend`] for tests and embedded use.
//!
//! A `HashMap` behind `parking_lot::RwLock`, plus failure scripting: queued
//! errors are returned (and consumed) by the next backend calls, which lets
//! retry and offline paths be exercised without a transport.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::error::{Result, SyncError};

use super::{Document, DocumentBackend, DocumentRef};

/// In-memory document store with scriptable failures.
#[derive(Default)]
pub struct MemoryBackend {
    docs: RwLock<HashMap<String, Document>>,
    scripted_failures: Mutex<VecDeque<SyncError>>,
    get_calls: AtomicU32,
    put_calls: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue errors to be returned by upcoming backend calls, oldest first.
    /// Both `get` and `put` consume from the same script.
    pub fn inject_failures(&self, errors: impl IntoIterator<Item = SyncError>) {
        self.scripted_failures.lock().extend(errors);
    }

    /// Queue `n` transient network failures.
    pub fn inject_network_failures(&self, n: usize) {
        self.inject_failures((0..n).map(|i| SyncError::Network(format!("injected failure {i}"))));
    }

    /// Number of `get` calls observed.
    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `put` calls observed.
    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Documents currently stored.
    pub fn len(&self) -> usize {
        self.docs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.read().is_empty()
    }

    /// Direct snapshot of a stored document, bypassing failure scripting.
    pub fn peek(&self, doc: &DocumentRef) -> Option<Document> {
        self.docs.read().get(doc.path()).cloned()
    }

    /// Seed a document directly, bypassing version stamping.
    pub fn seed(&self, doc: &DocumentRef, document: Document) {
        self.docs.write().insert(doc.path().to_string(), document);
    }

    fn next_scripted_failure(&self) -> Option<SyncError> {
        self.scripted_failures.lock().pop_front()
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn get(&self, doc: &DocumentRef) -> Result<Option<Document>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_scripted_failure() {
            return Err(err);
        }
        Ok(self.docs.read().get(doc.path()).cloned())
    }

    async fn put(&self, doc: &DocumentRef, document: Document) -> Result<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.next_scripted_failure() {
            return Err(err);
        }
        self.docs.write().insert(doc.path().to_string(), document);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Fields;
    use serde_json::json;

    fn doc_with(key: &str, value: serde_json::Value) -> Document {
        let mut fields = Fields::new();
        fields.insert(key.to_string(), value);
        Document::stamp(fields, None)
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let backend = MemoryBackend::new();
        let doc = DocumentRef::new("sessions/1");

        backend.put(&doc, doc_with("title", json!("hi"))).await.unwrap();
        let found = backend.get(&doc).await.unwrap().unwrap();
        assert_eq!(found.fields["title"], json!("hi"));
        assert_eq!(backend.get_calls(), 1);
        assert_eq!(backend.put_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_document_is_none() {
        let backend = MemoryBackend::new();
        let found = backend.get(&DocumentRef::new("absent")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let backend = MemoryBackend::new();
        backend.inject_failures([
            SyncError::Network("first".into()),
            SyncError::Permission("second".into()),
        ]);

        let doc = DocumentRef::new("d");
        let err = backend.get(&doc).await.unwrap_err();
        assert_eq!(err.kind(), "network");
        let err = backend.get(&doc).await.unwrap_err();
        assert_eq!(err.kind(), "permission");
        assert!(backend.get(&doc).await.unwrap().is_none());
    }
}
