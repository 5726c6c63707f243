//! Generic publisher/subscriber primitive.
//!
//! Listener fan-out shows up in more than one place (connectivity changes,
//! session events), so the registration/delivery semantics live here once:
//! delivery in registration order, and a panicking subscriber must not
//! prevent delivery to the subscribers registered after it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;

/// Opaque handle returned by [`Publisher::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Fan-out of values of type `T` to registered handlers.
pub struct Publisher<T> {
    subscribers: Mutex<Vec<(SubscriberId, Handler<T>)>>,
    next_id: Mutex<u64>,
}

impl<T> Publisher<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Register a handler. Handlers fire in registration order.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_id.lock();
            let id = SubscriberId(*next);
            *next += 1;
            id
        };
        self.subscribers.lock().push((id, Arc::new(handler)));
        id
    }

    /// Deregister a handler. Returns false if the id was already removed.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subs = self.subscribers.lock();
        let before = subs.len();
        subs.retain(|(sub_id, _)| *sub_id != id);
        subs.len() != before
    }

    /// Deliver `value` to every subscriber in registration order.
    ///
    /// A handler that panics is caught and logged; delivery continues with
    /// the next handler. The lock is released before invoking handlers so a
    /// handler may subscribe/unsubscribe without deadlocking (changes take
    /// effect on the next publish).
    pub fn publish(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();

        for handler in handlers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| handler(value))) {
                let detail = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::warn!("subscriber panicked during publish: {detail}");
            }
        }
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl<T> Default for Publisher<T> {
    fn default() -> Self {
        Self::new()
    }
}
