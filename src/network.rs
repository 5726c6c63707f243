//! Connectivity tracking.
//!
//! [`NetworkMonitor`] is the single source of truth for the online/offline
//! flag. Platform connectivity events feed [`NetworkMonitor::set_online`];
//! everything else only reads the flag or subscribes to transitions. In-flight
//! request outcomes never mutate it.

use parking_lot::Mutex;

use crate::observer::{Publisher, SubscriberId};

/// Process-wide online/offline state with change notification.
pub struct NetworkMonitor {
    online: Mutex<bool>,
    transitions: Publisher<bool>,
}

impl NetworkMonitor {
    /// Create a monitor that assumes connectivity until told otherwise.
    pub fn new() -> Self {
        Self::with_initial_state(true)
    }

    pub fn with_initial_state(online: bool) -> Self {
        Self {
            online: Mutex::new(online),
            transitions: Publisher::new(),
        }
    }

    /// Last-observed connectivity flag. No I/O.
    pub fn is_online(&self) -> bool {
        *self.online.lock()
    }

    /// Record a connectivity signal.
    ///
    /// Transitions are deduplicated: re-observing the current state fires no
    /// listeners. On a real flip, subscribers are notified in registration
    /// order with the new flag.
    pub fn set_online(&self, online: bool) {
        {
            let mut current = self.online.lock();
            if *current == online {
                return;
            }
            *current = online;
        }
        tracing::debug!(online, "connectivity changed");
        self.transitions.publish(&online);
    }

    /// Register a transition listener. Fired with the new flag on each flip.
    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.transitions.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.transitions.unsubscribe(id)
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}
