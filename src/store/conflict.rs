//! Conflict resolution between a local payload and the server copy.
//!
//! A strategy is consulted when a write finds a prior version of the target
//! document. New strategies (e.g. merge-by-field-timestamp) implement
//! [`ResolveConflict`]; the write call signature never changes.

use super::Fields;

/// Resolves the final payload when a write collides with an existing
/// document.
pub trait ResolveConflict: Send + Sync {
    /// Strategy name used in logs.
    fn name(&self) -> &'static str;

    /// Produce the fields to write, given the local payload and the fields
    /// currently on the server.
    fn resolve(&self, local: &Fields, server: &Fields) -> Fields;
}

/// Local fields take precedence on key collision; server-only fields are
/// preserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientWins;

impl ResolveConflict for ClientWins {
    fn name(&self) -> &'static str {
        "client_wins"
    }

    fn resolve(&self, local: &Fields, server: &Fields) -> Fields {
        let mut resolved = server.clone();
        for (key, value) in local {
            resolved.insert(key.clone(), value.clone());
        }
        resolved
    }
}

/// Server fields take precedence on key collision; local-only fields are
/// still added.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerWins;

impl ResolveConflict for ServerWins {
    fn name(&self) -> &'static str {
        "server_wins"
    }

    fn resolve(&self, local: &Fields, server: &Fields) -> Fields {
        let mut resolved = local.clone();
        for (key, value) in server {
            resolved.insert(key.clone(), value.clone());
        }
        resolved
    }
}
