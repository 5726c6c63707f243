//! Client-side resilience core for a chat/session client.
//!
//! Three pieces form one contract:
//!
//! - [`network::NetworkMonitor`], the single source of truth for the
//!   online/offline flag, with deduplicated transitions and ordered
//!   listener fan-out.
//! - [`store::ResilientDocumentClient`], which reads/writes/updates against a
//!   remote document store, wrapped in retry-with-backoff, conflict
//!   resolution, and an offline queue replayed on reconnect.
//! - [`session::SessionController`], the canonical conversation state:
//!   message log, rate limiting, performance metrics, and bounded memory.
//!
//! Wire-up at application start:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether::config::TetherConfig;
//! use tether::network::NetworkMonitor;
//! use tether::session::SessionController;
//! use tether::store::{MemoryBackend, ResilientDocumentClient};
//!
//! let config = TetherConfig::default();
//! let network = Arc::new(NetworkMonitor::new());
//! let backend = Arc::new(MemoryBackend::new());
//! let client = Arc::new(ResilientDocumentClient::new(backend, Arc::clone(&network), &config));
//! client.watch_network();
//! let session = SessionController::new(&config);
//! # let _ = session;
//! ```

pub mod config;
pub mod error;
pub mod network;
pub mod observer;
pub mod session;
pub mod store;

pub use config::TetherConfig;
pub use error::{ErrorSeverity, SyncError};
pub use network::NetworkMonitor;
pub use observer::{Publisher, SubscriberId};
pub use session::{Message, MessageRole, SessionController, SessionSnapshot};
pub use store::{Document, DocumentBackend, DocumentRef, Fields, ResilientDocumentClient};
