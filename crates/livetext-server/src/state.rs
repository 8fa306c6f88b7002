//! Shared application state for the HTTP server.
//!
//! [`AppState`] holds the broadcast registry that fans text changes out
//! to SSE viewers and the store that persists the text across restarts.

use livetext_broadcast::{BroadcastConfig, Registry};
use tokio::sync::{Mutex, MutexGuard};

use crate::sse::SseChannel;
use crate::store::TextStore;

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`](std::sync::Arc) and injected via Axum's `State`
/// extractor. The registry is the only owner of the live set and the
/// in-memory text.
#[derive(Debug)]
pub struct AppState {
    /// Fan-out registry for SSE viewers.
    pub registry: Registry<SseChannel>,
    /// Durable copy of the text.
    pub store: TextStore,
    /// Held across save and publish so the file and the registry take
    /// updates in the same order.
    updates: Mutex<()>,
}

impl AppState {
    /// Create state with a registry seeded by `initial_text`.
    pub fn new(config: BroadcastConfig, store: TextStore, initial_text: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(config, initial_text),
            store,
            updates: Mutex::new(()),
        }
    }

    /// Wait for exclusive access to the update path.
    pub async fn lock_updates(&self) -> MutexGuard<'_, ()> {
        self.updates.lock().await
    }

    /// Create state seeded with whatever the store currently holds.
    pub async fn load(config: BroadcastConfig, store: TextStore) -> Self {
        let initial_text = store.load().await;
        Self::new(config, store, initial_text)
    }
}
