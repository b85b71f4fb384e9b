//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! Each registry sits behind its own lock so a rename never waits on a
//! call join and vice versa. Locks guard in-memory maps only and store
//! I/O always happens outside every lock. Roster and group-list pushes are
//! queued while their registry lock is still held, so every connection
//! sees full-list snapshots in change order; queueing uses `try_send` and
//! never waits. Message history is written by one background task fed
//! through `persist_tx`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::frame::Frame;
use crate::services::call::CallSessions;
use crate::services::groups::GroupDirectory;
use crate::services::handshake::Invites;
use crate::services::presence::Presence;
use crate::services::persistence;
use crate::store::{ChatMessage, Store};

/// Opaque per-connection identity, assigned at WebSocket upgrade.
pub type ClientId = Uuid;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    /// Queue to the ordered history writer.
    pub persist_tx: mpsc::Sender<ChatMessage>,
    /// Live connections: `client_id` -> sender for outgoing frames.
    pub clients: Arc<RwLock<HashMap<ClientId, mpsc::Sender<Frame>>>>,
    pub presence: Arc<RwLock<Presence>>,
    pub calls: Arc<RwLock<CallSessions>>,
    pub invites: Arc<Mutex<Invites>>,
    pub groups: Arc<RwLock<GroupDirectory>>,
}

impl AppState {
    /// Build state and spawn the history writer. Call inside a Tokio runtime.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn Store>, groups: GroupDirectory) -> Self {
        let persist_tx = persistence::spawn_message_writer(store.clone(), config.persist_queue_capacity);
        Self {
            config: Arc::new(config),
            store,
            persist_tx,
            clients: Arc::new(RwLock::new(HashMap::new())),
            presence: Arc::new(RwLock::new(Presence::default())),
            calls: Arc::new(RwLock::new(CallSessions::default())),
            invites: Arc::new(Mutex::new(Invites::default())),
            groups: Arc::new(RwLock::new(groups)),
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
#[path = "state_helpers_test.rs"]
pub mod test_helpers;
