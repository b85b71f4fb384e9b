//! Presence service — who is online, by display name.
//!
//! DESIGN
//! ======
//! One name may own many connections (multi-device), so presence is a
//! set-valued map. A name is online iff its set is non-empty; empty sets
//! are removed on the spot so `list()` never reports a ghost. Every change
//! to the visible name set pushes the full roster to every connection; the
//! push is queued under the presence write lock so the last roster a
//! client receives is always the current one.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::frame::{Data, Frame};
use crate::services::delivery;
use crate::state::{AppState, ClientId};
use crate::target::{clamp_name, collate};

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug, Default)]
pub struct Presence {
    by_name: HashMap<String, HashSet<ClientId>>,
    names: HashMap<ClientId, String>,
}

impl Presence {
    /// Move `client` under `name`. Returns true if the visible name set changed.
    pub fn set_name(&mut self, client: ClientId, name: String) -> bool {
        if self.names.get(&client) == Some(&name) {
            return false;
        }
        let dropped = self.remove(client).is_some_and(|(_, went_offline)| went_offline);
        let entry = self.by_name.entry(name.clone()).or_default();
        let came_online = entry.is_empty();
        entry.insert(client);
        self.names.insert(client, name);
        dropped || came_online
    }

    /// Forget `client`. Returns its former name and whether that name went offline.
    pub fn remove(&mut self, client: ClientId) -> Option<(String, bool)> {
        let name = self.names.remove(&client)?;
        let went_offline = match self.by_name.get_mut(&name) {
            Some(set) => {
                set.remove(&client);
                set.is_empty()
            }
            None => false,
        };
        if went_offline {
            self.by_name.remove(&name);
        }
        Some((name, went_offline))
    }

    /// Online names in roster order.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort_by(|a, b| collate(a, b));
        names
    }

    #[must_use]
    pub fn name_of(&self, client: ClientId) -> Option<&str> {
        self.names.get(&client).map(String::as_str)
    }

    /// Every connection registered under `name`.
    #[must_use]
    pub fn connections_of(&self, name: &str) -> Vec<ClientId> {
        self.by_name
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn is_online(&self, name: &str) -> bool {
        self.by_name.get(name).is_some_and(|set| !set.is_empty())
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Register `client` under a cleaned-up `raw` name and return the stored name.
///
/// Broadcasts the roster when the online set changed; otherwise only the
/// caller receives it, so a fresh device still learns who is online.
pub async fn set_name(state: &AppState, client: ClientId, raw: &str) -> String {
    let name = clamp_name(raw, state.config.limits.max_name_len);
    let mut presence = state.presence.write().await;
    let changed = presence.set_name(client, name.clone());
    info!(%client, name = %name, changed, "presence: set name");

    // Queued before the lock drops: concurrent changes land in change order.
    let frame = roster_frame(&presence.list());
    if changed {
        delivery::broadcast_all(state, &frame, None).await;
    } else {
        delivery::send_to(state, client, &frame).await;
    }
    name
}

/// Remove `client` from presence. Returns the name that went fully offline, if any.
pub async fn remove(state: &AppState, client: ClientId) -> Option<String> {
    let mut presence = state.presence.write().await;
    let (name, went_offline) = presence.remove(client)?;
    info!(%client, name = %name, went_offline, "presence: removed connection");
    if !went_offline {
        return None;
    }
    delivery::broadcast_all(state, &roster_frame(&presence.list()), None).await;
    Some(name)
}

/// Current roster.
pub async fn list(state: &AppState) -> Vec<String> {
    state.presence.read().await.list()
}

/// Display name registered for `client`, if any.
pub async fn name_of(state: &AppState, client: ClientId) -> Option<String> {
    state.presence.read().await.name_of(client).map(str::to_owned)
}

/// `users:update` push carrying the full roster.
#[must_use]
pub fn roster_frame(roster: &[String]) -> Frame {
    let mut data = Data::new();
    data.insert("users".into(), serde_json::json!(roster));
    Frame::request("users:update", data)
}

#[cfg(test)]
#[path = "presence_test.rs"]
mod tests;
