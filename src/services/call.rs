//! Call-session registry — who is in which call.
//!
//! DESIGN
//! ======
//! A session is nothing more than an entry in `members`: it appears on the
//! first join and is removed the moment its member list empties, so a later
//! join to the same id starts from scratch. Members are kept in join order
//! so the joiner's peer list is stable.
//!
//! Mesh formation is asymmetric. The joiner receives the existing members
//! and initiates toward each of them; existing members receive
//! `call:peer-joined` and only answer. Both happen after the mutation is
//! applied and outside the lock.

use std::collections::{HashMap, HashSet};

use tracing::info;

use crate::frame::{Data, Frame};
use crate::services::delivery;
use crate::state::{AppState, ClientId};

// =============================================================================
// REGISTRY
// =============================================================================

#[derive(Debug, Default)]
pub struct CallSessions {
    members: HashMap<String, Vec<ClientId>>,
    joined: HashMap<ClientId, HashSet<String>>,
}

/// Result of a join: the members before the joiner, and whether the joiner
/// was newly added (re-joining the same session is a no-op).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinResult {
    pub peers: Vec<ClientId>,
    pub newly_joined: bool,
}

impl CallSessions {
    pub fn join(&mut self, session_id: &str, client: ClientId) -> JoinResult {
        let members = self.members.entry(session_id.to_owned()).or_default();
        let peers: Vec<ClientId> = members.iter().copied().filter(|c| *c != client).collect();
        let newly_joined = !members.contains(&client);
        if newly_joined {
            members.push(client);
            self.joined.entry(client).or_default().insert(session_id.to_owned());
        }
        JoinResult { peers, newly_joined }
    }

    /// Remove `client` from `session_id`. Returns the remaining members, or
    /// `None` if the client was not a member.
    pub fn leave(&mut self, session_id: &str, client: ClientId) -> Option<Vec<ClientId>> {
        let members = self.members.get_mut(session_id)?;
        let pos = members.iter().position(|c| *c == client)?;
        members.remove(pos);
        let remaining = members.clone();
        if remaining.is_empty() {
            self.members.remove(session_id);
        }
        if let Some(sessions) = self.joined.get_mut(&client) {
            sessions.remove(session_id);
            if sessions.is_empty() {
                self.joined.remove(&client);
            }
        }
        Some(remaining)
    }

    /// Sessions `client` currently belongs to, sorted for stable teardown order.
    #[must_use]
    pub fn sessions_of(&self, client: ClientId) -> Vec<String> {
        let mut sessions: Vec<String> = self
            .joined
            .get(&client)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        sessions.sort();
        sessions
    }

    #[must_use]
    pub fn members(&self, session_id: &str) -> Vec<ClientId> {
        self.members.get(session_id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn is_member(&self, session_id: &str, client: ClientId) -> bool {
        self.members.get(session_id).is_some_and(|m| m.contains(&client))
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.members.len()
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Join `session_id` and return the members that were already there.
///
/// Each existing member gets exactly one `call:peer-joined` for `client`.
pub async fn join(state: &AppState, session_id: &str, client: ClientId) -> Vec<ClientId> {
    let result = state.calls.write().await.join(session_id, client);
    if !result.newly_joined {
        return result.peers;
    }

    info!(%client, call_id = %session_id, peers = result.peers.len(), "call: joined");
    let frame = peer_frame("call:peer-joined", session_id, client);
    delivery::send_to_many(state, &result.peers, &frame).await;
    result.peers
}

/// Leave `session_id`. A no-op if `client` never joined it.
pub async fn leave(state: &AppState, session_id: &str, client: ClientId) -> bool {
    let remaining = state.calls.write().await.leave(session_id, client);
    let Some(remaining) = remaining else {
        return false;
    };

    info!(%client, call_id = %session_id, remaining = remaining.len(), "call: left");
    let frame = peer_frame("call:peer-left", session_id, client);
    delivery::send_to_many(state, &remaining, &frame).await;
    true
}

/// Leave every session `client` belongs to, one `leave` per session.
pub async fn leave_all(state: &AppState, client: ClientId) -> usize {
    let sessions = state.calls.read().await.sessions_of(client);
    let mut left = 0;
    for session_id in sessions {
        if leave(state, &session_id, client).await {
            left += 1;
        }
    }
    left
}

fn peer_frame(syscall: &str, session_id: &str, client: ClientId) -> Frame {
    let mut data = Data::new();
    data.insert("call_id".into(), serde_json::json!(session_id));
    data.insert("client_id".into(), serde_json::json!(client));
    Frame::request(syscall, data)
}

#[cfg(test)]
#[path = "call_test.rs"]
mod tests;
