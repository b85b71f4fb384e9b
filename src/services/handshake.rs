//! PM call handshake — invite, accept, reject.
//!
//! DESIGN
//! ======
//! The caller joins the pair session first and then invites the callee.
//! An invite rings every connection of the callee and stays pending until
//! one of them joins the session (accept), rejects, a newer invite for the
//! same call id supersedes it, or either party goes fully offline. No
//! ringing timeout is enforced here.
//!
//! Resolving an invite removes it, so a second reject from another device
//! of the callee (or an automatic busy reject) finds nothing and the caller
//! sees exactly one `call:rejected`.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::frame::{Data, Frame};
use crate::services::delivery;
use crate::state::AppState;
use crate::target::{ChatTarget, is_pair_party};

/// Lifecycle label for handshake log lines. Only ringing invites are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteState {
    Ringing,
    Accepted,
    Rejected,
    Superseded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInvite {
    pub call_id: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("recipient required")]
    EmptyTarget,
    #[error("call id {0} does not name this pair")]
    InvalidCallId(String),
}

impl crate::frame::ErrorCode for HandshakeError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::EmptyTarget => "E_EMPTY_TARGET",
            Self::InvalidCallId(_) => "E_INVALID_TARGET",
        }
    }
}

// =============================================================================
// PENDING INVITES
// =============================================================================

#[derive(Debug, Default)]
pub struct Invites {
    pending: HashMap<String, PendingInvite>,
}

impl Invites {
    /// Record a ringing invite. Returns the invite it superseded, if any.
    pub fn ring(&mut self, invite: PendingInvite) -> Option<PendingInvite> {
        self.pending.insert(invite.call_id.clone(), invite)
    }

    /// Resolve the invite for `call_id` on behalf of the callee `by`.
    ///
    /// Returns the invite if it was ringing for `by`; anything else leaves
    /// the table untouched.
    pub fn resolve(&mut self, call_id: &str, by: &str) -> Option<PendingInvite> {
        if self.pending.get(call_id).is_some_and(|i| i.to == by) {
            self.pending.remove(call_id)
        } else {
            None
        }
    }

    /// Drop every invite that `name` sent or received.
    pub fn discard_for(&mut self, name: &str) -> Vec<PendingInvite> {
        let call_ids: Vec<String> = self
            .pending
            .values()
            .filter(|i| i.from == name || i.to == name)
            .map(|i| i.call_id.clone())
            .collect();
        call_ids.iter().filter_map(|id| self.pending.remove(id)).collect()
    }

    #[must_use]
    pub fn get(&self, call_id: &str) -> Option<&PendingInvite> {
        self.pending.get(call_id)
    }
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Ring `to` on every connection. Returns how many connections were rung.
///
/// Nothing is recorded when `to` is offline.
///
/// # Errors
///
/// Fails when `to` is blank or `call_id` is not the pair session of `from`
/// and `to`.
pub async fn start(state: &AppState, from: &str, to: &str, call_id: &str) -> Result<usize, HandshakeError> {
    let to = to.trim();
    if to.is_empty() {
        return Err(HandshakeError::EmptyTarget);
    }
    if ChatTarget::pair(from, to).session_id() != call_id {
        return Err(HandshakeError::InvalidCallId(call_id.to_owned()));
    }

    let targets = state.presence.read().await.connections_of(to);
    if targets.is_empty() {
        debug!(from, to, call_id, "handshake: callee offline");
        return Ok(0);
    }

    let invite = PendingInvite { call_id: call_id.to_owned(), from: from.to_owned(), to: to.to_owned() };
    if let Some(old) = state.invites.lock().await.ring(invite) {
        debug!(call_id, from = %old.from, state = ?InviteState::Superseded, "handshake: invite superseded");
    }

    info!(from, to, call_id, devices = targets.len(), state = ?InviteState::Ringing, "handshake: ringing");
    let mut data = Data::new();
    data.insert("call_id".into(), serde_json::json!(call_id));
    data.insert("from".into(), serde_json::json!(from));
    Ok(delivery::send_to_many(state, &targets, &Frame::request("call:incoming", data)).await)
}

/// Mark the invite for `call_id` accepted because `by` joined its session.
pub async fn accept(state: &AppState, call_id: &str, by: &str) -> bool {
    if !is_pair_party(call_id, by) {
        return false;
    }
    let resolved = state.invites.lock().await.resolve(call_id, by);
    if let Some(invite) = &resolved {
        info!(call_id, from = %invite.from, to = by, state = ?InviteState::Accepted, "handshake: accepted");
    }
    resolved.is_some()
}

/// Reject the invite for `call_id` on behalf of `by` and notify the caller.
///
/// Returns false (and sends nothing) when no invite is ringing for `by`.
pub async fn reject(state: &AppState, call_id: &str, by: &str) -> bool {
    let Some(invite) = state.invites.lock().await.resolve(call_id, by) else {
        debug!(call_id, by, "handshake: reject without pending invite; dropped");
        return false;
    };

    info!(call_id, from = %invite.from, to = by, state = ?InviteState::Rejected, "handshake: rejected");
    let targets = state.presence.read().await.connections_of(&invite.from);
    let mut data = Data::new();
    data.insert("call_id".into(), serde_json::json!(call_id));
    data.insert("from".into(), serde_json::json!(by));
    delivery::send_to_many(state, &targets, &Frame::request("call:rejected", data)).await;
    true
}

/// Forget invites involving `name` once it has no live connection.
pub async fn discard_for(state: &AppState, name: &str) -> usize {
    let dropped = state.invites.lock().await.discard_for(name);
    for invite in &dropped {
        debug!(call_id = %invite.call_id, name, "handshake: invite discarded on disconnect");
    }
    dropped.len()
}

#[cfg(test)]
#[path = "handshake_test.rs"]
mod tests;
