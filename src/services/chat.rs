//! Chat router — group messages, direct messages, typing signals.
//!
//! DESIGN
//! ======
//! Group messages go to every connection, not just group members, so
//! clients can keep unread markers for groups they are not viewing. Direct
//! messages go to every connection of the recipient plus the sender's other
//! devices. The originating connection is always excluded: it learns the
//! message (with its hub-assigned id) from the reply to its own request.
//!
//! Persistence is queued to the history writer and never awaited on the
//! delivery path; a store failure is logged and the message is still
//! delivered.

use std::collections::HashSet;

use tracing::{debug, info};

use crate::frame::{Data, Frame};
use crate::services::{delivery, persistence};
use crate::state::{AppState, ClientId};
use crate::store::ChatMessage;
use crate::target::cap_chars;

/// Who is posting. Only the system actor may post to read-only groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    User(String),
    System(String),
}

impl Actor {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::User(name) | Self::System(name) => name,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("unknown group: {0}")]
    InvalidTarget(String),
    #[error("recipient and text required")]
    EmptyTarget,
}

impl crate::frame::ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidTarget(_) => "E_INVALID_TARGET",
            Self::EmptyTarget => "E_EMPTY_TARGET",
        }
    }
}

// =============================================================================
// GROUP
// =============================================================================

/// Deliver a group message to every connection except `origin`.
///
/// Returns `Ok(None)` when the group is read-only and the actor is not the
/// system: the post is dropped without error.
///
/// # Errors
///
/// [`ChatError::InvalidTarget`] for an unknown group, [`ChatError::EmptyTarget`]
/// for blank text.
pub async fn send_group(
    state: &AppState,
    origin: Option<ClientId>,
    group_id: &str,
    actor: &Actor,
    text: &str,
) -> Result<Option<ChatMessage>, ChatError> {
    let (exists, read_only) = {
        let groups = state.groups.read().await;
        (groups.exists(group_id), groups.is_read_only(group_id))
    };
    if !exists {
        return Err(ChatError::InvalidTarget(group_id.to_owned()));
    }
    if read_only && !matches!(actor, Actor::System(_)) {
        debug!(group_id, author = actor.name(), "chat: post to read-only group ignored");
        return Ok(None);
    }

    let limit = match actor {
        Actor::System(_) => state.config.limits.max_news_len,
        Actor::User(_) => state.config.limits.max_text_len,
    };
    let text = cap_chars(text, limit);
    if text.trim().is_empty() {
        return Err(ChatError::EmptyTarget);
    }

    let message = ChatMessage::group(group_id, cap_chars(actor.name(), state.config.limits.max_name_len), text);
    persistence::enqueue_message(state, &message);

    let sent = delivery::broadcast_all(state, &message_frame("chat:group", &message), origin).await;
    info!(group_id, id = %message.id, sent, "chat: group message");
    Ok(Some(message))
}

// =============================================================================
// DIRECT
// =============================================================================

/// Deliver a direct message to `to` and to the sender's other connections.
///
/// Each connection receives it at most once; `origin` never does.
///
/// # Errors
///
/// [`ChatError::EmptyTarget`] when `to` or the text is blank.
pub async fn send_direct(
    state: &AppState,
    origin: Option<ClientId>,
    from: &str,
    to: &str,
    text: &str,
) -> Result<ChatMessage, ChatError> {
    let limits = &state.config.limits;
    let to = cap_chars(to.trim(), limits.max_name_len);
    let text = cap_chars(text, limits.max_text_len);
    if to.is_empty() || text.trim().is_empty() {
        return Err(ChatError::EmptyTarget);
    }

    let message = ChatMessage::pm(cap_chars(from, limits.max_name_len), to.clone(), text);
    persistence::enqueue_message(state, &message);

    let targets: Vec<ClientId> = {
        let presence = state.presence.read().await;
        let mut seen = HashSet::new();
        presence
            .connections_of(&to)
            .into_iter()
            .chain(presence.connections_of(from))
            .filter(|c| Some(*c) != origin && seen.insert(*c))
            .collect()
    };

    let sent = delivery::send_to_many(state, &targets, &message_frame("chat:pm", &message)).await;
    info!(from, to = %to, id = %message.id, sent, "chat: direct message");
    Ok(message)
}

// =============================================================================
// TYPING
// =============================================================================

/// Fan a typing signal out to every connection except `origin`. Not stored.
pub async fn notify_typing(state: &AppState, origin: Option<ClientId>, from: &str, data: &Data) -> usize {
    let mut push = data.clone();
    push.insert("name".into(), serde_json::json!(from));
    delivery::broadcast_all(state, &Frame::request("typing:update", push), origin).await
}

// =============================================================================
// HELPERS
// =============================================================================

fn message_frame(syscall: &str, message: &ChatMessage) -> Frame {
    let mut data = Data::new();
    data.insert("message".into(), serde_json::json!(message));
    Frame::request(syscall, data)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
