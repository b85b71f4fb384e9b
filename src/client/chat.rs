//! Client chat view — active chat, unread markers, roster and group caches.
//!
//! Group messages arrive for every group, not only the one on screen, so
//! the view decides per message whether to display it or mark its chat
//! unread. Direct messages are keyed by the other party's name.

use std::collections::HashSet;
use std::time::Instant;

use serde_json::json;
use tracing::debug;

use super::typing::{TypingEmitter, TypingIndicator, TypingSignal};
use crate::frame::{Data, Frame, Status};
use crate::services::groups::NEWS_GROUP_ID;
use crate::store::{ChatMessage, Group, MessageRoute};
use crate::target::ChatTarget;

/// The chat on screen: a group id, or the other party of a pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActiveChat {
    Group(String),
    Pm(String),
}

impl ActiveChat {
    /// Unread-set key: `group:<id>` or `pm:<name>`.
    #[must_use]
    pub fn key(&self) -> String {
        match self {
            Self::Group(id) => format!("group:{id}"),
            Self::Pm(name) => format!("pm:{name}"),
        }
    }

    #[must_use]
    pub fn target(&self, me: &str) -> ChatTarget {
        match self {
            Self::Group(id) => ChatTarget::group(id.as_str()),
            Self::Pm(name) => ChatTarget::pair(me, name.as_str()),
        }
    }
}

/// What a delivered message did to the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageEffect {
    Displayed,
    MarkedUnread,
    Ignored,
}

#[derive(Debug, Default)]
pub struct ChatView {
    me: Option<String>,
    active: Option<ActiveChat>,
    messages: Vec<ChatMessage>,
    unread: HashSet<String>,
    users: Vec<String>,
    groups: Vec<Group>,
    typing: TypingIndicator,
    emitter: TypingEmitter,
}

impl ChatView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_identity(&mut self, name: impl Into<String>) {
        self.me = Some(name.into());
    }

    #[must_use]
    pub fn active(&self) -> Option<&ActiveChat> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    #[must_use]
    pub fn users(&self) -> &[String] {
        &self.users
    }

    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    #[must_use]
    pub fn is_unread(&self, chat: &ActiveChat) -> bool {
        self.unread.contains(&chat.key())
    }

    #[must_use]
    pub fn unread_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.unread.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Switch to `chat`: clears its unread marker, the message list, and
    /// the typing line. Returns a pending typing stop for the chat left.
    pub fn open(&mut self, chat: ActiveChat) -> Option<Frame> {
        self.unread.remove(&chat.key());
        self.messages.clear();
        self.typing.clear();
        let stop = self.emitter.flush();
        self.active = Some(chat);
        stop
    }

    /// Replace the message list with fetched history.
    pub fn load_history(&mut self, history: Vec<ChatMessage>) {
        self.messages = history;
    }

    /// Whether the composer is enabled. `news` is read-only for users.
    #[must_use]
    pub fn can_post(&self) -> bool {
        match &self.active {
            Some(ActiveChat::Group(id)) => id != NEWS_GROUP_ID,
            Some(ActiveChat::Pm(_)) => self.me.is_some(),
            None => false,
        }
    }

    /// Build the request for sending `text` to the active chat, followed by
    /// the typing stop when one is pending. Empty when nothing can be sent.
    pub fn compose(&mut self, text: &str) -> Vec<Frame> {
        if !self.can_post() || text.trim().is_empty() {
            return Vec::new();
        }
        let mut data = Data::new();
        data.insert("text".into(), json!(text));
        let Some(active) = self.active.as_ref() else {
            return Vec::new();
        };
        let syscall = match active {
            ActiveChat::Group(id) => {
                data.insert("group_id".into(), json!(id));
                "chat:group"
            }
            ActiveChat::Pm(to) => {
                data.insert("to".into(), json!(to));
                "chat:pm"
            }
        };
        let mut out = vec![Frame::request(syscall, data)];
        out.extend(self.emitter.flush());
        out
    }

    /// Route a delivered message: display it, mark its chat unread, or drop it.
    pub fn on_message(&mut self, message: &ChatMessage) -> MessageEffect {
        let me = self.me.as_deref().unwrap_or_default();
        let (chat, mine) = match &message.route {
            MessageRoute::Group { group_id, author } => (ActiveChat::Group(group_id.clone()), author == me),
            MessageRoute::Pm { from, to } => {
                if from == me {
                    (ActiveChat::Pm(to.clone()), true)
                } else if to == me {
                    (ActiveChat::Pm(from.clone()), false)
                } else {
                    return MessageEffect::Ignored;
                }
            }
        };

        if self.active.as_ref() == Some(&chat) {
            if self.messages.iter().any(|m| m.id == message.id) {
                return MessageEffect::Ignored;
            }
            self.messages.push(message.clone());
            MessageEffect::Displayed
        } else if mine {
            MessageEffect::Ignored
        } else {
            self.unread.insert(chat.key());
            MessageEffect::MarkedUnread
        }
    }

    pub fn on_users(&mut self, users: Vec<String>) {
        self.users = users;
    }

    pub fn on_groups(&mut self, groups: Vec<Group>) {
        self.groups = groups;
    }

    /// Apply a typing push if it concerns the active chat.
    pub fn on_typing(&mut self, signal: &TypingSignal, now: Instant) -> bool {
        let (Some(me), Some(active)) = (self.me.as_deref(), self.active.as_ref()) else {
            return false;
        };
        if !signal.is_relevant(me, active) {
            return false;
        }
        self.typing.apply(signal, now);
        true
    }

    #[must_use]
    pub fn typing_label(&self, now: Instant) -> Option<&str> {
        self.typing.current(now)
    }

    /// Local keystroke in the composer.
    pub fn keystroke(&mut self, now: Instant) -> Option<Frame> {
        if !self.can_post() {
            return None;
        }
        let active = self.active.as_ref()?;
        Some(self.emitter.keystroke(active, now))
    }

    /// The typing stop signal, once due.
    pub fn poll_typing(&mut self, now: Instant) -> Option<Frame> {
        self.emitter.poll(now)
    }

    /// Route one hub frame. Replies to our own `chat:*` requests carry the
    /// stored message and are displayed like pushes.
    pub fn handle_frame(&mut self, frame: &Frame, now: Instant) {
        match (frame.syscall.as_str(), frame.status) {
            ("chat:group" | "chat:pm", Status::Request | Status::Done) => {
                if let Some(message) = decode::<ChatMessage>(frame, "message") {
                    self.on_message(&message);
                }
            }
            ("users:update", Status::Request) => {
                if let Some(users) = decode(frame, "users") {
                    self.on_users(users);
                }
            }
            ("groups:update", Status::Request) => {
                if let Some(groups) = decode(frame, "groups") {
                    self.on_groups(groups);
                }
            }
            ("typing:update", Status::Request) => {
                match serde_json::from_value::<TypingSignal>(json!(frame.data)) {
                    Ok(signal) => {
                        self.on_typing(&signal, now);
                    }
                    Err(e) => debug!(error = %e, "chat: malformed typing push"),
                }
            }
            _ => {}
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(frame: &Frame, key: &str) -> Option<T> {
    let value = frame.data.get(key)?.clone();
    serde_json::from_value(value)
        .map_err(|e| debug!(syscall = %frame.syscall, key, error = %e, "chat: malformed push"))
        .ok()
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
