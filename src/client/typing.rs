//! Typing indicators — who is shown as typing, and when we tell others.
//!
//! The hub forwards `typing:update` to every connection without state, so
//! both halves of the debounce live here. Callers pass `now` in; nothing in
//! this module reads the clock.

use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::json;

use super::chat::ActiveChat;
use crate::frame::{Data, Frame};
use crate::services::groups::NEWS_GROUP_ID;

/// How long a typing signal stays visible without a refresh.
pub const TYPING_DISPLAY: Duration = Duration::from_millis(2500);

/// Quiet period after the last keystroke before the stop signal is due.
pub const TYPING_IDLE: Duration = Duration::from_secs(2);

/// Payload of a `typing:update` push.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TypingSignal {
    pub chat_type: String,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub with: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_typing: bool,
}

impl TypingSignal {
    /// Whether this signal belongs in the chat `me` is looking at.
    #[must_use]
    pub fn is_relevant(&self, me: &str, active: &ActiveChat) -> bool {
        if self.name == me {
            return false;
        }
        match (self.chat_type.as_str(), active) {
            ("group", ActiveChat::Group(id)) => id != NEWS_GROUP_ID && self.group_id.as_deref() == Some(id.as_str()),
            ("pm", ActiveChat::Pm(other)) => self.name == *other && self.with.as_deref() == Some(me),
            _ => false,
        }
    }
}

// =============================================================================
// DISPLAY
// =============================================================================

/// The single "X is typing" line under the active chat.
#[derive(Debug, Default)]
pub struct TypingIndicator {
    shown: Option<(String, Instant)>,
}

impl TypingIndicator {
    /// Apply a relevant signal. A stop clears the line only if it came from
    /// the person currently shown.
    pub fn apply(&mut self, signal: &TypingSignal, now: Instant) {
        if signal.is_typing {
            self.shown = Some((signal.name.clone(), now + TYPING_DISPLAY));
        } else if self.shown.as_ref().is_some_and(|(name, _)| *name == signal.name) {
            self.shown = None;
        }
    }

    /// Name to show at `now`, if any.
    #[must_use]
    pub fn current(&self, now: Instant) -> Option<&str> {
        match &self.shown {
            Some((name, until)) if now < *until => Some(name),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.shown = None;
    }
}

// =============================================================================
// EMIT
// =============================================================================

/// Outbound side: every keystroke announces typing, and one stop signal
/// follows after [`TYPING_IDLE`] of quiet.
#[derive(Debug, Default)]
pub struct TypingEmitter {
    pending: Option<(ActiveChat, Instant)>,
}

impl TypingEmitter {
    pub fn keystroke(&mut self, chat: &ActiveChat, now: Instant) -> Frame {
        // Switching chats mid-burst drops the old stop; the other side's
        // display times out on its own.
        self.pending = Some((chat.clone(), now + TYPING_IDLE));
        typing_frame(chat, true)
    }

    /// The stop signal, once it is due.
    pub fn poll(&mut self, now: Instant) -> Option<Frame> {
        match &self.pending {
            Some((_, due)) if now >= *due => self.flush(),
            _ => None,
        }
    }

    /// Send the stop signal now, e.g. after the message went out.
    pub fn flush(&mut self) -> Option<Frame> {
        self.pending.take().map(|(chat, _)| typing_frame(&chat, false))
    }

    /// When the stop signal becomes due.
    #[must_use]
    pub fn due(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }
}

fn typing_frame(chat: &ActiveChat, is_typing: bool) -> Frame {
    let mut data = Data::new();
    match chat {
        ActiveChat::Group(id) => {
            data.insert("chat_type".into(), json!("group"));
            data.insert("group_id".into(), json!(id));
        }
        ActiveChat::Pm(with) => {
            data.insert("chat_type".into(), json!("pm"));
            data.insert("with".into(), json!(with));
        }
    }
    data.insert("is_typing".into(), json!(is_typing));
    Frame::request("typing:update", data)
}

#[cfg(test)]
#[path = "typing_test.rs"]
mod tests;
