//! Chat targets, call-session ids, and display-name rules.
//!
//! Shared by the server registries and the client state machine so both
//! sides derive the same session id for the same conversation.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Placeholder used when a display name is empty after trimming.
pub const DEFAULT_NAME: &str = "Anon";

/// A conversation: one group, or one normalized pair of display names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatTarget {
    Group { group_id: String },
    DirectPair { a: String, b: String },
}

impl ChatTarget {
    #[must_use]
    pub fn group(group_id: impl Into<String>) -> Self {
        Self::Group { group_id: group_id.into() }
    }

    /// Build a pair target. `(A, B)` and `(B, A)` produce the same value.
    #[must_use]
    pub fn pair(x: impl Into<String>, y: impl Into<String>) -> Self {
        let (x, y) = (x.into(), y.into());
        if x <= y { Self::DirectPair { a: x, b: y } } else { Self::DirectPair { a: y, b: x } }
    }

    /// Deterministic call-session id for this conversation.
    #[must_use]
    pub fn session_id(&self) -> String {
        match self {
            Self::Group { group_id } => format!("group:{group_id}"),
            Self::DirectPair { a, b } => format!("pm:{a}:{b}"),
        }
    }

    /// For a pair target, the member that is not `me`.
    #[must_use]
    pub fn other_party(&self, me: &str) -> Option<&str> {
        match self {
            Self::Group { .. } => None,
            Self::DirectPair { a, b } if a == me => Some(b),
            Self::DirectPair { a, .. } => Some(a),
        }
    }

    #[must_use]
    pub fn is_pair(&self) -> bool {
        matches!(self, Self::DirectPair { .. })
    }
}

/// Whether `name` is one of the two parties of a `pm:` session id.
///
/// The id must split into exactly two names; display names never contain
/// `:` (see [`clamp_name`]), so anything else is not a pair id.
#[must_use]
pub fn is_pair_party(session_id: &str, name: &str) -> bool {
    let Some((a, b)) = session_id.strip_prefix("pm:").and_then(|rest| rest.split_once(':')) else {
        return false;
    };
    !b.contains(':') && (a == name || b == name)
}

/// Trim, replace `:` with `_`, cap at `max_len` characters, and fall back
/// to [`DEFAULT_NAME`]. Keeps `pm:<a>:<b>` ids unambiguous.
#[must_use]
pub fn clamp_name(raw: &str, max_len: usize) -> String {
    let trimmed: String = raw
        .trim()
        .chars()
        .map(|c| if c == ':' { '_' } else { c })
        .take(max_len)
        .collect();
    let trimmed = trimmed.trim_end();
    if trimmed.is_empty() { DEFAULT_NAME.to_string() } else { trimmed.to_string() }
}

/// Cap `raw` at `max_len` characters without trimming.
#[must_use]
pub fn cap_chars(raw: &str, max_len: usize) -> String {
    raw.chars().take(max_len).collect()
}

/// Roster collation: case-folded order first, raw codepoints break ties.
#[must_use]
pub fn collate(a: &str, b: &str) -> Ordering {
    let folded = a
        .chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase));
    folded.then_with(|| a.cmp(b))
}

#[cfg(test)]
#[path = "target_test.rs"]
mod tests;
