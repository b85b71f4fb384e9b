//! Message and group record store.
//!
//! SYSTEM CONTEXT
//! ==============
//! The hub never reads history back for routing decisions; it only appends.
//! Reads serve the HTTP history endpoints and startup hydration of the group
//! directory. Two backends: Postgres (`DATABASE_URL` set) and in-memory.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// RECORDS
// =============================================================================

/// Where a chat message was addressed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageRoute {
    Group { group_id: String, author: String },
    Pm { from: String, to: String },
}

/// One delivered chat message. Ids are assigned by the hub before delivery
/// so that persistence never sits on the delivery path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    #[serde(flatten)]
    pub route: MessageRoute,
    pub text: String,
    /// Milliseconds since Unix epoch.
    pub created_at: i64,
}

impl ChatMessage {
    #[must_use]
    pub fn group(group_id: impl Into<String>, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageRoute::Group { group_id: group_id.into(), author: author.into() }, text.into())
    }

    #[must_use]
    pub fn pm(from: impl Into<String>, to: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(MessageRoute::Pm { from: from.into(), to: to.into() }, text.into())
    }

    fn new(route: MessageRoute, text: String) -> Self {
        Self { id: Uuid::new_v4(), route, text, created_at: crate::frame::now_ms() }
    }
}

/// A chat group. `read_only` groups accept posts from the system actor only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub read_only: bool,
}

/// History query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryFilter {
    /// Group messages, optionally restricted to one group.
    Group(Option<String>),
    /// Direct messages exchanged between two names, either direction.
    Pair(String, String),
}

impl HistoryFilter {
    #[must_use]
    pub fn matches(&self, message: &ChatMessage) -> bool {
        match (self, &message.route) {
            (Self::Group(None), MessageRoute::Group { .. }) => true,
            (Self::Group(Some(id)), MessageRoute::Group { group_id, .. }) => id == group_id,
            (Self::Pair(me, other), MessageRoute::Pm { from, to }) => {
                (from == me && to == other) || (from == other && to == me)
            }
            _ => false,
        }
    }
}

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("record encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl crate::frame::ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Database(_) => "E_DATABASE",
            Self::Migrate(_) => "E_MIGRATE",
            Self::Encode(_) => "E_ENCODE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Append-only record store for messages plus the group list.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append one message; returns its id.
    async fn append(&self, message: &ChatMessage) -> Result<Uuid, StoreError>;

    /// Messages matching `filter`, in insertion order.
    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<ChatMessage>, StoreError>;

    /// All stored groups, in creation order.
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;

    async fn insert_group(&self, group: &Group) -> Result<(), StoreError>;
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
