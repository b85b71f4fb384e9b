//! Postgres store backed by the shared SQLx pool.
//!
//! `seq` columns give insertion order; message ids are the hub-assigned
//! UUIDs so a retried append is rejected by the unique constraint instead
//! of duplicating history.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{ChatMessage, Group, HistoryFilter, MessageRoute, Store, StoreError};

type MessageRow = (Uuid, String, Option<String>, String, Option<String>, String, i64);

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_message((id, kind, group_id, author, recipient, text, created_at): MessageRow) -> Option<ChatMessage> {
    let route = match kind.as_str() {
        "group" => MessageRoute::Group { group_id: group_id?, author },
        "pm" => MessageRoute::Pm { from: author, to: recipient? },
        _ => return None,
    };
    Some(ChatMessage { id, route, text, created_at })
}

#[async_trait]
impl Store for PgStore {
    async fn append(&self, message: &ChatMessage) -> Result<Uuid, StoreError> {
        let (kind, group_id, author, recipient) = match &message.route {
            MessageRoute::Group { group_id, author } => ("group", Some(group_id.as_str()), author.as_str(), None),
            MessageRoute::Pm { from, to } => ("pm", None, from.as_str(), Some(to.as_str())),
        };
        sqlx::query(
            "INSERT INTO messages (id, kind, group_id, author, recipient, text, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(kind)
        .bind(group_id)
        .bind(author)
        .bind(recipient)
        .bind(&message.text)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(message.id)
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<ChatMessage>, StoreError> {
        const COLUMNS: &str = "SELECT id, kind, group_id, author, recipient, text, created_at FROM messages";
        let rows: Vec<MessageRow> = match filter {
            HistoryFilter::Group(None) => {
                sqlx::query_as(&format!("{COLUMNS} WHERE kind = 'group' ORDER BY seq"))
                    .fetch_all(&self.pool)
                    .await?
            }
            HistoryFilter::Group(Some(group_id)) => {
                sqlx::query_as(&format!("{COLUMNS} WHERE kind = 'group' AND group_id = $1 ORDER BY seq"))
                    .bind(group_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            HistoryFilter::Pair(me, other) => {
                sqlx::query_as(&format!(
                    "{COLUMNS} WHERE kind = 'pm'
                       AND ((author = $1 AND recipient = $2) OR (author = $2 AND recipient = $1))
                     ORDER BY seq"
                ))
                .bind(me)
                .bind(other)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows.into_iter().filter_map(row_to_message).collect())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, bool)>("SELECT id, name, read_only FROM groups ORDER BY seq")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, name, read_only)| Group { id, name, read_only })
            .collect())
    }

    async fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO groups (id, name, read_only) VALUES ($1, $2, $3) ON CONFLICT (id) DO NOTHING")
            .bind(&group.id)
            .bind(&group.name)
            .bind(group.read_only)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(all(test, feature = "live-db-tests"))]
#[path = "postgres_test.rs"]
mod tests;
