//! In-memory store, used when no database is configured and in tests.
//!
//! History is bounded: once a list passes its high-water mark it is cut
//! back to the newest `keep` records.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ChatMessage, Group, HistoryFilter, MessageRoute, Store, StoreError};

/// Group history high-water mark and retained tail.
pub const GROUP_HISTORY_LIMIT: (usize, usize) = (3000, 2000);
/// Direct history high-water mark and retained tail.
pub const PM_HISTORY_LIMIT: (usize, usize) = (5000, 3500);

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    group_messages: Vec<ChatMessage>,
    pm_messages: Vec<ChatMessage>,
    groups: Vec<Group>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn push_bounded(list: &mut Vec<ChatMessage>, message: ChatMessage, (limit, keep): (usize, usize)) {
    list.push(message);
    if list.len() > limit {
        let cut = list.len() - keep;
        list.drain(..cut);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn append(&self, message: &ChatMessage) -> Result<Uuid, StoreError> {
        let mut inner = self.inner.write().await;
        match message.route {
            MessageRoute::Group { .. } => push_bounded(&mut inner.group_messages, message.clone(), GROUP_HISTORY_LIMIT),
            MessageRoute::Pm { .. } => push_bounded(&mut inner.pm_messages, message.clone(), PM_HISTORY_LIMIT),
        }
        Ok(message.id)
    }

    async fn query(&self, filter: &HistoryFilter) -> Result<Vec<ChatMessage>, StoreError> {
        let inner = self.inner.read().await;
        let source = match filter {
            HistoryFilter::Group(_) => &inner.group_messages,
            HistoryFilter::Pair(..) => &inner.pm_messages,
        };
        Ok(source.iter().filter(|m| filter.matches(m)).cloned().collect())
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.inner.read().await.groups.clone())
    }

    async fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.groups.iter().any(|g| g.id == group.id) {
            inner.groups.push(group.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
