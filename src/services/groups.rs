//! Group directory — which groups exist and which are read-only.
//!
//! DESIGN
//! ======
//! The directory is hydrated from the store once at startup and then kept
//! in memory; the chat router consults it on every group message without
//! touching the store. The built-in `news` group always exists, always
//! sorts first, and only accepts posts from the system actor.

use tracing::{info, warn};

use crate::frame::{Data, Frame};
use crate::services::delivery;
use crate::state::AppState;
use crate::store::{Group, Store, StoreError};

pub const NEWS_GROUP_ID: &str = "news";
pub const NEWS_GROUP_NAME: &str = "новости";
pub const MIN_GROUP_NAME_LEN: usize = 2;
pub const MAX_GROUP_NAME_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("group name must be {MIN_GROUP_NAME_LEN} to {MAX_GROUP_NAME_LEN} characters")]
    InvalidName,
}

impl crate::frame::ErrorCode for GroupError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidName => "E_INVALID_GROUP_NAME",
        }
    }
}

// =============================================================================
// DIRECTORY
// =============================================================================

#[derive(Debug, Clone)]
pub struct GroupDirectory {
    groups: Vec<Group>,
}

impl GroupDirectory {
    /// Build from stored groups, inserting or normalizing the news group.
    #[must_use]
    pub fn new(stored: Vec<Group>) -> Self {
        let mut groups: Vec<Group> = stored.into_iter().filter(|g| g.id != NEWS_GROUP_ID).collect();
        groups.insert(0, news_group());
        Self { groups }
    }

    #[must_use]
    pub fn exists(&self, group_id: &str) -> bool {
        self.get(group_id).is_some()
    }

    #[must_use]
    pub fn is_read_only(&self, group_id: &str) -> bool {
        self.get(group_id).is_some_and(|g| g.read_only)
    }

    #[must_use]
    pub fn get(&self, group_id: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.id == group_id)
    }

    #[must_use]
    pub fn list(&self) -> &[Group] {
        &self.groups
    }

    fn insert(&mut self, group: Group) {
        if !self.exists(&group.id) {
            self.groups.push(group);
        }
    }
}

fn news_group() -> Group {
    Group { id: NEWS_GROUP_ID.into(), name: NEWS_GROUP_NAME.into(), read_only: true }
}

/// Load the directory from the store.
///
/// # Errors
///
/// Returns a store error if the group list cannot be read.
pub async fn hydrate(store: &dyn Store) -> Result<GroupDirectory, StoreError> {
    let stored = store.list_groups().await?;
    info!(count = stored.len(), "hydrated group directory");
    Ok(GroupDirectory::new(stored))
}

// =============================================================================
// OPERATIONS
// =============================================================================

/// Create a group from a user-supplied name and push `groups:update`.
///
/// The store write is best-effort: a failure is logged and the group still
/// exists for the lifetime of this process.
///
/// # Errors
///
/// Returns [`GroupError::InvalidName`] if the trimmed name length is out of range.
pub async fn create_group(state: &AppState, raw_name: &str) -> Result<Group, GroupError> {
    let name = raw_name.trim();
    let len = name.chars().count();
    if !(MIN_GROUP_NAME_LEN..=MAX_GROUP_NAME_LEN).contains(&len) {
        return Err(GroupError::InvalidName);
    }

    let group = Group { id: group_id_for(name, crate::frame::now_ms()), name: name.to_owned(), read_only: false };
    if let Err(e) = state.store.insert_group(&group).await {
        warn!(error = %e, group_id = %group.id, "group persist failed");
    }

    let mut groups = state.groups.write().await;
    groups.insert(group.clone());
    info!(group_id = %group.id, "group created");
    // Queued under the directory lock, as with roster pushes.
    delivery::broadcast_all(state, &groups_frame(groups.list()), None).await;
    Ok(group)
}

pub async fn list(state: &AppState) -> Vec<Group> {
    state.groups.read().await.list().to_vec()
}

/// `groups:update` push carrying the full group list.
#[must_use]
pub fn groups_frame(groups: &[Group]) -> Frame {
    let mut data = Data::new();
    data.insert("groups".into(), serde_json::json!(groups));
    Frame::request("groups:update", data)
}

// =============================================================================
// IDS
// =============================================================================

/// URL-safe slug: lowercase, runs of other characters collapse to one `-`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() || c == '_' {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_matches('-');
    if slug.is_empty() { "group".to_string() } else { slug.to_string() }
}

/// Group id: slug plus a base-36 creation timestamp.
#[must_use]
pub fn group_id_for(name: &str, now_ms: i64) -> String {
    format!("{}-{}", slugify(name), to_base36(now_ms.unsigned_abs()))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".into();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
#[path = "groups_test.rs"]
mod tests;
