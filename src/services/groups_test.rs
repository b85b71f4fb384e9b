use super::*;
use crate::state::test_helpers::{connect, drain_syscall, recv_frame, test_app_state};

fn group(id: &str) -> Group {
    Group { id: id.into(), name: id.to_uppercase(), read_only: false }
}

#[test]
fn directory_puts_news_first_and_read_only() {
    let dir = GroupDirectory::new(vec![group("general"), group("dev")]);
    let ids: Vec<&str> = dir.list().iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, vec![NEWS_GROUP_ID, "general", "dev"]);
    assert!(dir.is_read_only(NEWS_GROUP_ID));
    assert!(!dir.is_read_only("general"));
}

#[test]
fn directory_normalizes_stored_news_row() {
    let stored = vec![group("general"), Group { id: NEWS_GROUP_ID.into(), name: "old".into(), read_only: false }];
    let dir = GroupDirectory::new(stored);
    assert_eq!(dir.list().len(), 2);
    assert_eq!(dir.list()[0].name, NEWS_GROUP_NAME);
    assert!(dir.is_read_only(NEWS_GROUP_ID));
}

#[test]
fn unknown_group_is_neither_present_nor_read_only() {
    let dir = GroupDirectory::new(Vec::new());
    assert!(!dir.exists("nope"));
    assert!(!dir.is_read_only("nope"));
}

#[test]
fn slugify_collapses_separators() {
    assert_eq!(slugify("  Rust  Fans!! "), "rust-fans");
    assert_eq!(slugify("a--b__c"), "a-b__c");
    assert_eq!(slugify("Друзья"), "друзья");
    assert_eq!(slugify("!!!"), "group");
}

#[test]
fn group_id_appends_base36_timestamp() {
    assert_eq!(group_id_for("Dev Team", 0), "dev-team-0");
    assert_eq!(group_id_for("Dev Team", 36), "dev-team-10");
    assert_eq!(group_id_for("x", 1_700_000_000_000), "x-loyw3v28");
}

#[tokio::test]
async fn create_group_rejects_bad_lengths() {
    let state = test_app_state();
    assert!(matches!(create_group(&state, " a ").await, Err(GroupError::InvalidName)));
    let long = "x".repeat(MAX_GROUP_NAME_LEN + 1);
    assert!(matches!(create_group(&state, &long).await, Err(GroupError::InvalidName)));
}

#[tokio::test]
async fn create_group_persists_and_pushes_update() {
    let state = test_app_state();
    let (_c, mut rx) = connect(&state).await;

    let created = create_group(&state, "  Book Club ").await.expect("valid name");
    assert_eq!(created.name, "Book Club");
    assert!(created.id.starts_with("book-club-"));

    let push = recv_frame(&mut rx).await;
    assert_eq!(push.syscall, "groups:update");
    let groups: Vec<Group> = serde_json::from_value(push.data["groups"].clone()).expect("groups array");
    assert_eq!(groups.last().map(|g| g.id.as_str()), Some(created.id.as_str()));

    assert!(state.groups.read().await.exists(&created.id));
    let stored = state.store.list_groups().await.expect("list");
    assert!(stored.iter().any(|g| g.id == created.id));
}

#[tokio::test]
async fn hydrate_reads_store_groups() {
    let store = crate::store::memory::MemoryStore::new();
    store.insert_group(&group("general")).await.expect("insert");
    let dir = hydrate(&store).await.expect("hydrate");
    assert!(dir.exists("general"));
    assert!(dir.exists(NEWS_GROUP_ID));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_creates_leave_observer_with_full_list() {
    let state = test_app_state();
    let (_observer, mut rx) = connect(&state).await;

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let state = state.clone();
            tokio::spawn(async move { create_group(&state, &format!("room {i}")).await })
        })
        .collect();
    for task in tasks {
        task.await.expect("create task").expect("valid name");
    }

    let pushes = drain_syscall(&mut rx, "groups:update");
    assert_eq!(pushes.len(), 16);
    let last: Vec<Group> = serde_json::from_value(pushes[15].data["groups"].clone()).expect("groups array");
    assert_eq!(last, list(&state).await);
}
