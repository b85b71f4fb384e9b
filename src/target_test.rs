use super::*;

#[test]
fn pair_is_order_independent() {
    assert_eq!(ChatTarget::pair("bob", "alice"), ChatTarget::pair("alice", "bob"));
    assert_eq!(ChatTarget::pair("bob", "alice").session_id(), "pm:alice:bob");
}

#[test]
fn group_session_id() {
    assert_eq!(ChatTarget::group("general").session_id(), "group:general");
}

#[test]
fn other_party_resolves_either_side() {
    let t = ChatTarget::pair("alice", "bob");
    assert_eq!(t.other_party("alice"), Some("bob"));
    assert_eq!(t.other_party("bob"), Some("alice"));
    assert_eq!(ChatTarget::group("g").other_party("alice"), None);
}

#[test]
fn clamp_name_trims_and_caps() {
    assert_eq!(clamp_name("  alice  ", 32), "alice");
    assert_eq!(clamp_name("   ", 32), DEFAULT_NAME);
    assert_eq!(clamp_name("", 32), DEFAULT_NAME);
    assert_eq!(clamp_name("абвгдежз", 3), "абв");
}

#[test]
fn collate_folds_case_then_codepoints() {
    let mut names = vec!["bob", "Alice", "alice", "Карл", "carol"];
    names.sort_by(|a, b| collate(a, b));
    assert_eq!(names, vec!["Alice", "alice", "bob", "carol", "Карл"]);
}

#[test]
fn pair_party_matches_either_side_only() {
    let id = ChatTarget::pair("alice", "bob").session_id();
    assert!(is_pair_party(&id, "alice"));
    assert!(is_pair_party(&id, "bob"));
    assert!(!is_pair_party(&id, "ali"));
    assert!(!is_pair_party(&id, "carol"));
    assert!(!is_pair_party("group:alice", "alice"));
}

#[test]
fn names_cannot_smuggle_separator() {
    assert_eq!(clamp_name("a:b", 32), "a_b");
    let left = ChatTarget::pair(clamp_name("a:b", 32), "c").session_id();
    let right = ChatTarget::pair("a", clamp_name("b:c", 32)).session_id();
    assert_ne!(left, right);
}

#[test]
fn pair_party_rejects_ids_with_extra_segments() {
    assert!(!is_pair_party("pm:a:b:c", "a"));
    assert!(!is_pair_party("pm:a:b:c", "c"));
    assert!(!is_pair_party("pm:alice", "alice"));
    assert!(is_pair_party("pm:a_b:c", "a_b"));
}
