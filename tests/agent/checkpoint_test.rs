//! Tests for `src/agent/checkpoint.rs`.

use wintermute::agent::checkpoint::{new_correlation_id, Checkpoint, CheckpointStore};
use wintermute::providers::{Message, MessageContent, Role};

fn sample(uuid: &str) -> Checkpoint {
    Checkpoint::new(
        uuid.to_owned(),
        vec![Message { role: Role::User, content: MessageContent::Text("hi".to_owned()) }],
        None,
        3,
        Some("sk-live-0123456789abcdef"),
        uuid.to_owned(),
        vec!["current_time".to_owned()],
        1,
    )
}

#[test]
fn write_then_load_preserves_turn_state() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CheckpointStore::new(dir.path().to_path_buf());
    store.write(&sample("turn-a")).expect("write should succeed");

    let loaded = store.load("turn-a").expect("load should succeed").expect("checkpoint should exist");
    assert_eq!(loaded.turn_count, 3);
    assert_eq!(loaded.recent_tools, vec!["current_time".to_owned()]);
    assert_eq!(loaded.failure_count, 1);
}

#[test]
fn api_key_suffix_is_masked_on_disk_never_the_full_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CheckpointStore::new(dir.path().to_path_buf());
    store.write(&sample("turn-b")).expect("write should succeed");

    let raw = std::fs::read_to_string(dir.path().join("turn-b").join("checkpoint.json")).expect("read");
    assert!(!raw.contains("sk-live-0123456789abcdef"));
    assert!(raw.contains("***89abcdef"));
}

#[test]
fn loading_an_unknown_uuid_is_not_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CheckpointStore::new(dir.path().to_path_buf());
    assert!(store.load("never-written").expect("should not error").is_none());
}

#[test]
fn rewriting_a_checkpoint_for_the_same_uuid_replaces_it_atomically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = CheckpointStore::new(dir.path().to_path_buf());
    store.write(&sample("turn-c")).expect("first write");

    let mut second = sample("turn-c");
    second.turn_count = 9;
    store.write(&second).expect("second write");

    let loaded = store.load("turn-c").expect("load should succeed").expect("checkpoint should exist");
    assert_eq!(loaded.turn_count, 9);
}

#[test]
fn correlation_ids_are_not_reused() {
    assert_ne!(new_correlation_id(), new_correlation_id());
}
