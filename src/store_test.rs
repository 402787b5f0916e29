use super::*;
use time::macros::datetime;

fn identity() -> Identity {
    Identity {
        id: "u-1".to_owned(),
        username: "carol".to_owned(),
        display_name: "Carol C".to_owned(),
        role: "Student".to_owned(),
    }
}

fn remote(room: &str, content: &str, created_at: OffsetDateTime) -> Message {
    Message {
        content: content.to_owned(),
        room_id: room.to_owned(),
        created_at,
        sender: Some(crate::message::Sender {
            username: "bob".to_owned(),
            display_name: "Bob B".to_owned(),
            role: "Supervisor".to_owned(),
        }),
    }
}

fn contents(store: &MessageStore) -> Vec<String> {
    store.snapshot().iter().map(|m| m.content.clone()).collect()
}

// =============================================================
// seed
// =============================================================

#[test]
fn seed_then_snapshot_equals_history() {
    let store = MessageStore::new("eq-1", false);
    let history = vec![
        remote("eq-1", "first", datetime!(2024-01-01 00:00:00 UTC)),
        remote("eq-1", "second", datetime!(2024-01-01 00:05:00 UTC)),
    ];

    assert!(store.seed(history.clone()));
    assert_eq!(*store.snapshot(), history);
}

#[test]
fn seed_is_accepted_only_once() {
    let store = MessageStore::new("eq-1", false);
    assert!(store.seed(vec![remote("eq-1", "a", datetime!(2024-01-01 00:00:00 UTC))]));
    assert!(!store.seed(vec![]));
    assert_eq!(contents(&store), vec!["a"]);
}

#[test]
fn seed_after_live_message_is_ignored() {
    let store = MessageStore::new("eq-1", false);
    store.append_remote(remote("eq-1", "live", datetime!(2024-01-01 00:00:00 UTC)));

    assert!(!store.seed(vec![remote("eq-1", "old", datetime!(2023-01-01 00:00:00 UTC))]));
    assert_eq!(contents(&store), vec!["live"]);
}

// =============================================================
// append_remote
// =============================================================

#[test]
fn remote_messages_keep_arrival_order_regardless_of_timestamps() {
    let store = MessageStore::new("eq-1", false);
    store.seed(vec![remote("eq-1", "seeded", datetime!(2024-01-01 12:00:00 UTC))]);

    store.append_remote(remote("eq-1", "m1", datetime!(2024-01-02 00:00:00 UTC)));
    store.append_remote(remote("eq-1", "m2", datetime!(2023-06-01 00:00:00 UTC)));

    assert_eq!(contents(&store), vec!["seeded", "m1", "m2"]);
}

#[test]
fn remote_message_for_another_room_is_dropped() {
    let store = MessageStore::new("eq-1", false);
    assert!(!store.append_remote(remote("eq-2", "leak", OffsetDateTime::now_utc())));
    assert!(store.is_empty());
}

#[test]
fn append_after_close_is_discarded() {
    let store = MessageStore::new("eq-1", false);
    store.append_remote(remote("eq-1", "before", OffsetDateTime::now_utc()));
    store.close();

    assert!(!store.append_remote(remote("eq-1", "late", OffsetDateTime::now_utc())));
    assert!(store.append_local("late too", &identity()).is_none());
    assert!(store.is_closed());
    assert_eq!(contents(&store), vec!["before"]);
}

// =============================================================
// append_local
// =============================================================

#[test]
fn append_local_adds_exactly_one_message_stamped_with_identity() {
    let store = MessageStore::new("eq-1", false);
    let me = identity();

    for (i, content) in ["Hello there", "  padded  ", "x"].into_iter().enumerate() {
        let appended = store.append_local(content, &me).expect("appended");
        assert_eq!(store.len(), i + 1);

        let snapshot = store.snapshot();
        let last = snapshot.last().expect("last");
        assert_eq!(last, &appended);
        assert_eq!(last.content, content);
        assert_eq!(last.room_id, "eq-1");
        assert_eq!(last.sender.as_ref().map(|s| s.username.as_str()), Some("carol"));
    }
}

#[test]
fn append_local_rejects_whitespace_only_content() {
    let store = MessageStore::new("eq-1", false);
    store.seed(vec![remote("eq-1", "seeded", OffsetDateTime::now_utc())]);
    let before = store.snapshot();

    for content in ["", "   ", "\n\t "] {
        assert!(store.append_local(content, &identity()).is_none());
    }
    assert!(Arc::ptr_eq(&before, &store.snapshot()));
}

#[test]
fn append_local_timestamp_has_millisecond_precision() {
    let store = MessageStore::new("eq-1", false);
    let msg = store.append_local("tick", &identity()).expect("appended");
    assert_eq!(msg.created_at.nanosecond() % 1_000_000, 0);
}

// =============================================================
// snapshots and change notification
// =============================================================

#[test]
fn earlier_snapshot_is_not_mutated_by_appends() {
    let store = MessageStore::new("eq-1", false);
    store.append_local("one", &identity());
    let before = store.snapshot();

    store.append_local("two", &identity());
    let after = store.snapshot();

    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 2);
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn changes_tracks_message_count() {
    let store = MessageStore::new("eq-1", false);
    let rx = store.changes();
    assert_eq!(*rx.borrow(), 0);

    store.seed(vec![remote("eq-1", "a", OffsetDateTime::now_utc())]);
    assert_eq!(*rx.borrow(), 1);
    store.append_local("b", &identity());
    assert_eq!(*rx.borrow(), 2);
    store.append_local("   ", &identity());
    assert_eq!(*rx.borrow(), 2);
}

// =============================================================
// echo dedupe
// =============================================================

#[test]
fn echoes_are_appended_when_dedupe_is_off() {
    let store = MessageStore::new("eq-1", false);
    let local = store.append_local("hi", &identity()).expect("appended");

    assert!(store.append_remote(local));
    assert_eq!(store.len(), 2);
}

#[test]
fn dedupe_suppresses_exactly_one_matching_echo() {
    let store = MessageStore::new("eq-1", true);
    let local = store.append_local("hi", &identity()).expect("appended");

    assert!(!store.append_remote(local.clone()));
    assert!(store.append_remote(local));
    assert_eq!(store.len(), 2);
}

#[test]
fn dedupe_keeps_messages_that_differ_in_any_key_field() {
    let store = MessageStore::new("eq-1", true);
    let local = store.append_local("hi", &identity()).expect("appended");

    let mut other_content = local.clone();
    other_content.content = "hi!".to_owned();
    let mut other_time = local.clone();
    other_time.created_at += time::Duration::seconds(1);
    let mut other_user = local;
    if let Some(sender) = other_user.sender.as_mut() {
        sender.username = "mallory".to_owned();
    }

    assert!(store.append_remote(other_content));
    assert!(store.append_remote(other_time));
    assert!(store.append_remote(other_user));
    assert_eq!(store.len(), 4);
}
