use super::*;
use serde_json::json;
use time::macros::datetime;

fn identity() -> Identity {
    Identity {
        id: "u-7".to_owned(),
        username: "carol".to_owned(),
        display_name: "Carol C".to_owned(),
        role: "Student".to_owned(),
    }
}

// =============================================================
// Message::from_wire
// =============================================================

#[test]
fn from_wire_maps_full_payload() {
    let data = json!({
        "content": "Hey back",
        "groupID": "eq-1",
        "createAt": "2024-01-01T00:01:00Z",
        "sender": {"username": "bob", "fullName": "Bob B", "role": "Supervisor"}
    });
    let msg = Message::from_wire(&data, "fallback").expect("message");

    assert_eq!(msg.content, "Hey back");
    assert_eq!(msg.room_id, "eq-1");
    assert_eq!(msg.created_at, datetime!(2024-01-01 00:01:00 UTC));
    let sender = msg.sender.expect("sender");
    assert_eq!(sender.username, "bob");
    assert_eq!(sender.display_name, "Bob B");
    assert_eq!(sender.role, "Supervisor");
}

#[test]
fn from_wire_defaults_missing_sender_and_bad_timestamp() {
    let before = OffsetDateTime::now_utc();
    let data = json!({"content": "orphan", "createAt": "yesterday-ish"});
    let msg = Message::from_wire(&data, "eq-2").expect("message");

    assert_eq!(msg.room_id, "eq-2");
    assert!(msg.sender.is_none());
    assert_eq!(msg.author_name(), ANONYMOUS);
    assert!(msg.created_at >= before);
}

#[test]
fn from_wire_treats_blank_username_as_missing_sender() {
    let data = json!({"content": "x", "sender": {"username": "  ", "fullName": "Ghost"}});
    let msg = Message::from_wire(&data, "eq-3").expect("message");
    assert!(msg.sender.is_none());
}

#[test]
fn from_wire_fills_display_name_from_username() {
    let data = json!({"content": "x", "sender": {"username": "dave"}});
    let msg = Message::from_wire(&data, "eq-3").expect("message");
    assert_eq!(msg.author_name(), "dave");
}

#[test]
fn from_wire_keeps_well_typed_fields_next_to_mistyped_ones() {
    let data = json!({
        "content": "still here",
        "groupID": 7,
        "createAt": "2024-01-01T00:01:00Z",
        "sender": {"username": "bob", "fullName": "Bob B", "role": ["Supervisor"]}
    });
    let msg = Message::from_wire(&data, "eq-4").expect("message");

    assert_eq!(msg.content, "still here");
    assert_eq!(msg.room_id, "7");
    assert_eq!(msg.created_at, datetime!(2024-01-01 00:01:00 UTC));
    let sender = msg.sender.expect("sender");
    assert_eq!(sender.username, "bob");
    assert_eq!(sender.display_name, "Bob B");
    assert_eq!(sender.role, "");
}

#[test]
fn from_wire_mistyped_sender_keeps_content_room_and_time() {
    let data = json!({"content": "x", "groupID": "eq-2", "createAt": "2024-01-01T00:01:00Z", "sender": "bob"});
    let msg = Message::from_wire(&data, "eq-1").expect("message");

    assert_eq!(msg.room_id, "eq-2");
    assert_eq!(msg.created_at, datetime!(2024-01-01 00:01:00 UTC));
    assert!(msg.sender.is_none());
}

#[test]
fn from_wire_uses_fallback_room_only_when_no_room_key() {
    let msg = Message::from_wire(&json!({"content": "x"}), "eq-4").expect("message");
    assert_eq!(msg.room_id, "eq-4");

    let msg = Message::from_wire(&json!({"content": "x", "roomId": "eq-5"}), "eq-4").expect("message");
    assert_eq!(msg.room_id, "eq-5");

    let err = Message::from_wire(&json!({"content": "x", "groupID": ["eq-5"]}), "eq-4").expect_err("bad room");
    assert!(matches!(err, CodecError::BadRoom));
}

#[test]
fn from_wire_rejects_non_object_payload() {
    assert!(matches!(Message::from_wire(&json!("just text"), "eq-5"), Err(CodecError::NotAnObject)));
    assert!(matches!(Message::from_wire(&serde_json::Value::Null, "eq-5"), Err(CodecError::NotAnObject)));
}

#[test]
fn from_wire_accepts_epoch_millis() {
    let data = json!({"content": "x", "createAt": 1_704_067_200_000_i64});
    let msg = Message::from_wire(&data, "eq-6").expect("message");
    assert_eq!(msg.created_at, datetime!(2024-01-01 00:00:00 UTC));
}

#[test]
fn parse_timestamp_falls_back_to_now_for_out_of_range_millis() {
    let before = OffsetDateTime::now_utc();
    assert!(parse_timestamp(Some(&json!(i64::MAX))) >= before);
    assert!(parse_timestamp(Some(&json!(1.5))) >= before);
    assert!(parse_timestamp(Some(&json!(true))) >= before);
    assert!(parse_timestamp(None) >= before);
}

// =============================================================
// Comment → Message
// =============================================================

#[test]
fn comment_into_message_maps_history_fields() {
    let comment: Comment = serde_json::from_value(json!({
        "content": "Hi",
        "createAt": "2024-01-01T00:00:00Z",
        "userName": "alice",
        "fullName": "Alice A",
        "role": "Student"
    }))
    .expect("comment");

    let msg = comment.into_message("eq-1");
    assert_eq!(msg.content, "Hi");
    assert_eq!(msg.room_id, "eq-1");
    assert_eq!(msg.created_at_rfc3339(), "2024-01-01T00:00:00Z");
    let sender = msg.sender.expect("sender");
    assert_eq!(sender.username, "alice");
    assert_eq!(sender.display_name, "Alice A");
}

#[test]
fn comment_with_null_fields_maps_to_defaults() {
    let comments: Vec<Comment> = serde_json::from_value(json!([
        {"content": null, "createAt": null, "userName": null, "fullName": null, "role": null},
        {"content": "ok", "userName": "alice"}
    ]))
    .expect("history with nulls");

    let msgs: Vec<Message> = comments.into_iter().map(|c| c.into_message("eq-1")).collect();
    assert_eq!(msgs[0].content, "");
    assert!(msgs[0].sender.is_none());
    assert_eq!(msgs[1].content, "ok");
}

#[test]
fn comment_without_user_has_no_sender() {
    let comment: Comment = serde_json::from_value(json!({"content": "system note"})).expect("comment");
    let msg = comment.into_message("eq-1");
    assert!(msg.sender.is_none());
}

// =============================================================
// Identity
// =============================================================

#[test]
fn identity_recognizes_own_messages() {
    let me = identity();
    let mine = Message {
        content: "mine".to_owned(),
        room_id: "eq-1".to_owned(),
        created_at: OffsetDateTime::now_utc(),
        sender: Some(me.as_sender()),
    };
    let anonymous = Message { sender: None, ..mine.clone() };

    assert!(me.is_author_of(&mine));
    assert!(!me.is_author_of(&anonymous));
}

#[test]
fn message_serializes_with_camel_case_and_rfc3339() {
    let msg = Message {
        content: "hello".to_owned(),
        room_id: "eq-1".to_owned(),
        created_at: datetime!(2024-01-01 00:00:00 UTC),
        sender: None,
    };
    let value = serde_json::to_value(&msg).expect("serialize");
    assert_eq!(
        value,
        json!({"content": "hello", "roomId": "eq-1", "createdAt": "2024-01-01T00:00:00Z", "sender": null})
    );
}
