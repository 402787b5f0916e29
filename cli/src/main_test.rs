use super::*;
use serde_json::json;

fn comment_json() -> Value {
    json!({
        "content": "Is the tripod back?",
        "createAt": "2024-03-02T10:00:00Z",
        "userName": "alice",
        "fullName": "Alice A",
        "role": "Student"
    })
}

#[test]
fn history_accepts_bare_and_wrapped_lists() {
    assert_eq!(comments_from_json(json!([comment_json()])).expect("bare").len(), 1);
    assert_eq!(comments_from_json(json!({"comments": [comment_json()]})).expect("comments").len(), 1);
    assert_eq!(comments_from_json(json!({"data": []})).expect("data").len(), 0);
}

#[test]
fn history_tolerates_null_content() {
    let comments = comments_from_json(json!([comment_json(), {"content": null, "userName": "bob"}])).expect("history");
    assert_eq!(comments.len(), 2);
    assert_eq!(comments[1].clone().into_message("eq-1").content, "");
}

#[test]
fn history_rejects_other_shapes() {
    assert!(matches!(comments_from_json(json!("nope")), Err(CliError::NotAHistory)));
    assert!(matches!(comments_from_json(json!({"items": []})), Err(CliError::NotAHistory)));
}

#[test]
fn format_message_names_author_and_role() {
    let comments = comments_from_json(json!([comment_json()])).expect("history");
    let message = comments.into_iter().next().expect("one").into_message("eq-1");

    assert_eq!(
        format_message(&message, false),
        "[2024-03-02T10:00:00Z] Alice A (Student): Is the tripod back?"
    );
    assert!(format_message(&message, true).contains("] you (Student): "));
}

#[test]
fn cli_parses_chat_arguments() {
    let cli = Cli::try_parse_from([
        "lendchat",
        "--endpoint",
        "wss://lend.example.edu/ws",
        "--no-reconnect",
        "chat",
        "--equipment-id",
        "eq-9",
        "--username",
        "carol",
    ])
    .expect("parse");

    assert_eq!(cli.endpoint, "wss://lend.example.edu/ws");
    assert!(cli.no_reconnect);
    let Command::Chat(args) = cli.command else {
        panic!("expected chat");
    };
    assert_eq!(args.equipment_id, "eq-9");
    assert_eq!(args.role, "Student");
    assert!(args.history.is_none());
}

#[test]
fn history_file_and_url_conflict() {
    let result = Cli::try_parse_from([
        "lendchat",
        "chat",
        "--equipment-id",
        "eq-9",
        "--username",
        "carol",
        "--history",
        "h.json",
        "--history-url",
        "http://x/h",
    ]);
    assert!(result.is_err());
}
