//! Shared frame model and JSON codec for the equipment discussion wire.
//!
//! This crate owns the wire representation spoken between the discussion
//! client and the realtime messaging endpoint. A frame is a named event plus
//! a loosely typed JSON payload, sent as the text `["<event>", <payload>]`.
//!
//! Inbound payload shapes are deliberately permissive (every field optional,
//! legacy field names accepted as aliases). Normalizing them into trusted
//! domain types is the consumer's job.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// EVENT NAMES
// =============================================================================

/// Client → server: subscribe this connection to a room. Advisory, no reply.
pub const JOIN_ROOM: &str = "join-room";

/// Client → server: unsubscribe this connection from a room. Best effort.
pub const LEAVE_ROOM: &str = "leave-room";

/// Client → server: post a message to a room.
pub const SEND_MESSAGE: &str = "send-message";

/// Server → client: a message posted to a room this connection joined.
pub const RECEIVE_MESSAGE: &str = "receive-message";

// =============================================================================
// ERRORS
// =============================================================================

/// Error returned by [`decode_frame`] and [`InboundMessage::from_value`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not valid JSON.
    #[error("failed to decode frame json: {0}")]
    Decode(#[from] serde_json::Error),
    /// The JSON is valid but is not an `[event, payload]` array.
    #[error("frame is not an [event, payload] array")]
    NotAnEvent,
    /// A message payload is not a JSON object.
    #[error("payload is not a JSON object")]
    NotAnObject,
    /// A message payload names its room with an unusable value.
    #[error("payload room id is neither a string nor a number")]
    BadRoom,
}

// =============================================================================
// FRAME
// =============================================================================

/// A single named event on the realtime wire.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Event name, e.g. [`JOIN_ROOM`].
    pub event: String,
    /// Arbitrary JSON payload.
    pub data: Value,
}

impl Frame {
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self { event: event.into(), data }
    }

    /// `join-room` carrying the bare room id.
    #[must_use]
    pub fn join_room(room_id: &str) -> Self {
        Self::new(JOIN_ROOM, Value::String(room_id.to_owned()))
    }

    /// `leave-room` carrying the bare room id.
    #[must_use]
    pub fn leave_room(room_id: &str) -> Self {
        Self::new(LEAVE_ROOM, Value::String(room_id.to_owned()))
    }

    /// `send-message` carrying the outbound payload.
    #[must_use]
    pub fn send_message(payload: &SendMessage) -> Self {
        Self::new(SEND_MESSAGE, serde_json::to_value(payload).unwrap_or(Value::Null))
    }
}

/// Encode a frame as wire text.
#[must_use]
pub fn encode_frame(frame: &Frame) -> String {
    Value::Array(vec![Value::String(frame.event.clone()), frame.data.clone()]).to_string()
}

/// Decode wire text into a frame.
///
/// A frame without a payload element decodes with `Value::Null` data.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for text that is not JSON and
/// [`CodecError::NotAnEvent`] for JSON that is not an array led by a string.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    let value = serde_json::from_str::<Value>(text)?;
    let Value::Array(mut items) = value else {
        return Err(CodecError::NotAnEvent);
    };
    if items.is_empty() {
        return Err(CodecError::NotAnEvent);
    }

    let data = if items.len() > 1 { items.swap_remove(1) } else { Value::Null };
    match items.swap_remove(0) {
        Value::String(event) => Ok(Frame { event, data }),
        _ => Err(CodecError::NotAnEvent),
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Outbound `send-message` payload.
///
/// Sender identity is intentionally absent: the server attaches the identity
/// derived from the session credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    pub content: String,
    #[serde(rename = "groupID")]
    pub group_id: String,
    /// RFC 3339 timestamp stamped by the client.
    #[serde(rename = "createAt")]
    pub create_at: String,
}

/// Inbound `receive-message` payload as it appears on the wire.
///
/// Built with [`InboundMessage::from_value`], which reads each field on its
/// own: a mistyped field becomes `None` without taking its neighbours with it.
/// The room id is the exception, see [`CodecError::BadRoom`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct InboundMessage {
    pub content: Option<String>,
    #[serde(rename = "groupID")]
    pub group_id: Option<String>,
    /// Usually an RFC 3339 string; some senders use epoch milliseconds.
    #[serde(rename = "createAt")]
    pub create_at: Option<Value>,
    pub sender: Option<WireSender>,
}

/// Sender block attached by the server to inbound messages.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WireSender {
    pub username: Option<String>,
    #[serde(rename = "fullName")]
    pub full_name: Option<String>,
    pub role: Option<String>,
}

impl InboundMessage {
    /// Read a `receive-message` payload field by field.
    ///
    /// Accepted names: `content`/`message`, `groupID`/`roomId`,
    /// `createAt`/`createdAt`, `sender`. Ids and text may be strings or
    /// numbers. `group_id` is `None` only when no room key is present.
    ///
    /// # Errors
    ///
    /// [`CodecError::NotAnObject`] when `data` is not a JSON object and
    /// [`CodecError::BadRoom`] when a room key is present but holds neither
    /// a string nor a number.
    pub fn from_value(data: &Value) -> Result<Self, CodecError> {
        let Value::Object(map) = data else {
            return Err(CodecError::NotAnObject);
        };

        let group_id = match first(map, &["groupID", "roomId"]) {
            None => None,
            Some(raw) => Some(text(raw).ok_or(CodecError::BadRoom)?),
        };

        Ok(Self {
            content: first(map, &["content", "message"]).and_then(text),
            group_id,
            create_at: first(map, &["createAt", "createdAt"]).filter(|v| !v.is_null()).cloned(),
            sender: map.get("sender").and_then(WireSender::from_value),
        })
    }
}

impl WireSender {
    /// Read a sender block; anything but an object yields `None`.
    #[must_use]
    pub fn from_value(data: &Value) -> Option<Self> {
        let Value::Object(map) = data else {
            return None;
        };
        Some(Self {
            username: map.get("username").and_then(text),
            full_name: first(map, &["fullName", "displayName"]).and_then(text),
            role: map.get("role").and_then(text),
        })
    }
}

/// Value of the first key in `keys` that is present.
fn first<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| map.get(*key))
}

/// Strings as-is, numbers rendered; everything else is unusable.
fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
