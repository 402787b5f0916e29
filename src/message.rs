//! Thread data model: messages, senders, viewer identity, history comments.
//!
//! DESIGN
//! ======
//! Wire payloads are loosely shaped (see `frames::InboundMessage`). Everything
//! crossing into the store goes through the normalizers here, which never
//! reject a message for a missing sender or a bad timestamp: a missing sender
//! stays `None` (rendered as "Anonymous") and an unparseable timestamp
//! becomes "now". The one field that is never guessed is an unreadable room
//! id, since attributing it to the current room would leak across rooms.

use frames::{CodecError, InboundMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::error::ComponentRange;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

/// Display name used for messages whose sender was never resolved.
pub const ANONYMOUS: &str = "Anonymous";

// =============================================================================
// MESSAGE
// =============================================================================

/// One entry in an equipment discussion thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub content: String,
    /// Equipment id of the room this message belongs to.
    pub room_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub sender: Option<Sender>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub username: String,
    pub display_name: String,
    pub role: String,
}

impl Message {
    /// Normalize an inbound `receive-message` payload.
    ///
    /// Fields are read independently, so one mistyped field only loses
    /// itself. `fallback_room` is used only when the payload has no room
    /// key at all.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] when `data` is not an object or names its room
    /// with an unusable value; such a message cannot be attributed safely.
    pub fn from_wire(data: &Value, fallback_room: &str) -> Result<Self, CodecError> {
        let wire = InboundMessage::from_value(data)?;

        let sender = wire.sender.and_then(|s| {
            let username = s.username.filter(|u| !u.trim().is_empty())?;
            Some(Sender {
                display_name: s.full_name.unwrap_or_else(|| username.clone()),
                role: s.role.unwrap_or_default(),
                username,
            })
        });

        Ok(Self {
            content: wire.content.unwrap_or_default(),
            room_id: wire.group_id.unwrap_or_else(|| fallback_room.to_owned()),
            created_at: parse_timestamp(wire.create_at.as_ref()),
            sender,
        })
    }

    /// Name to render for the author of this message.
    #[must_use]
    pub fn author_name(&self) -> &str {
        self.sender.as_ref().map_or(ANONYMOUS, |s| s.display_name.as_str())
    }

    /// `createdAt` in RFC 3339 form, as sent on the wire.
    #[must_use]
    pub fn created_at_rfc3339(&self) -> String {
        format_timestamp(self.created_at)
    }
}

// =============================================================================
// IDENTITY
// =============================================================================

/// The viewing user, as resolved by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub role: String,
}

impl Identity {
    /// Sender block stamped on optimistic local messages.
    #[must_use]
    pub fn as_sender(&self) -> Sender {
        Sender {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            role: self.role.clone(),
        }
    }

    /// True when `message` was authored by this user.
    #[must_use]
    pub fn is_author_of(&self, message: &Message) -> bool {
        message.sender.as_ref().is_some_and(|s| s.username == self.username)
    }
}

// =============================================================================
// HISTORY
// =============================================================================

/// A stored comment as returned by the history collaborator
/// (`getCommentsByEquipment`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub create_at: Option<Value>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Comment {
    /// Map a history comment into the thread's message shape.
    #[must_use]
    pub fn into_message(self, room_id: &str) -> Message {
        let sender = self.user_name.filter(|u| !u.trim().is_empty()).map(|username| Sender {
            display_name: self.full_name.unwrap_or_else(|| username.clone()),
            role: self.role.unwrap_or_default(),
            username,
        });

        Message {
            content: self.content.unwrap_or_default(),
            room_id: room_id.to_owned(),
            created_at: parse_timestamp(self.create_at.as_ref()),
            sender,
        }
    }
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// Parse an RFC 3339 string or epoch-milliseconds number, defaulting to now.
#[must_use]
pub fn parse_timestamp(raw: Option<&Value>) -> OffsetDateTime {
    match raw {
        Some(Value::String(s)) => match OffsetDateTime::parse(s.trim(), &Rfc3339) {
            Ok(ts) => return ts,
            Err(e) => debug!(error = %e, raw = %s, "unparseable timestamp; using now"),
        },
        Some(Value::Number(n)) => match n.as_i64().map(from_epoch_millis) {
            Some(Ok(ts)) => return ts,
            Some(Err(e)) => debug!(error = %e, raw = %n, "epoch millis out of range; using now"),
            None => debug!(raw = %n, "non-integer epoch millis; using now"),
        },
        None | Some(Value::Null) => debug!("missing timestamp; using now"),
        Some(other) => debug!(raw = %other, "unusable timestamp; using now"),
    }
    OffsetDateTime::now_utc()
}

fn from_epoch_millis(ms: i64) -> Result<OffsetDateTime, ComponentRange> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(ms) * 1_000_000)
}

#[must_use]
pub fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.unix_timestamp().to_string())
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
