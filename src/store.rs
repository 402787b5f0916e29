//! Message store: the ordered message sequence of one thread.
//!
//! DESIGN
//! ======
//! Three inputs feed one append-only sequence:
//! - `seed`: bootstrap history, accepted once while the store is pristine
//! - `append_remote`: live messages, in transport arrival order
//! - `append_local`: optimistic echoes of our own sends
//!
//! Order is arrival order. Seeded history keeps the collaborator's order and
//! live messages are never re-sorted by `created_at`, even when a live
//! timestamp predates an earlier entry.
//!
//! Snapshots are `Arc<Vec<Message>>`. Appends go through `Arc::make_mut`, so
//! a snapshot handed out earlier never changes underneath its holder and
//! `Arc::ptr_eq` tells a renderer whether anything moved.
//!
//! ECHOES
//! ======
//! The server is expected not to echo our own messages back. When
//! `dedupe_echoes` is on, a remote message matching a pending local echo on
//! `(username, created_at, content)` is dropped instead of appended.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::message::{Identity, Message};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EchoKey {
    username: String,
    created_at: OffsetDateTime,
    content: String,
}

impl EchoKey {
    fn of(message: &Message) -> Option<Self> {
        let sender = message.sender.as_ref()?;
        Some(Self {
            username: sender.username.clone(),
            created_at: message.created_at,
            content: message.content.clone(),
        })
    }
}

#[derive(Default)]
struct StoreInner {
    messages: Arc<Vec<Message>>,
    seeded: bool,
    appended: bool,
    closed: bool,
    pending_echoes: HashSet<EchoKey>,
}

pub struct MessageStore {
    room_id: String,
    dedupe_echoes: bool,
    inner: Mutex<StoreInner>,
    changes: watch::Sender<usize>,
}

impl MessageStore {
    #[must_use]
    pub fn new(room_id: impl Into<String>, dedupe_echoes: bool) -> Self {
        let (changes, _initial) = watch::channel(0);
        Self {
            room_id: room_id.into(),
            dedupe_echoes,
            inner: Mutex::new(StoreInner::default()),
            changes,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Install bootstrap history. Only the first call on a pristine store
    /// takes effect; later calls return `false` and change nothing.
    pub fn seed(&self, history: Vec<Message>) -> bool {
        let mut inner = self.lock();
        if inner.closed || inner.seeded || inner.appended {
            debug!(room_id = %self.room_id, "seed ignored; store already initialized");
            return false;
        }
        inner.seeded = true;
        inner.messages = Arc::new(history);
        let len = inner.messages.len();
        drop(inner);

        debug!(room_id = %self.room_id, count = len, "seeded history");
        self.changes.send_replace(len);
        true
    }

    /// Append a live message in arrival order.
    ///
    /// Returns `false` when the store is closed, the message belongs to
    /// another room, or it echoes a pending local send (with dedupe on).
    pub fn append_remote(&self, message: Message) -> bool {
        if message.room_id != self.room_id {
            warn!(room_id = %self.room_id, other_room = %message.room_id, "dropping message for another room");
            return false;
        }

        let mut inner = self.lock();
        if inner.closed {
            debug!(room_id = %self.room_id, "late remote message after close ignored");
            return false;
        }
        if self.dedupe_echoes {
            if let Some(key) = EchoKey::of(&message) {
                if inner.pending_echoes.remove(&key) {
                    debug!(room_id = %self.room_id, "suppressed server echo of local message");
                    return false;
                }
            }
        }

        let len = push(&mut inner, message);
        drop(inner);
        self.changes.send_replace(len);
        true
    }

    /// Optimistically append a message authored by `identity`, stamped now.
    ///
    /// Whitespace-only content is rejected without any effect. Returns the
    /// appended message so the caller can put it on the wire.
    pub fn append_local(&self, content: &str, identity: &Identity) -> Option<Message> {
        if content.trim().is_empty() {
            debug!(room_id = %self.room_id, "empty message not sent");
            return None;
        }

        let message = Message {
            content: content.to_owned(),
            room_id: self.room_id.clone(),
            created_at: now_millis(),
            sender: Some(identity.as_sender()),
        };

        let mut inner = self.lock();
        if inner.closed {
            debug!(room_id = %self.room_id, "local send after close ignored");
            return None;
        }
        if self.dedupe_echoes {
            if let Some(key) = EchoKey::of(&message) {
                inner.pending_echoes.insert(key);
            }
        }

        let len = push(&mut inner, message.clone());
        drop(inner);
        self.changes.send_replace(len);
        Some(message)
    }

    /// Current sequence. Never mutated after it is returned.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        Arc::clone(&self.lock().messages)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch the message count; fires on every accepted seed or append.
    #[must_use]
    pub fn changes(&self) -> watch::Receiver<usize> {
        self.changes.subscribe()
    }

    /// Retire the store. Every later append is discarded.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        inner.pending_echoes.clear();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

fn push(inner: &mut StoreInner, message: Message) -> usize {
    inner.appended = true;
    let messages = Arc::make_mut(&mut inner.messages);
    messages.push(message);
    messages.len()
}

/// Current time at millisecond precision, matching what the server keeps.
fn now_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_millisecond(now.millisecond()).unwrap_or(now)
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
