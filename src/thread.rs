//! Thread controller: binds one equipment-detail view to one room.
//!
//! LIFECYCLE
//! =========
//! `Disconnected --start--> Connecting --open--> Joined --stop--> Disconnected`
//!
//! 1. Seed the store with mapped history
//! 2. Open (or reuse) the connection
//! 3. Register the `receive-message` handler that feeds the store
//! 4. Emit `join-room`; the session is `Joined` from here on
//!
//! Teardown runs in the opposite direction: remove handlers, leave the room,
//! close the connection, retire the store. It runs once, whether triggered by
//! `stop()`, a room switch, or the last session handle being dropped.
//!
//! There is no join acknowledgement and no delivery acknowledgement. `send`
//! appends locally first and emits fire-and-forget; a message the server
//! never receives still shows in the sender's own view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frames::{Frame, RECEIVE_MESSAGE, SendMessage};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::CredentialsMode;
use crate::connection::{CONNECT, Connection, ConnectionManager};
use crate::message::{Comment, Identity, Message};
use crate::room::RoomRouter;
use crate::store::MessageStore;
use crate::transport::LinkStatus;

/// Session state as seen by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Joined,
}

// =============================================================================
// CONTROLLER
// =============================================================================

/// Owns the connection manager and the one live session of a mounted view.
pub struct ThreadController {
    manager: Arc<ConnectionManager>,
    credentials: CredentialsMode,
    session: Option<ThreadSession>,
}

impl ThreadController {
    #[must_use]
    pub fn new(manager: ConnectionManager) -> Self {
        let credentials = manager.config().credentials;
        Self { manager: Arc::new(manager), credentials, session: None }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: CredentialsMode) -> Self {
        self.credentials = credentials;
        self
    }

    /// Start (or keep) the thread for `equipment_id`.
    ///
    /// Re-starting the live room returns the existing session untouched; its
    /// history is not re-seeded. Starting a different room stops the current
    /// session first.
    pub fn start(&mut self, equipment_id: &str, identity: Identity, history: Vec<Comment>) -> ThreadSession {
        if let Some(current) = &self.session {
            if current.room_id() == equipment_id && current.state() == ConnectionState::Joined {
                debug!(room_id = equipment_id, "thread already running");
                return current.clone();
            }
            current.stop();
        }

        let session = ThreadSession::start(Arc::clone(&self.manager), self.credentials, equipment_id, identity, history);
        self.session = Some(session.clone());
        session
    }

    /// The live session, if any.
    #[must_use]
    pub fn session(&self) -> Option<&ThreadSession> {
        self.session.as_ref()
    }

    /// Stop and forget the current session.
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Handle to a running thread. Clones share the session; dropping the last
/// handle stops it.
#[derive(Clone)]
pub struct ThreadSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    room_id: String,
    identity: Identity,
    store: Arc<MessageStore>,
    router: RoomRouter,
    manager: Arc<ConnectionManager>,
    connection: Connection,
    state: Mutex<ConnectionState>,
}

impl std::fmt::Debug for ThreadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSession")
            .field("room_id", &self.inner.room_id)
            .field("state", &self.state())
            .field("messages", &self.len())
            .finish_non_exhaustive()
    }
}

impl ThreadSession {
    fn start(
        manager: Arc<ConnectionManager>,
        credentials: CredentialsMode,
        equipment_id: &str,
        identity: Identity,
        history: Vec<Comment>,
    ) -> Self {
        let store = Arc::new(MessageStore::new(equipment_id, manager.config().dedupe_echoes));
        store.seed(history.into_iter().map(|c| c.into_message(equipment_id)).collect());

        let state = Mutex::new(ConnectionState::Connecting);
        let connection = manager.open(credentials);

        let sink = Arc::clone(&store);
        let room_id = equipment_id.to_owned();
        connection.on(RECEIVE_MESSAGE, move |data| match Message::from_wire(data, &room_id) {
            Ok(message) => {
                sink.append_remote(message);
            }
            Err(e) => warn!(room_id = %room_id, error = %e, payload = %data, "ignoring unattributable receive-message"),
        });

        let router = RoomRouter::new();
        let rejoin_router = router.clone();
        let rejoin_conn = connection.clone();
        connection.on(CONNECT, move |data| {
            if data.get("resumed").and_then(Value::as_bool) == Some(true) {
                rejoin_router.rejoin(&rejoin_conn);
            }
        });

        router.join(&connection, equipment_id);
        *state.lock().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Joined;
        info!(room_id = equipment_id, connection_id = %connection.id(), seeded = store.len(), "thread started");

        Self {
            inner: Arc::new(SessionInner {
                room_id: equipment_id.to_owned(),
                identity,
                store,
                router,
                manager,
                connection,
                state,
            }),
        }
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.inner.room_id
    }

    #[must_use]
    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state()
    }

    /// Status of the underlying link, for degraded-mode display.
    #[must_use]
    pub fn link_status(&self) -> LinkStatus {
        self.inner.connection.status()
    }

    /// Ordered messages for rendering.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        self.inner.store.snapshot()
    }

    /// Message count, e.g. for a "N comments" header.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    #[must_use]
    pub fn changes(&self) -> watch::Receiver<usize> {
        self.inner.store.changes()
    }

    #[must_use]
    pub fn is_mine(&self, message: &Message) -> bool {
        self.inner.identity.is_author_of(message)
    }

    /// Append `content` optimistically and emit it.
    ///
    /// Returns `false` when nothing happened: blank content or a stopped
    /// session. `true` says nothing about delivery.
    pub fn send(&self, content: &str) -> bool {
        if self.state() != ConnectionState::Joined {
            debug!(room_id = %self.inner.room_id, "send on stopped thread ignored");
            return false;
        }
        let Some(message) = self.inner.store.append_local(content, &self.inner.identity) else {
            return false;
        };

        let payload = SendMessage {
            content: message.content.clone(),
            group_id: self.inner.room_id.clone(),
            create_at: message.created_at_rfc3339(),
        };
        if !self.inner.connection.emit(Frame::send_message(&payload)) {
            debug!(room_id = %self.inner.room_id, "message kept locally; link did not accept it");
        }
        true
    }

    /// Tear the thread down. Safe to call any number of times.
    pub fn stop(&self) {
        self.inner.teardown();
    }
}

impl SessionInner {
    fn state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn teardown(&self) {
        {
            let mut state = self.state();
            if *state == ConnectionState::Disconnected {
                return;
            }
            *state = ConnectionState::Disconnected;
        }

        self.connection.off(RECEIVE_MESSAGE);
        self.connection.off(CONNECT);
        self.router.leave(&self.connection);
        self.manager.close(&self.connection);
        self.store.close();
        info!(room_id = %self.room_id, connection_id = %self.connection.id(), "thread stopped");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "thread_test.rs"]
mod tests;
