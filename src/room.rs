//! Room routing: equipment id → `join-room` / `leave-room` on a connection.
//!
//! A router tracks the one room its connection is joined to. Joining a
//! different room leaves the old one first; joining the same room again is a
//! no-op. Neither signal waits for a server reply.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frames::Frame;
use tracing::{debug, info};

use crate::connection::Connection;

#[derive(Clone, Default)]
pub struct RoomRouter {
    joined: Arc<Mutex<Option<String>>>,
}

impl RoomRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.joined.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Room currently joined, if any.
    #[must_use]
    pub fn current(&self) -> Option<String> {
        self.lock().clone()
    }

    /// Emit `join-room` for `room_id`, leaving any other room first.
    ///
    /// Returns `false` when already joined to `room_id`.
    pub fn join(&self, conn: &Connection, room_id: &str) -> bool {
        let mut joined = self.lock();
        if joined.as_deref() == Some(room_id) {
            debug!(connection_id = %conn.id(), room_id, "already joined");
            return false;
        }
        if let Some(previous) = joined.take() {
            info!(connection_id = %conn.id(), room_id = %previous, "leaving room before switch");
            conn.emit(Frame::leave_room(&previous));
        }

        conn.emit(Frame::join_room(room_id));
        info!(connection_id = %conn.id(), room_id, "joined room");
        *joined = Some(room_id.to_owned());
        true
    }

    /// Re-announce the current room, e.g. after the link reconnects.
    pub fn rejoin(&self, conn: &Connection) -> bool {
        let Some(room_id) = self.current() else {
            return false;
        };
        info!(connection_id = %conn.id(), room_id = %room_id, "re-joining room after reconnect");
        conn.emit(Frame::join_room(&room_id))
    }

    /// Best-effort `leave-room` for the current room. Returns the room left.
    pub fn leave(&self, conn: &Connection) -> Option<String> {
        let room_id = self.lock().take()?;
        if conn.emit(Frame::leave_room(&room_id)) {
            info!(connection_id = %conn.id(), room_id = %room_id, "left room");
        } else {
            debug!(connection_id = %conn.id(), room_id = %room_id, "leave-room not sent; link already gone");
        }
        Some(room_id)
    }
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
