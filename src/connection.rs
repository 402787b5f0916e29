//! Connection lifecycle and per-event handler registry.
//!
//! DESIGN
//! ======
//! [`ConnectionManager`] is an explicit, constructible component (no
//! process-wide socket). It owns at most one live [`Connection`] and hands the
//! same one back from repeated `open` calls until it is closed.
//!
//! Each connection keeps exactly one handler per event name. `on` replaces,
//! it never stacks, so re-mounting a view cannot double-deliver messages.
//!
//! LIFECYCLE
//! =========
//! Inbound delivery runs the handler while holding the registry lock, and
//! `close` takes that same lock after raising the closed flag. Once `close`
//! returns, no handler registered on that connection runs again, even for a
//! frame that was already in flight. Handlers therefore must not call `on`,
//! `off` or `close` on their own connection; `send` is fine.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frames::Frame;
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{ConnectionConfig, CredentialsMode};
use crate::transport::{Link, LinkStatus, Transport, WsTransport};

/// Local event delivered when the link (re)connects. Payload: `{"resumed": bool}`.
pub const CONNECT: &str = "connect";

/// Local event delivered when the link drops.
pub const DISCONNECT: &str = "disconnect";

/// Callback for one event name. Receives the frame payload.
pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

// =============================================================================
// DISPATCH
// =============================================================================

struct Dispatcher {
    connection_id: Uuid,
    closed: AtomicBool,
    handlers: Mutex<HashMap<String, Handler>>,
    status: Mutex<LinkStatus>,
}

impl Dispatcher {
    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Handle a transport uses to push inbound traffic into its connection.
#[derive(Clone)]
pub struct Inbound {
    dispatcher: Arc<Dispatcher>,
}

impl Inbound {
    /// Run the handler registered for `frame.event`, if any.
    ///
    /// Returns `false` when the connection is closed or nothing is listening.
    pub fn deliver(&self, frame: &Frame) -> bool {
        let handlers = self.dispatcher.handlers();
        if self.dispatcher.is_closed() {
            debug!(connection_id = %self.dispatcher.connection_id, event = %frame.event, "dropping frame for closed connection");
            return false;
        }
        let Some(handler) = handlers.get(&frame.event) else {
            debug!(connection_id = %self.dispatcher.connection_id, event = %frame.event, "no handler for event");
            return false;
        };
        handler(&frame.data);
        true
    }

    pub fn set_status(&self, status: LinkStatus) {
        let mut current = self.dispatcher.status.lock().unwrap_or_else(PoisonError::into_inner);
        if self.dispatcher.is_closed() {
            *current = LinkStatus::Disconnected;
        } else {
            *current = status;
        }
    }

    /// Mark the link connected and announce it to the `connect` handler.
    pub fn connected(&self, resumed: bool) {
        self.set_status(LinkStatus::Connected);
        info!(connection_id = %self.dispatcher.connection_id, resumed, "link connected");
        self.deliver(&Frame::new(CONNECT, json!({ "resumed": resumed })));
    }

    /// Mark the link dropped and announce it to the `disconnect` handler.
    pub fn disconnected(&self) {
        self.set_status(LinkStatus::Disconnected);
        info!(connection_id = %self.dispatcher.connection_id, "link disconnected");
        self.deliver(&Frame::new(DISCONNECT, Value::Null));
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.dispatcher.is_closed()
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

struct ConnectionInner {
    dispatcher: Arc<Dispatcher>,
    link: Box<dyn Link>,
}

/// Cheap, cloneable handle to one transport connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    fn open(transport: &dyn Transport, config: &ConnectionConfig, credentials: CredentialsMode) -> Self {
        let dispatcher = Arc::new(Dispatcher {
            connection_id: Uuid::new_v4(),
            closed: AtomicBool::new(false),
            handlers: Mutex::new(HashMap::new()),
            status: Mutex::new(LinkStatus::Connecting),
        });
        let inbound = Inbound { dispatcher: Arc::clone(&dispatcher) };
        let link = transport.open(config, credentials, inbound);
        Self { inner: Arc::new(ConnectionInner { dispatcher, link }) }
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.dispatcher.connection_id
    }

    #[must_use]
    pub fn status(&self) -> LinkStatus {
        *self.inner.dispatcher.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.dispatcher.is_closed()
    }

    /// Fire-and-forget emission of `event` with `payload`.
    pub fn send(&self, event: &str, payload: Value) -> bool {
        self.emit(Frame::new(event, payload))
    }

    /// Fire-and-forget emission of a prepared frame.
    pub fn emit(&self, frame: Frame) -> bool {
        if self.is_closed() {
            debug!(connection_id = %self.id(), event = %frame.event, "send on closed connection ignored");
            return false;
        }
        debug!(connection_id = %self.id(), event = %frame.event, "emit");
        self.inner.link.emit(frame)
    }

    /// Register the single handler for `event`, replacing any previous one.
    pub fn on<F>(&self, event: &str, handler: F)
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let mut handlers = self.inner.dispatcher.handlers();
        if self.is_closed() {
            debug!(connection_id = %self.id(), event, "handler registration on closed connection ignored");
            return;
        }
        if handlers.insert(event.to_owned(), Arc::new(handler)).is_some() {
            debug!(connection_id = %self.id(), event, "replaced existing handler");
        }
    }

    /// Remove the handler for `event`. Returns whether one was registered.
    pub fn off(&self, event: &str) -> bool {
        self.inner.dispatcher.handlers().remove(event).is_some()
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.inner.dispatcher.handlers().len()
    }

    /// Returns `true` only for the call that actually closed the connection.
    fn close(&self) -> bool {
        if self.inner.dispatcher.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Waits out any delivery that is running a handler right now.
        self.inner.dispatcher.handlers().clear();
        *self.inner.dispatcher.status.lock().unwrap_or_else(PoisonError::into_inner) = LinkStatus::Disconnected;
        self.inner.link.shutdown();
        true
    }

    fn same_as(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// =============================================================================
// MANAGER
// =============================================================================

/// Opens and closes the single connection used by one thread.
pub struct ConnectionManager {
    config: ConnectionConfig,
    transport: Arc<dyn Transport>,
    current: Mutex<Option<Connection>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new(config: ConnectionConfig, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport, current: Mutex::new(None) }
    }

    /// Manager backed by the websocket transport.
    #[must_use]
    pub fn websocket(config: ConnectionConfig) -> Self {
        Self::new(config, Arc::new(WsTransport))
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Return the live connection, opening one if there is none.
    ///
    /// Never fails: an unreachable endpoint yields a connection whose link
    /// stays in `Connecting`/`Disconnected` and delivers nothing.
    pub fn open(&self, credentials: CredentialsMode) -> Connection {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = current.as_ref().filter(|c| !c.is_closed()) {
            debug!(connection_id = %conn.id(), "reusing open connection");
            return conn.clone();
        }

        let conn = Connection::open(self.transport.as_ref(), &self.config, credentials);
        info!(connection_id = %conn.id(), endpoint = %self.config.endpoint, ?credentials, "connection opened");
        *current = Some(conn.clone());
        conn
    }

    /// Currently held connection, if it is still open.
    #[must_use]
    pub fn current(&self) -> Option<Connection> {
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.as_ref().filter(|c| !c.is_closed()).cloned()
    }

    /// Close `conn`. After this returns no handler on it runs again.
    /// Closing an already-closed connection is a no-op.
    pub fn close(&self, conn: &Connection) {
        if conn.close() {
            info!(connection_id = %conn.id(), "connection closed");
        }
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| c.same_as(conn)) {
            *current = None;
        }
    }
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
