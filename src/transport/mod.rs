//! Transports: the byte-moving layer underneath a [`Connection`](crate::Connection).
//!
//! DESIGN
//! ======
//! A [`Transport`] opens one [`Link`] per connection. The link is the
//! outbound half (non-blocking `emit`, `shutdown`); inbound traffic and status
//! changes flow the other way through the [`Inbound`](crate::Inbound) handle
//! the connection hands to the transport at open time.
//!
//! ERROR HANDLING
//! ==============
//! Transport failures never surface to callers of the thread API. They are
//! logged where they happen and show up only as [`LinkStatus`] changes and
//! missing inbound traffic.

pub mod memory;
pub mod ws;

pub use memory::MemoryTransport;
pub use ws::WsTransport;

use frames::Frame;

use crate::config::{ConnectionConfig, CredentialsMode};
use crate::connection::Inbound;

/// Observed state of the underlying link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid handshake request: {0}")]
    Request(String),
    #[error("websocket connect failed: {0}")]
    Connect(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket io failed: {0}")]
    Socket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("no tokio runtime available to drive the link")]
    NoRuntime,
}

/// Outbound half of an open connection.
pub trait Link: Send + Sync {
    /// Queue a frame for sending. Never blocks; `false` means the frame was
    /// dropped because the link is gone.
    fn emit(&self, frame: Frame) -> bool;

    /// Stop the link. Pending frames may still be flushed; nothing is
    /// delivered inbound afterwards.
    fn shutdown(&self);
}

pub trait Transport: Send + Sync {
    /// Start a link for `config`. Must return immediately; connecting happens
    /// in the background and is reported through `inbound`.
    fn open(&self, config: &ConnectionConfig, credentials: CredentialsMode, inbound: Inbound) -> Box<dyn Link>;
}
