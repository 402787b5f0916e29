//! # lendchat
//!
//! Real-time discussion threads attached to lendable equipment. Each
//! equipment item is a room; a mounted detail view runs one thread that
//! seeds bootstrap history, joins the room over a websocket, shows live
//! messages in arrival order, and sends the user's own messages with an
//! optimistic local append.
//!
//! Layers, bottom up:
//! - [`transport`]: byte-moving links (websocket, in-memory)
//! - [`connection`]: connection lifecycle and per-event handler registry
//! - [`room`]: join/leave signalling for the current room
//! - [`store`]: ordered message sequence with immutable snapshots
//! - [`thread`]: the controller a view drives

pub mod config;
pub mod connection;
pub mod message;
pub mod room;
pub mod store;
pub mod thread;
pub mod transport;

pub use config::{ConfigError, ConnectionConfig, CredentialsMode, ReconnectPolicy};
pub use connection::{CONNECT, Connection, ConnectionManager, DISCONNECT, Handler, Inbound};
pub use message::{Comment, Identity, Message, Sender};
pub use room::RoomRouter;
pub use store::MessageStore;
pub use thread::{ConnectionState, ThreadController, ThreadSession};
pub use transport::{Link, LinkStatus, MemoryTransport, Transport, TransportError, WsTransport};
