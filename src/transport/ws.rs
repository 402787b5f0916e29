//! WebSocket transport on tokio-tungstenite.
//!
//! DESIGN
//! ======
//! `open` spawns one task per connection and returns immediately. The task
//! connects, then runs a `select!` over three sources until the link ends:
//! - queued outbound frames → text messages on the socket
//! - socket messages → decoded frames → `Inbound::deliver`
//! - the shutdown signal from `Link::shutdown` (or the link being dropped)
//!
//! Frames emitted before the handshake completes wait in the unbounded queue
//! and are flushed once connected. On shutdown the queue is drained before
//! the close frame so a trailing `leave-room` still goes out.
//!
//! RECONNECT
//! =========
//! With reconnect enabled the task retries with exponential backoff plus
//! jitter, reusing the same `Inbound` so the connection's handlers survive.
//! A successful reconnect is announced as `connect` with `resumed: true`.

use std::time::Duration;

use frames::Frame;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::COOKIE;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::{Link, LinkStatus, Transport, TransportError};
use crate::config::{ConnectionConfig, CredentialsMode, ReconnectPolicy};
use crate::connection::Inbound;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Transport that speaks the frame protocol over a websocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

impl Transport for WsTransport {
    fn open(&self, config: &ConnectionConfig, credentials: CredentialsMode, inbound: Inbound) -> Box<dyn Link> {
        let (tx, rx) = mpsc::unbounded_channel::<Frame>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let params = LinkParams {
            endpoint: config.endpoint.clone(),
            cookie: config.cookie_for(credentials).map(ToOwned::to_owned),
            reconnect: config.reconnect,
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(run_link(params, inbound, rx, shutdown_rx));
            }
            Err(_) => {
                warn!(error = %TransportError::NoRuntime, endpoint = %params.endpoint, "websocket link not started");
                inbound.set_status(LinkStatus::Disconnected);
            }
        }

        Box::new(WsLink { tx, shutdown: shutdown_tx })
    }
}

struct WsLink {
    tx: mpsc::UnboundedSender<Frame>,
    shutdown: watch::Sender<bool>,
}

impl Link for WsLink {
    fn emit(&self, frame: Frame) -> bool {
        self.tx.send(frame).is_ok()
    }

    fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }
}

struct LinkParams {
    endpoint: String,
    cookie: Option<String>,
    reconnect: ReconnectPolicy,
}

enum PumpEnd {
    Shutdown,
    PeerClosed,
}

// =============================================================================
// LINK TASK
// =============================================================================

async fn run_link(
    params: LinkParams,
    inbound: Inbound,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    let mut resumed = false;

    loop {
        if *shutdown.borrow() || inbound.is_closed() {
            break;
        }
        attempt = attempt.saturating_add(1);
        inbound.set_status(LinkStatus::Connecting);

        let connected = tokio::select! {
            res = connect(&params.endpoint, params.cookie.as_deref()) => res,
            _ = shutdown.changed() => break,
        };

        match connected {
            Ok(stream) => {
                attempt = 0;
                inbound.connected(resumed);
                resumed = true;

                let outcome = pump(stream, &inbound, &mut outbound, &mut shutdown).await;
                inbound.disconnected();
                match outcome {
                    Ok(PumpEnd::Shutdown) => break,
                    Ok(PumpEnd::PeerClosed) => info!(endpoint = %params.endpoint, "websocket closed by peer"),
                    Err(e) => warn!(error = %e, endpoint = %params.endpoint, "websocket dropped"),
                }
            }
            Err(e) => {
                warn!(error = %e, endpoint = %params.endpoint, attempt, "websocket connect failed");
                inbound.set_status(LinkStatus::Disconnected);
            }
        }

        if !params.reconnect.enabled {
            debug!(endpoint = %params.endpoint, "reconnect disabled; link finished");
            break;
        }

        let delay = with_jitter(params.reconnect.backoff(attempt.max(1)));
        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    inbound.set_status(LinkStatus::Disconnected);
}

async fn connect(endpoint: &str, cookie: Option<&str>) -> Result<WsStream, TransportError> {
    let mut request = endpoint
        .into_client_request()
        .map_err(|e| TransportError::Request(e.to_string()))?;
    if let Some(cookie) = cookie {
        let value = HeaderValue::from_str(cookie).map_err(|e| TransportError::Request(e.to_string()))?;
        request.headers_mut().insert(COOKIE, value);
    }

    let (stream, _) = connect_async(request)
        .await
        .map_err(|e| TransportError::Connect(Box::new(e)))?;
    Ok(stream)
}

async fn pump(
    stream: WsStream,
    inbound: &Inbound,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<PumpEnd, TransportError> {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                drain_and_close(&mut write, outbound).await;
                return Ok(PumpEnd::Shutdown);
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    drain_and_close(&mut write, outbound).await;
                    return Ok(PumpEnd::Shutdown);
                };
                write
                    .send(Message::Text(frames::encode_frame(&frame).into()))
                    .await
                    .map_err(|e| TransportError::Socket(Box::new(e)))?;
            }
            msg = read.next() => {
                match msg {
                    None | Some(Ok(Message::Close(_))) => return Ok(PumpEnd::PeerClosed),
                    Some(Err(e)) => return Err(TransportError::Socket(Box::new(e))),
                    Some(Ok(Message::Text(text))) => dispatch_text(inbound, text.as_str()),
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

fn dispatch_text(inbound: &Inbound, text: &str) {
    match frames::decode_frame(text) {
        Ok(frame) => {
            inbound.deliver(&frame);
        }
        Err(e) => warn!(error = %e, "dropping undecodable inbound frame"),
    }
}

async fn drain_and_close(write: &mut SplitSink<WsStream, Message>, outbound: &mut mpsc::UnboundedReceiver<Frame>) {
    while let Ok(frame) = outbound.try_recv() {
        if let Err(e) = write.send(Message::Text(frames::encode_frame(&frame).into())).await {
            debug!(error = %e, event = %frame.event, "pending frame lost during shutdown");
            return;
        }
    }
    if let Err(e) = write.send(Message::Close(None)).await {
        debug!(error = %e, "close frame not sent");
    }
}

/// Up to 25% extra delay so reconnecting clients do not stampede.
fn with_jitter(base: Duration) -> Duration {
    let max_ms = u64::try_from(base.as_millis() / 4).unwrap_or(0);
    if max_ms == 0 {
        return base;
    }
    base + Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
