//! In-process transport for tests and offline embedding.
//!
//! Every `open` creates a numbered link. Outbound frames are recorded per
//! link; inbound frames, drops and reconnects are injected by the owner of
//! the [`MemoryTransport`] handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use frames::Frame;

use super::{Link, LinkStatus, Transport};
use crate::config::{ConnectionConfig, CredentialsMode};
use crate::connection::Inbound;

#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    unreachable: bool,
    links: Vec<LinkRecord>,
}

struct LinkRecord {
    inbound: Inbound,
    cookie: Option<String>,
    sent: Vec<Frame>,
    shut_down: bool,
}

impl MemoryTransport {
    /// Links connect as soon as they are opened.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Links never connect and silently drop everything emitted on them.
    #[must_use]
    pub fn unreachable() -> Self {
        let transport = Self::default();
        transport.lock().unreachable = true;
        transport
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of links opened so far.
    #[must_use]
    pub fn opened(&self) -> usize {
        self.lock().links.len()
    }

    /// Frames emitted on link `index`, in order.
    #[must_use]
    pub fn sent_on(&self, index: usize) -> Vec<Frame> {
        self.lock().links.get(index).map(|l| l.sent.clone()).unwrap_or_default()
    }

    /// Frames emitted on the most recent link.
    #[must_use]
    pub fn sent(&self) -> Vec<Frame> {
        let state = self.lock();
        state.links.last().map(|l| l.sent.clone()).unwrap_or_default()
    }

    /// Cookie presented by link `index` at open time.
    #[must_use]
    pub fn cookie_on(&self, index: usize) -> Option<String> {
        self.lock().links.get(index).and_then(|l| l.cookie.clone())
    }

    #[must_use]
    pub fn is_shut_down(&self, index: usize) -> bool {
        self.lock().links.get(index).is_some_and(|l| l.shut_down)
    }

    /// Push an inbound frame into link `index`.
    ///
    /// Returns whether a handler consumed it.
    pub fn deliver_on(&self, index: usize, frame: &Frame) -> bool {
        // Handlers may emit, which locks the state again.
        let inbound = self.lock().links.get(index).map(|l| l.inbound.clone());
        inbound.is_some_and(|inbound| inbound.deliver(frame))
    }

    /// Push an inbound frame into the most recent link.
    pub fn deliver(&self, frame: &Frame) -> bool {
        let last = self.opened().saturating_sub(1);
        self.deliver_on(last, frame)
    }

    /// Simulate the server dropping link `index`.
    pub fn drop_link(&self, index: usize) {
        let inbound = self.lock().links.get(index).map(|l| l.inbound.clone());
        if let Some(inbound) = inbound {
            inbound.disconnected();
        }
    }

    /// Simulate link `index` coming back after a drop.
    pub fn restore_link(&self, index: usize) {
        let inbound = self.lock().links.get(index).map(|l| l.inbound.clone());
        if let Some(inbound) = inbound {
            inbound.connected(true);
        }
    }
}

impl Transport for MemoryTransport {
    fn open(&self, config: &ConnectionConfig, credentials: CredentialsMode, inbound: Inbound) -> Box<dyn Link> {
        let (index, unreachable) = {
            let mut state = self.lock();
            state.links.push(LinkRecord {
                inbound: inbound.clone(),
                cookie: config.cookie_for(credentials).map(ToOwned::to_owned),
                sent: Vec::new(),
                shut_down: false,
            });
            (state.links.len() - 1, state.unreachable)
        };

        if unreachable {
            inbound.set_status(LinkStatus::Connecting);
        } else {
            inbound.connected(false);
        }

        Box::new(MemoryLink { transport: self.clone(), index })
    }
}

struct MemoryLink {
    transport: MemoryTransport,
    index: usize,
}

impl Link for MemoryLink {
    fn emit(&self, frame: Frame) -> bool {
        let mut state = self.transport.lock();
        if state.unreachable {
            return false;
        }
        match state.links.get_mut(self.index) {
            Some(link) if !link.shut_down => {
                link.sent.push(frame);
                true
            }
            _ => false,
        }
    }

    fn shutdown(&self) {
        if let Some(link) = self.transport.lock().links.get_mut(self.index) {
            link.shut_down = true;
        }
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
