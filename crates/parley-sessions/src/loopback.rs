//! In-memory transport. Connects any number of session layers inside one
//! process. Used by the integration tests and by hosts embedding several
//! endpoints.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parley_core::{Envelope, Identity};

use crate::transport::{Inbound, Transport, TransportError};

/// Shared mailbox table. Clones refer to the same hub.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    inboxes: Arc<DashMap<Identity, VecDeque<Inbound>>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `identity` and return its transport.
    pub fn endpoint(&self, identity: Identity) -> LoopbackTransport {
        self.inboxes.entry(identity).or_default();
        LoopbackTransport {
            identity,
            hub: self.clone(),
            capacity: None,
            drop_unreliable: false,
        }
    }

    /// Remove `identity` from the hub. Later sends to it report the peer lost.
    pub fn disconnect(&self, identity: Identity) {
        self.inboxes.remove(&identity);
    }

    /// Items waiting in `identity`'s inbox.
    pub fn pending(&self, identity: Identity) -> usize {
        self.inboxes.get(&identity).map(|q| q.len()).unwrap_or(0)
    }

    /// Push an arbitrary item into `to`'s inbox. Returns false if `to` is not
    /// registered.
    pub fn inject(&self, to: Identity, item: Inbound) -> bool {
        match self.inboxes.get_mut(&to) {
            Some(mut inbox) => {
                inbox.push_back(item);
                true
            }
            None => false,
        }
    }
}

/// One endpoint's view of a [`LoopbackHub`].
pub struct LoopbackTransport {
    identity: Identity,
    hub: LoopbackHub,
    capacity: Option<usize>,
    drop_unreliable: bool,
}

impl LoopbackTransport {
    /// Refuse sends with `Busy` while the destination inbox holds `capacity`
    /// items.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Silently discard every unreliable envelope this endpoint sends.
    pub fn drop_unreliable(mut self, drop: bool) -> Self {
        self.drop_unreliable = drop;
        self
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn hub(&self) -> &LoopbackHub {
        &self.hub
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, to: Identity, envelope: Envelope) -> Result<(), TransportError> {
        if self.drop_unreliable && !envelope.reliable {
            return Ok(());
        }

        let delivered = match self.hub.inboxes.get_mut(&to) {
            Some(mut inbox) => {
                if let Some(capacity) = self.capacity {
                    if inbox.len() >= capacity {
                        return Err(TransportError::Busy);
                    }
                }
                inbox.push_back(Inbound::Envelope(envelope));
                true
            }
            None => false,
        };

        if !delivered {
            self.hub.inject(self.identity, Inbound::PeerLost(to));
        }
        Ok(())
    }

    fn poll(&mut self) -> Option<Inbound> {
        self.hub
            .inboxes
            .get_mut(&self.identity)
            .and_then(|mut inbox| inbox.pop_front())
    }
}
