//! Capabilities the session layer is constructed with.
//!
//! Hosts plug in a [`Transport`] that moves envelopes to and from peers and
//! an [`EventSink`] that receives asynchronous session notifications.

use std::collections::VecDeque;

use parley_core::{Envelope, Identity, SessionEvent};

/// Something the transport hands up to the session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Envelope(Envelope),
    /// The transport gave up on a peer (unknown route, link loss).
    PeerLost(Identity),
}

/// Point-to-point datagram delivery addressed by identity.
///
/// `send` must not block. A transport that cannot take the datagram right
/// now returns [`TransportError::Busy`]. Failures discovered later are
/// reported through `poll` as [`Inbound::PeerLost`].
///
/// Envelopes marked reliable must be delivered at most once and in order per
/// (sender, receiver, channel). The session layer re-sequences and drops
/// duplicates on its own, so a transport that falls short degrades to gaps
/// rather than disorder.
pub trait Transport {
    fn send(&mut self, to: Identity, envelope: Envelope) -> Result<(), TransportError>;

    /// Next buffered inbound item, if any. Never blocks.
    fn poll(&mut self) -> Option<Inbound>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is busy")]
    Busy,

    #[error("datagram of {size} bytes exceeds the transport limit of {max}")]
    Oversize { size: usize, max: usize },

    #[error("transport i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Destination for [`SessionEvent`]s. The session layer only enqueues; the
/// host decides when to deliver.
pub trait EventSink {
    fn post(&mut self, event: SessionEvent);
}

impl EventSink for VecDeque<SessionEvent> {
    fn post(&mut self, event: SessionEvent) {
        self.push_back(event);
    }
}

impl EventSink for Vec<SessionEvent> {
    fn post(&mut self, event: SessionEvent) {
        self.push(event);
    }
}
