//! The maintenance tick: drain the transport, apply inbound envelopes, post
//! session events, and expire idle or dead sessions.

use bytes::Bytes;
use parley_core::{EndReason, Envelope, EnvelopeKind, Identity, SessionEvent};

use crate::messages::Messages;
use crate::queue::Admit;
use crate::transport::{EventSink, Inbound, Transport};

impl<T: Transport, E: EventSink> Messages<T, E> {
    /// Run one maintenance step. Hosts call this periodically, typically from
    /// the same loop that delivers events to the application.
    pub fn run_callbacks(&mut self) {
        self.reap();

        let mut requests: Vec<Identity> = Vec::new();
        while let Some(item) = self.transport.poll() {
            match item {
                Inbound::Envelope(envelope) => self.handle_envelope(envelope, &mut requests),
                Inbound::PeerLost(identity) => self.handle_peer_lost(identity),
            }
        }

        for identity in requests {
            let pending = self
                .table
                .lookup(identity)
                .is_some_and(|s| !s.is_accepted() && !s.is_dead());
            if pending {
                tracing::info!(peer = %identity, "session request");
                self.events.post(SessionEvent::SessionRequest { identity });
            }
        }

        self.expire_idle();
    }

    fn handle_envelope(&mut self, envelope: Envelope, requests: &mut Vec<Identity>) {
        let peer = envelope.sender;
        if !peer.is_valid() || peer == self.local {
            tracing::debug!(peer = %peer, "dropping envelope with bad sender");
            return;
        }

        match envelope.kind {
            EnvelopeKind::ConnectionNew => {
                self.on_connection_new(peer, envelope.session_id, requests)
            }
            EnvelopeKind::ConnectionAccept => {
                self.on_connection_accept(peer, envelope.session_id)
            }
            EnvelopeKind::ConnectionEnd => self.on_connection_end(peer, envelope.session_id),
            EnvelopeKind::Data => self.on_data(envelope, requests),
        }
    }

    fn on_connection_new(&mut self, peer: Identity, remote_sid: u32, requests: &mut Vec<Identity>) {
        let now = self.clock.now();
        // A new remote session id replaces a dead record; a repeat does not.
        let replaces_dead = self
            .table
            .lookup(peer)
            .is_some_and(|s| s.is_dead() && s.remote_session_id() != remote_sid);
        let Ok((session, created)) = self.table.find_or_create(peer, true, replaces_dead, now)
        else {
            tracing::debug!(peer = %peer, "connection request for broken session dropped");
            return;
        };
        session.touch(now);
        if session.bind_remote(remote_sid) {
            tracing::info!(peer = %peer, remote_sid, "peer restarted its session");
        }
        if created {
            tracing::debug!(peer = %peer, remote_sid, "inbound session created");
        }

        if session.is_accepted() {
            let local_sid = session.local_session_id();
            let _ = self.send_control(peer, EnvelopeKind::ConnectionAccept, local_sid);
        } else if !requests.contains(&peer) {
            requests.push(peer);
        }
    }

    fn on_connection_accept(&mut self, peer: Identity, remote_sid: u32) {
        let now = self.clock.now();
        let Some(session) = self.table.lookup_mut(peer) else {
            tracing::debug!(peer = %peer, "accept for unknown session dropped");
            return;
        };
        if session.is_dead() {
            return;
        }
        if session.bind_remote(remote_sid) {
            tracing::info!(peer = %peer, remote_sid, "peer restarted its session");
        }
        session.touch(now);
        tracing::debug!(peer = %peer, remote_sid, "session connected");
    }

    fn on_connection_end(&mut self, peer: Identity, remote_sid: u32) {
        let Some(session) = self.table.lookup_mut(peer) else {
            return;
        };
        let known = session.remote_session_id();
        if known != 0 && known != remote_sid {
            tracing::debug!(peer = %peer, remote_sid, known, "stale end ignored");
            return;
        }
        if !session.mark_dead(EndReason::ClosedByPeer) {
            return;
        }
        tracing::info!(peer = %peer, "session closed by peer");
        if session.is_accepted() {
            self.events.post(SessionEvent::SessionFailed {
                identity: peer,
                reason: EndReason::ClosedByPeer,
            });
        }
    }

    fn on_data(&mut self, envelope: Envelope, requests: &mut Vec<Identity>) {
        let peer = envelope.sender;
        if envelope.channel > self.config.max_channel {
            tracing::warn!(
                peer = %peer,
                channel = envelope.channel,
                max = self.config.max_channel,
                "data on out-of-range channel dropped"
            );
            return;
        }
        let now = self.clock.now();
        let window = self.config.reorder_window;
        let Ok((session, _)) = self.table.find_or_create(peer, true, false, now) else {
            tracing::debug!(peer = %peer, "data for broken session dropped");
            return;
        };

        if session.remote_session_id() == 0 {
            session.bind_remote(envelope.session_id);
        } else if session.remote_session_id() != envelope.session_id {
            tracing::debug!(
                peer = %peer,
                remote_sid = envelope.session_id,
                known = session.remote_session_id(),
                "stale data dropped"
            );
            return;
        }
        session.touch(now);

        let channel = envelope.channel;
        let payload: Bytes = envelope.payload;
        let queue = session.open_channel(channel);
        if envelope.reliable {
            let seq = envelope.sequence;
            match queue.push_reliable(seq, payload, now, &mut self.arrivals, window) {
                Admit::Duplicate => {
                    tracing::debug!(peer = %peer, channel, seq, "duplicate dropped");
                }
                Admit::OutOfRange => {
                    tracing::warn!(peer = %peer, channel, seq, "unusable sequence number dropped");
                }
                Admit::GapSkipped { missing_from, delivered } => {
                    tracing::warn!(
                        peer = %peer,
                        channel,
                        missing_from,
                        delivered,
                        "reorder window overflowed, skipping gap"
                    );
                }
                Admit::Delivered(_) | Admit::Held => {}
            }
        } else {
            queue.push_unreliable(payload, now, &mut self.arrivals);
        }

        if !session.is_accepted() && !requests.contains(&peer) {
            requests.push(peer);
        }
    }

    fn handle_peer_lost(&mut self, peer: Identity) {
        let Some(session) = self.table.lookup_mut(peer) else {
            return;
        };
        if !session.mark_dead(EndReason::PeerLost) {
            return;
        }
        tracing::warn!(peer = %peer, "transport lost peer");
        if session.is_accepted() {
            self.events.post(SessionEvent::SessionFailed {
                identity: peer,
                reason: EndReason::PeerLost,
            });
        }
    }

    /// Forget sessions that were already dead when this tick started and
    /// have nothing left to receive. A session that dies during a tick stays
    /// visible as `Broken` until the next one.
    fn reap(&mut self) {
        let drained: Vec<Identity> = self
            .table
            .iter()
            .filter(|(_, s)| s.is_dead() && !s.has_pending())
            .map(|(identity, _)| *identity)
            .collect();
        for identity in drained {
            self.table.remove(identity);
            tracing::debug!(peer = %identity, "session removed");
        }
    }

    fn expire_idle(&mut self) {
        let now = self.clock.now();
        let idle_timeout = self.config.idle_timeout();
        let mut expired = Vec::new();

        for (identity, session) in self.table.iter_mut() {
            if session.is_dead() {
                continue;
            }
            if now.duration_since(session.last_activity()) > idle_timeout {
                session.mark_dead(EndReason::Timeout);
                expired.push((*identity, session.local_session_id(), session.is_accepted()));
            }
        }

        for (identity, session_id, accepted) in expired {
            tracing::info!(peer = %identity, "session timed out");
            if accepted {
                self.events.post(SessionEvent::SessionFailed {
                    identity,
                    reason: EndReason::Timeout,
                });
            }
            let _ = self.send_control(identity, EnvelopeKind::ConnectionEnd, session_id);
        }
    }
}
