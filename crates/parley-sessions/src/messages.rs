//! The message-session multiplexer: send, receive and session control.
//!
//! [`Messages`] is the single owned context for one local endpoint. Every
//! operation takes `&mut self` and runs to completion; hosts that share it
//! across threads wrap the whole value in one mutex.

use bytes::Bytes;
use parley_core::config::SessionConfig;
use parley_core::{
    Channel, ConnectionState, EndReason, Envelope, EnvelopeKind, Identity, SendFlags,
    SessionInfo,
};

use crate::clock::{Clock, SystemClock};
use crate::error::SendError;
use crate::message::Message;
use crate::queue::Arrivals;
use crate::table::SessionTable;
use crate::transport::{EventSink, Transport, TransportError};

pub struct Messages<T: Transport, E: EventSink> {
    pub(crate) local: Identity,
    pub(crate) config: SessionConfig,
    pub(crate) table: SessionTable,
    pub(crate) transport: T,
    pub(crate) events: E,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) arrivals: Arrivals,
}

impl<T: Transport, E: EventSink> Messages<T, E> {
    pub fn new(local: Identity, config: SessionConfig, transport: T, events: E) -> Self {
        Self {
            local,
            config,
            table: SessionTable::new(),
            transport,
            events,
            clock: Box::new(SystemClock),
            arrivals: Arrivals::default(),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn local_identity(&self) -> Identity {
        self.local
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn table(&self) -> &SessionTable {
        &self.table
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    // ── Send ─────────────────────────────────────────────────────────────────

    /// Send `payload` to `to` on `channel`, creating the session if needed.
    ///
    /// Sending implicitly accepts a pending inbound session from `to`.
    /// `Ok` means the transport took the data, not that the peer got it;
    /// later failures arrive as `SessionFailed` events.
    pub fn send_message(
        &mut self,
        to: Identity,
        payload: &[u8],
        flags: SendFlags,
        channel: Channel,
    ) -> Result<(), SendError> {
        if !to.is_valid() {
            return Err(SendError::InvalidIdentity(to));
        }
        if channel > self.config.max_channel {
            return Err(SendError::InvalidChannel {
                channel,
                max: self.config.max_channel,
            });
        }
        if payload.len() > self.config.max_message_size {
            return Err(SendError::PayloadTooLarge {
                size: payload.len(),
                max: self.config.max_message_size,
            });
        }

        let now = self.clock.now();
        let reliable = flags.is_reliable();
        let (session, created) =
            self.table
                .find_or_create(to, false, flags.auto_restart(), now)?;

        let implicit_accept = !created && !session.is_accepted();
        // Until the peer answers, every send re-announces the session so a
        // lost ConnectionNew does not leave the peer holding a stale id.
        let announce = created || (!implicit_accept && session.remote_session_id() == 0);
        session.accept();
        session.touch(now);
        session.open_channel(channel);
        let session_id = session.local_session_id();
        let sequence = if reliable {
            session.next_send_sequence(channel)
        } else {
            0
        };

        if announce {
            if created {
                tracing::info!(peer = %to, session_id, "session opened");
            }
            self.send_control(to, EnvelopeKind::ConnectionNew, session_id)?;
        } else if implicit_accept {
            tracing::info!(peer = %to, session_id, "session implicitly accepted");
            self.send_control(to, EnvelopeKind::ConnectionAccept, session_id)?;
        }

        let envelope = Envelope::data(
            self.local,
            session_id,
            channel,
            sequence,
            reliable,
            Bytes::copy_from_slice(payload),
        );
        if let Err(e) = self.transport.send(to, envelope) {
            tracing::warn!(peer = %to, channel, error = %e, "send refused by transport");
            return Err(e.into());
        }

        if reliable {
            if let Some(session) = self.table.lookup_mut(to) {
                session.commit_send_sequence(channel, sequence);
            }
        }
        tracing::debug!(peer = %to, channel, reliable, len = payload.len(), "message sent");
        Ok(())
    }

    pub(crate) fn send_control(
        &mut self,
        to: Identity,
        kind: EnvelopeKind,
        session_id: u32,
    ) -> Result<(), TransportError> {
        let envelope = Envelope::control(self.local, kind, session_id);
        self.transport.send(to, envelope).map_err(|e| {
            tracing::warn!(peer = %to, ?kind, error = %e, "control envelope refused by transport");
            e
        })
    }

    // ── Receive ──────────────────────────────────────────────────────────────

    /// Take up to `max_count` messages queued on `channel` from any peer,
    /// oldest arrival first. Per-peer order is always preserved.
    pub fn receive_messages(&mut self, channel: Channel, max_count: usize) -> Vec<Message> {
        let mut out = Vec::new();
        while out.len() < max_count {
            let oldest = self
                .table
                .iter()
                .filter_map(|(identity, session)| {
                    session
                        .queue(channel)
                        .and_then(|q| q.front_arrival())
                        .map(|arrival| (arrival, *identity))
                })
                .min();
            let Some((_, sender)) = oldest else {
                break;
            };
            let Some(queued) = self
                .table
                .lookup_mut(sender)
                .and_then(|s| s.queue_mut(channel))
                .and_then(|q| q.pop_front())
            else {
                break;
            };
            out.push(Message::from_queued(sender, channel, queued));
        }
        out
    }

    // ── Control ──────────────────────────────────────────────────────────────

    /// Accept a session a peer opened with us. Returns false if there is no
    /// live session with `identity`. Accepting twice is a no-op.
    pub fn accept_session(&mut self, identity: Identity) -> bool {
        let Some(session) = self.table.lookup_mut(identity) else {
            return false;
        };
        if session.is_dead() {
            return false;
        }
        if session.is_accepted() {
            return true;
        }
        session.accept();
        let session_id = session.local_session_id();
        tracing::info!(peer = %identity, session_id, "session accepted");
        // The peer learns our id from later data if this is lost.
        let _ = self.send_control(identity, EnvelopeKind::ConnectionAccept, session_id);
        true
    }

    /// Close the session with `identity`, discarding unread data. The record
    /// stays `Broken` until the next maintenance sweep removes it.
    pub fn close_session(&mut self, identity: Identity) -> bool {
        let Some(session) = self.table.lookup_mut(identity) else {
            return false;
        };
        session.clear_channels();
        let newly_dead = session.mark_dead(EndReason::ClosedLocally);
        let session_id = session.local_session_id();
        if newly_dead {
            tracing::info!(peer = %identity, session_id, "session closed");
            let _ = self.send_control(identity, EnvelopeKind::ConnectionEnd, session_id);
        }
        true
    }

    /// Close one channel. Closing the last open channel closes the session.
    pub fn close_channel(&mut self, identity: Identity, channel: Channel) -> bool {
        let Some(session) = self.table.lookup_mut(identity) else {
            return false;
        };
        if !session.close_channel(channel) {
            return false;
        }
        tracing::debug!(peer = %identity, channel, "channel closed");
        if session.channel_count() == 0 {
            self.close_session(identity);
        }
        true
    }

    // ── Query ────────────────────────────────────────────────────────────────

    pub fn get_session_state(&self, identity: Identity) -> (ConnectionState, Option<SessionInfo>) {
        match self.table.lookup(identity) {
            Some(session) => (session.state(), Some(session.info(self.clock.now()))),
            None => (ConnectionState::None, None),
        }
    }

    /// Snapshot of every session record, ordered by identity.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        let now = self.clock.now();
        let mut infos: Vec<SessionInfo> = self
            .table
            .iter()
            .map(|(_, session)| session.info(now))
            .collect();
        infos.sort_by_key(|info| info.remote_identity);
        infos
    }
}
