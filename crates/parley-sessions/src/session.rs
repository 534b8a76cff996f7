//! Per-peer session record.

use std::collections::HashMap;
use std::time::Instant;

use parley_core::{Channel, ConnectionState, EndReason, Identity, SessionInfo};

use crate::queue::ChannelQueue;

/// Everything the session layer knows about one remote identity.
///
/// The set of open channels is the key set of the queue map, so a channel is
/// open exactly when it has a (possibly empty) queue.
#[derive(Debug)]
pub struct Session {
    remote_identity: Identity,
    local_session_id: u32,
    /// 0 until the peer's session id has been observed.
    remote_session_id: u32,
    queues: HashMap<Channel, ChannelQueue>,
    /// Last reliable sequence number sent per channel.
    send_sequences: HashMap<Channel, u64>,
    accepted: bool,
    dead: bool,
    end_reason: Option<EndReason>,
    created_at: Instant,
    last_activity: Instant,
}

impl Session {
    pub(crate) fn new(
        remote_identity: Identity,
        local_session_id: u32,
        accepted: bool,
        now: Instant,
    ) -> Self {
        Self {
            remote_identity,
            local_session_id,
            remote_session_id: 0,
            queues: HashMap::new(),
            send_sequences: HashMap::new(),
            accepted,
            dead: false,
            end_reason: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn remote_identity(&self) -> Identity {
        self.remote_identity
    }

    pub fn local_session_id(&self) -> u32 {
        self.local_session_id
    }

    pub fn remote_session_id(&self) -> u32 {
        self.remote_session_id
    }

    pub fn is_accepted(&self) -> bool {
        self.accepted
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    pub(crate) fn accept(&mut self) {
        self.accepted = true;
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    /// Record the peer's session id. Returns true when it replaces a
    /// different, previously known id. The peer restarted its session, so
    /// sequencing in both directions starts over.
    pub(crate) fn bind_remote(&mut self, remote_session_id: u32) -> bool {
        if self.remote_session_id == remote_session_id {
            return false;
        }
        let restarted = self.remote_session_id != 0;
        self.remote_session_id = remote_session_id;
        if restarted {
            for queue in self.queues.values_mut() {
                queue.reset_sequencing();
            }
            self.send_sequences.clear();
        }
        restarted
    }

    /// Mark the session dead. Returns false if it already was.
    pub(crate) fn mark_dead(&mut self, reason: EndReason) -> bool {
        if self.dead {
            return false;
        }
        self.dead = true;
        self.end_reason = Some(reason);
        true
    }

    // ── Channels ─────────────────────────────────────────────────────────────

    /// Open `channel` if needed and return its queue.
    pub(crate) fn open_channel(&mut self, channel: Channel) -> &mut ChannelQueue {
        self.queues.entry(channel).or_default()
    }

    /// Drop one channel and anything queued on it. Outbound numbering on the
    /// channel carries on, since the peer's cursor for it is unaffected.
    pub(crate) fn close_channel(&mut self, channel: Channel) -> bool {
        self.queues.remove(&channel).is_some()
    }

    /// Drop every channel and all queued data.
    pub(crate) fn clear_channels(&mut self) {
        self.queues.clear();
        self.send_sequences.clear();
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.queues.contains_key(&channel)
    }

    pub fn channel_count(&self) -> usize {
        self.queues.len()
    }

    /// Open channels, ascending.
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels: Vec<Channel> = self.queues.keys().copied().collect();
        channels.sort_unstable();
        channels
    }

    pub(crate) fn queue(&self, channel: Channel) -> Option<&ChannelQueue> {
        self.queues.get(&channel)
    }

    pub(crate) fn queue_mut(&mut self, channel: Channel) -> Option<&mut ChannelQueue> {
        self.queues.get_mut(&channel)
    }

    /// Messages waiting to be received across all channels.
    pub fn queued_messages(&self) -> usize {
        self.queues.values().map(ChannelQueue::len).sum()
    }

    pub fn has_pending(&self) -> bool {
        self.queues.values().any(|q| !q.is_empty())
    }

    // ── Outbound sequencing ──────────────────────────────────────────────────

    /// Sequence number the next reliable send on `channel` will carry.
    pub(crate) fn next_send_sequence(&self, channel: Channel) -> u64 {
        self.send_sequences.get(&channel).copied().unwrap_or(0) + 1
    }

    /// Record that `sequence` was handed to the transport.
    pub(crate) fn commit_send_sequence(&mut self, channel: Channel, sequence: u64) {
        self.send_sequences.insert(channel, sequence);
    }

    // ── Reporting ────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        if self.dead {
            ConnectionState::Broken
        } else if self.accepted && self.remote_session_id != 0 {
            ConnectionState::Connected
        } else {
            ConnectionState::Connecting
        }
    }

    pub fn info(&self, now: Instant) -> SessionInfo {
        SessionInfo {
            remote_identity: self.remote_identity,
            state: self.state(),
            end_reason: self.end_reason,
            local_session_id: self.local_session_id,
            remote_session_id: self.remote_session_id,
            accepted: self.accepted,
            channels: self.channels(),
            queued_messages: self.queued_messages(),
            age: now.duration_since(self.created_at),
            idle: now.duration_since(self.last_activity),
        }
    }
}
