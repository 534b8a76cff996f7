//! Messages handed to the application by `receive_messages`.

use std::time::Instant;

use bytes::Bytes;
use parley_core::{Channel, Identity};

use crate::queue::Queued;

/// One received message. The caller owns it outright; the session layer
/// keeps no reference once it is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: Identity,
    channel: Channel,
    payload: Bytes,
    message_number: u64,
    reliable: bool,
    received_at: Instant,
}

impl Message {
    pub(crate) fn from_queued(sender: Identity, channel: Channel, queued: Queued) -> Self {
        Self {
            sender,
            channel,
            payload: queued.payload,
            message_number: queued.arrival,
            reliable: queued.reliable,
            received_at: queued.received_at,
        }
    }

    pub fn sender(&self) -> Identity {
        self.sender
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Process-wide arrival number. Strictly increasing in receive order.
    pub fn message_number(&self) -> u64 {
        self.message_number
    }

    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Release the message and its buffer.
    pub fn release(self) {}
}
