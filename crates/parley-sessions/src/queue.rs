//! Per-(session, channel) inbound queue.
//!
//! Unreliable payloads are queued as they arrive. Reliable payloads carry a
//! sequence number: in-sequence payloads are queued immediately, early ones
//! wait in a bounded reorder buffer, and anything at or below the cursor is a
//! duplicate. The cursor is anchored by the first reliable payload seen.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use bytes::Bytes;

/// Process-wide arrival counter. Orders messages across sessions.
#[derive(Debug, Default)]
pub struct Arrivals(u64);

impl Arrivals {
    pub fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// A payload ready to be received.
#[derive(Debug, Clone)]
pub struct Queued {
    pub arrival: u64,
    pub payload: Bytes,
    pub reliable: bool,
    pub received_at: Instant,
}

/// What happened to a reliable payload on admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admit {
    /// Queued, along with this many total payloads released in order.
    Delivered(usize),
    /// Ahead of the cursor; waiting for the gap to fill.
    Held,
    /// Already delivered or already held.
    Duplicate,
    /// A sequence number no cursor can follow. Nothing was queued.
    OutOfRange,
    /// The reorder buffer overflowed. Sequence numbers from `missing_from`
    /// up to the first held payload were given up on.
    GapSkipped { missing_from: u64, delivered: usize },
}

#[derive(Debug, Default)]
pub struct ChannelQueue {
    ready: VecDeque<Queued>,
    next_reliable: Option<u64>,
    held: BTreeMap<u64, (Bytes, Instant)>,
}

impl ChannelQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_unreliable(&mut self, payload: Bytes, now: Instant, arrivals: &mut Arrivals) {
        self.ready.push_back(Queued {
            arrival: arrivals.next(),
            payload,
            reliable: false,
            received_at: now,
        });
    }

    pub fn push_reliable(
        &mut self,
        sequence: u64,
        payload: Bytes,
        now: Instant,
        arrivals: &mut Arrivals,
        window: usize,
    ) -> Admit {
        let Some(after) = sequence.checked_add(1) else {
            return Admit::OutOfRange;
        };
        let expected = *self.next_reliable.get_or_insert(sequence);

        if sequence < expected || self.held.contains_key(&sequence) {
            return Admit::Duplicate;
        }

        if sequence > expected {
            self.held.insert(sequence, (payload, now));
            if self.held.len() <= window {
                return Admit::Held;
            }
            let Some(first) = self.held.keys().next().copied() else {
                return Admit::Held;
            };
            self.next_reliable = Some(first);
            let delivered = self.release_held(arrivals);
            return Admit::GapSkipped {
                missing_from: expected,
                delivered,
            };
        }

        self.enqueue_reliable(payload, now, arrivals);
        self.next_reliable = Some(after);
        Admit::Delivered(1 + self.release_held(arrivals))
    }

    /// Move every held payload that is now in sequence onto the ready queue.
    fn release_held(&mut self, arrivals: &mut Arrivals) -> usize {
        let mut released = 0;
        while let Some(next) = self.next_reliable {
            let Some((payload, received_at)) = self.held.remove(&next) else {
                break;
            };
            self.enqueue_reliable(payload, received_at, arrivals);
            self.next_reliable = next.checked_add(1);
            released += 1;
        }
        released
    }

    fn enqueue_reliable(&mut self, payload: Bytes, received_at: Instant, arrivals: &mut Arrivals) {
        self.ready.push_back(Queued {
            arrival: arrivals.next(),
            payload,
            reliable: true,
            received_at,
        });
    }

    /// Forget reliable sequencing state. Called when the peer restarts its
    /// session and numbering begins again.
    pub fn reset_sequencing(&mut self) {
        self.next_reliable = None;
        self.held.clear();
    }

    pub fn front_arrival(&self) -> Option<u64> {
        self.ready.front().map(|q| q.arrival)
    }

    pub fn pop_front(&mut self) -> Option<Queued> {
        self.ready.pop_front()
    }

    /// Payloads ready to be received. Held payloads are not counted.
    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }

    pub fn held_len(&self) -> usize {
        self.held.len()
    }
}
