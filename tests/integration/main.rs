//! Parley integration test harness.
//!
//! Every test builds two or more session layers wired together through an
//! in-memory `LoopbackHub` and driven by a shared `ManualClock`, so timing
//! is deterministic and no sockets are involved.
//!
//!   cargo test --test integration

use std::time::Duration;

use anyhow::{bail, Result};
use parley_core::config::SessionConfig;
use parley_core::{Channel, ConnectionState, Identity, SendFlags, SessionEvent};
use parley_sessions::{LoopbackHub, LoopbackTransport, ManualClock, Message, Messages};

mod failures;
mod messaging;

// ── Harness ───────────────────────────────────────────────────────────────────

pub type Endpoint = Messages<LoopbackTransport, Vec<SessionEvent>>;

/// A set of endpoints on one hub sharing one clock.
pub struct Net {
    pub hub: LoopbackHub,
    pub clock: ManualClock,
    config: SessionConfig,
}

impl Net {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Self {
            hub: LoopbackHub::new(),
            clock: ManualClock::new(),
            config,
        }
    }

    pub fn node(&self, raw: u64) -> Endpoint {
        self.node_with(raw, |t| t)
    }

    /// Build an endpoint, letting the caller adjust its transport first.
    pub fn node_with(
        &self,
        raw: u64,
        adjust: impl FnOnce(LoopbackTransport) -> LoopbackTransport,
    ) -> Endpoint {
        let identity = Identity::new(raw);
        Messages::new(
            identity,
            self.config.clone(),
            adjust(self.hub.endpoint(identity)),
            Vec::new(),
        )
        .with_clock(self.clock.clone())
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

/// Run one maintenance tick on every endpoint, in order.
pub fn tick(nodes: &mut [&mut Endpoint]) {
    for node in nodes.iter_mut() {
        node.run_callbacks();
    }
}

/// Payloads of every message waiting on `channel`.
pub fn drain(node: &mut Endpoint, channel: Channel) -> Vec<Vec<u8>> {
    node.receive_messages(channel, usize::MAX)
        .into_iter()
        .map(|m| m.payload().to_vec())
        .collect()
}

pub fn send_all(
    from: &mut Endpoint,
    to: Identity,
    payloads: &[&str],
    channel: Channel,
) -> Result<()> {
    for p in payloads {
        from.send_message(to, p.as_bytes(), SendFlags::RELIABLE, channel)?;
    }
    Ok(())
}

pub fn state(node: &Endpoint, peer: Identity) -> ConnectionState {
    node.get_session_state(peer).0
}

pub fn take_events(node: &mut Endpoint) -> Vec<SessionEvent> {
    std::mem::take(node.events_mut())
}

/// Bring A and B to `Connected` on both sides.
pub fn connect(a: &mut Endpoint, b: &mut Endpoint) -> Result<()> {
    let b_id = b.local_identity();
    let a_id = a.local_identity();
    a.send_message(b_id, b"open", SendFlags::RELIABLE, 0)?;
    b.run_callbacks();
    if !b.accept_session(a_id) {
        bail!("B has no session with A to accept");
    }
    a.run_callbacks();
    drain(b, 0);
    take_events(a);
    take_events(b);

    let connected = state(a, b_id) == ConnectionState::Connected
        && state(b, a_id) == ConnectionState::Connected;
    if !connected {
        bail!(
            "handshake incomplete: A sees {}, B sees {}",
            state(a, b_id),
            state(b, a_id)
        );
    }
    Ok(())
}

pub fn texts(messages: &[Message]) -> Vec<String> {
    messages
        .iter()
        .map(|m| String::from_utf8_lossy(m.payload()).into_owned())
        .collect()
}
