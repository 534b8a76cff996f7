//! Session state as reported to hosts.

use std::fmt;
use std::time::Duration;

use crate::identity::Identity;
use crate::wire::Channel;

/// Coarse connection state of the session with one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No session record exists.
    None,
    /// Session exists but is not yet both accepted locally and acknowledged
    /// by the peer.
    Connecting,
    /// Accepted locally and the peer's session id is known.
    Connected,
    /// Session is dead. Close it (or send with auto-restart) to start over.
    Broken,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::None => "none",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Broken => "broken",
        };
        f.write_str(s)
    }
}

/// Why a session died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndReason {
    /// Closed through the local control API.
    ClosedLocally,
    /// The peer sent a teardown for the session.
    ClosedByPeer,
    /// No traffic for longer than the idle timeout.
    Timeout,
    /// The transport reported the peer unreachable.
    PeerLost,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EndReason::ClosedLocally => "closed locally",
            EndReason::ClosedByPeer => "closed by peer",
            EndReason::Timeout => "idle timeout",
            EndReason::PeerLost => "peer lost",
        };
        f.write_str(s)
    }
}

/// Detailed snapshot of one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub remote_identity: Identity,
    pub state: ConnectionState,
    pub end_reason: Option<EndReason>,
    pub local_session_id: u32,
    /// 0 until the peer's session id has been observed.
    pub remote_session_id: u32,
    pub accepted: bool,
    /// Open channels, ascending.
    pub channels: Vec<Channel>,
    /// Messages waiting to be received across all channels.
    pub queued_messages: usize,
    pub age: Duration,
    pub idle: Duration,
}
