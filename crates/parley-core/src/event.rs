//! Asynchronous notifications posted by the session layer.

use crate::identity::Identity;
use crate::state::EndReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A peer we have not accepted is sending us data. Posted at most once
    /// per maintenance tick per peer while the data keeps coming.
    SessionRequest { identity: Identity },
    /// An accepted session died for a reason other than a local close.
    SessionFailed { identity: Identity, reason: EndReason },
}

impl SessionEvent {
    pub fn identity(&self) -> Identity {
        match self {
            SessionEvent::SessionRequest { identity } => *identity,
            SessionEvent::SessionFailed { identity, .. } => *identity,
        }
    }
}
