//! Send errors and the status codes hosts report them as.

use parley_core::{Channel, Identity};

use crate::table::TableError;
use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The session exists but is dead and auto-restart was not requested.
    #[error("session with {0} is broken; close it or send with auto-restart")]
    SessionBroken(Identity),

    #[error("{0} is not a valid destination")]
    InvalidIdentity(Identity),

    #[error("channel {channel} exceeds the maximum of {max}")]
    InvalidChannel { channel: Channel, max: Channel },

    #[error("payload of {size} bytes exceeds the maximum of {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<TableError> for SendError {
    fn from(e: TableError) -> Self {
        match e {
            TableError::SessionBroken(identity) => SendError::SessionBroken(identity),
        }
    }
}

/// Abstract result code of a send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    /// Session broken or closed and no restart requested.
    NoConnection,
    /// Bad identity, channel or size.
    InvalidParam,
    /// Transient transport backpressure. Retry later.
    Busy,
}

impl SendError {
    pub fn status(&self) -> Status {
        match self {
            SendError::SessionBroken(_) => Status::NoConnection,
            SendError::InvalidIdentity(_)
            | SendError::InvalidChannel { .. }
            | SendError::PayloadTooLarge { .. } => Status::InvalidParam,
            SendError::Transport(TransportError::Oversize { .. }) => Status::InvalidParam,
            SendError::Transport(TransportError::Busy | TransportError::Io(_)) => Status::Busy,
        }
    }
}

impl From<&Result<(), SendError>> for Status {
    fn from(result: &Result<(), SendError>) -> Self {
        match result {
            Ok(()) => Status::Ok,
            Err(e) => e.status(),
        }
    }
}
