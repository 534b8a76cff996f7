//! parley-sessions: the message-session multiplexer.
//!
//! A [`Messages`] value owns every session this endpoint has with remote
//! peers. Hosts construct it with a [`Transport`] and an [`EventSink`], call
//! the send/receive/control methods, and drive it with
//! [`Messages::run_callbacks`].

pub mod clock;
pub mod error;
pub mod loopback;
mod maintenance;
pub mod message;
pub mod messages;
pub mod queue;
pub mod session;
pub mod table;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{SendError, Status};
pub use loopback::{LoopbackHub, LoopbackTransport};
pub use message::Message;
pub use messages::Messages;
pub use session::Session;
pub use table::{SessionTable, TableError};
pub use transport::{EventSink, Inbound, Transport, TransportError};
