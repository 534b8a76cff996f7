//! parley-core: identities, wire vocabulary, state and event types, config.
//! All other Parley crates depend on this one.

pub mod config;
pub mod event;
pub mod identity;
pub mod state;
pub mod wire;

pub use event::SessionEvent;
pub use identity::Identity;
pub use state::{ConnectionState, EndReason, SessionInfo};
pub use wire::{Channel, Envelope, EnvelopeKind, SendFlags};
