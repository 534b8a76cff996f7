//! The session table, one record per remote identity.

use std::collections::hash_map::{Entry, HashMap};
use std::time::Instant;

use parley_core::Identity;

use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("session with {0} is broken")]
    SessionBroken(Identity),
}

/// Owns every [`Session`], keyed by remote identity.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<Identity, Session>,
    /// Last local session id handed out. Ids are never reused.
    last_session_id: u32,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live session with `identity`, creating one if there is
    /// none. A dead session is replaced only when `allow_restart` is set.
    ///
    /// New sessions start accepted when locally originated and unaccepted when
    /// created by inbound traffic. The flag in the result is true when a
    /// session was created.
    pub fn find_or_create(
        &mut self,
        identity: Identity,
        is_inbound: bool,
        allow_restart: bool,
        now: Instant,
    ) -> Result<(&mut Session, bool), TableError> {
        match self.sessions.entry(identity) {
            Entry::Occupied(entry) => {
                if !entry.get().is_dead() {
                    return Ok((entry.into_mut(), false));
                }
                if !allow_restart {
                    return Err(TableError::SessionBroken(identity));
                }
                let id = next_session_id(&mut self.last_session_id);
                let session = entry.into_mut();
                *session = Session::new(identity, id, !is_inbound, now);
                Ok((session, true))
            }
            Entry::Vacant(entry) => {
                let id = next_session_id(&mut self.last_session_id);
                Ok((entry.insert(Session::new(identity, id, !is_inbound, now)), true))
            }
        }
    }

    pub fn lookup(&self, identity: Identity) -> Option<&Session> {
        self.sessions.get(&identity)
    }

    pub(crate) fn lookup_mut(&mut self, identity: Identity) -> Option<&mut Session> {
        self.sessions.get_mut(&identity)
    }

    pub fn remove(&mut self, identity: Identity) -> Option<Session> {
        self.sessions.remove(&identity)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &Session)> {
        self.sessions.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&Identity, &mut Session)> {
        self.sessions.iter_mut()
    }
}

fn next_session_id(last: &mut u32) -> u32 {
    *last = last.wrapping_add(1).max(1);
    *last
}
