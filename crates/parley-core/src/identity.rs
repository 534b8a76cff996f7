//! Endpoint identities.
//!
//! An [`Identity`] names one endpoint, local or remote. It is opaque to the
//! session layer: only equality, ordering and hashing matter. On the wire and
//! in config files it is written as 16 hex digits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Stable identity of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Identity(u64);

impl Identity {
    /// The invalid identity. Never a valid send target.
    pub const INVALID: Identity = Identity(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Short form for log lines: the low 8 hex digits.
    pub fn short(self) -> String {
        hex::encode(&self.0.to_be_bytes()[4..])
    }
}

impl From<u64> for Identity {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0.to_be_bytes()))
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IdentityError {
    #[error("identity must be 16 hex digits, got {0} characters")]
    BadLength(usize),
    #[error("identity is not valid hex: {0}")]
    BadHex(#[from] hex::FromHexError),
}

impl FromStr for Identity {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.len() != 16 {
            return Err(IdentityError::BadLength(s.len()));
        }
        let mut bytes = [0u8; 8];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(u64::from_be_bytes(bytes)))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        if text.is_empty() {
            return Ok(Identity::INVALID);
        }
        text.parse().map_err(serde::de::Error::custom)
    }
}
