//! Parley wire vocabulary: envelopes exchanged between peers.
//!
//! The session layer speaks in [`Envelope`] values and never touches bytes.
//! Transports that need a byte encoding (the UDP transport in `parleyd`)
//! use [`EnvelopeHeader`] followed by the raw payload.
//!
//! The header is #[repr(C, packed)] with zerocopy derives, multi-byte fields
//! stored little-endian. There is no unsafe code in this module.

use std::ops::{BitOr, BitOrAssign};

use bytes::Bytes;
use static_assertions::assert_eq_size;
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::identity::Identity;

/// Application routing tag multiplexing logical streams over one session.
pub type Channel = u32;

// ── Send flags ───────────────────────────────────────────────────────────────

/// Per-send delivery options. Bit values match the classic networking API so
/// hosts can pass integers straight through [`SendFlags::from_bits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct SendFlags(u32);

impl SendFlags {
    /// Best effort. May drop, duplicate or reorder.
    pub const UNRELIABLE: SendFlags = SendFlags(0);
    pub const NO_NAGLE: SendFlags = SendFlags(0x01);
    pub const NO_DELAY: SendFlags = SendFlags(0x04);
    /// Exactly-once, in order within a channel.
    pub const RELIABLE: SendFlags = SendFlags(0x08);
    pub const USE_CURRENT_THREAD: SendFlags = SendFlags(0x10);
    /// Replace a broken session instead of failing with `NoConnection`.
    pub const AUTO_RESTART_BROKEN_SESSION: SendFlags = SendFlags(0x20);

    const KNOWN: u32 = 0x01 | 0x04 | 0x08 | 0x10 | 0x20;

    pub fn from_bits(bits: u32) -> Result<Self, WireError> {
        if bits & !Self::KNOWN != 0 {
            return Err(WireError::UnknownSendFlags(bits & !Self::KNOWN));
        }
        Ok(Self(bits))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: SendFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_reliable(self) -> bool {
        self.contains(Self::RELIABLE)
    }

    pub fn auto_restart(self) -> bool {
        self.contains(Self::AUTO_RESTART_BROKEN_SESSION)
    }
}

impl BitOr for SendFlags {
    type Output = SendFlags;

    fn bitor(self, rhs: SendFlags) -> SendFlags {
        SendFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for SendFlags {
    fn bitor_assign(&mut self, rhs: SendFlags) {
        self.0 |= rhs.0;
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// What an envelope means to the receiving session layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EnvelopeKind {
    /// Sender created a session with us. `session_id` is the sender's id.
    ConnectionNew = 0x01,
    /// Sender accepted our session.
    ConnectionAccept = 0x02,
    /// Sender tore its session down.
    ConnectionEnd = 0x03,
    /// Application payload.
    Data = 0x04,
}

impl TryFrom<u8> for EnvelopeKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(EnvelopeKind::ConnectionNew),
            0x02 => Ok(EnvelopeKind::ConnectionAccept),
            0x03 => Ok(EnvelopeKind::ConnectionEnd),
            0x04 => Ok(EnvelopeKind::Data),
            other => Err(WireError::UnknownKind(other)),
        }
    }
}

impl From<EnvelopeKind> for u8 {
    fn from(k: EnvelopeKind) -> u8 {
        k as u8
    }
}

/// One datagram between two session layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Originating endpoint. Filled in by the sending session layer.
    pub sender: Identity,
    pub kind: EnvelopeKind,
    /// The sender's local session id.
    pub session_id: u32,
    pub channel: Channel,
    /// Per-(session, channel) reliable sequence number. 0 when unreliable.
    pub sequence: u64,
    pub reliable: bool,
    pub payload: Bytes,
}

impl Envelope {
    /// A handshake/teardown envelope. Always sent reliably.
    pub fn control(sender: Identity, kind: EnvelopeKind, session_id: u32) -> Self {
        Self {
            sender,
            kind,
            session_id,
            channel: 0,
            sequence: 0,
            reliable: true,
            payload: Bytes::new(),
        }
    }

    pub fn data(
        sender: Identity,
        session_id: u32,
        channel: Channel,
        sequence: u64,
        reliable: bool,
        payload: Bytes,
    ) -> Self {
        Self {
            sender,
            kind: EnvelopeKind::Data,
            session_id,
            channel,
            sequence,
            reliable,
            payload,
        }
    }

    /// Encode as header + payload.
    pub fn to_datagram(&self) -> Result<Vec<u8>, WireError> {
        let length = u32::try_from(self.payload.len())
            .map_err(|_| WireError::PayloadTooLarge(self.payload.len()))?;
        let header = EnvelopeHeader {
            sender: self.sender.raw().to_le(),
            sequence: self.sequence.to_le(),
            session_id: self.session_id.to_le(),
            channel: self.channel.to_le(),
            length: length.to_le(),
            kind: self.kind.into(),
            flags: if self.reliable { FLAG_RELIABLE } else { 0 },
            version: HEADER_VERSION,
            reserved: 0,
        };
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decode a datagram produced by [`Envelope::to_datagram`].
    pub fn from_datagram(bytes: &[u8]) -> Result<Self, WireError> {
        let header = EnvelopeHeader::read_from_prefix(bytes)
            .ok_or(WireError::Truncated(bytes.len()))?;

        let version = header.version;
        if version != HEADER_VERSION {
            return Err(WireError::UnknownVersion(version));
        }
        let flags = header.flags;
        if flags & !FLAG_RELIABLE != 0 {
            return Err(WireError::ReservedFlagsSet(flags));
        }
        let kind = EnvelopeKind::try_from(header.kind)?;

        let length = u32::from_le(header.length) as usize;
        let body = &bytes[HEADER_LEN..];
        if body.len() != length {
            return Err(WireError::LengthMismatch {
                declared: length,
                actual: body.len(),
            });
        }

        Ok(Self {
            sender: Identity::new(u64::from_le(header.sender)),
            kind,
            session_id: u32::from_le(header.session_id),
            channel: u32::from_le(header.channel),
            sequence: u64::from_le(header.sequence),
            reliable: flags & FLAG_RELIABLE != 0,
            payload: Bytes::copy_from_slice(body),
        })
    }
}

// ── Datagram header ──────────────────────────────────────────────────────────

/// Fixed header preceding every encoded envelope.
///
/// Wire size: 32 bytes.
#[derive(Debug, Clone, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
pub struct EnvelopeHeader {
    /// Sender identity.
    pub sender: u64,
    /// Reliable sequence number, 0 for unreliable and control envelopes.
    pub sequence: u64,
    /// Sender's local session id.
    pub session_id: u32,
    pub channel: u32,
    /// Payload length in bytes, not including this header.
    pub length: u32,
    /// [`EnvelopeKind`] discriminant.
    pub kind: u8,
    /// Bit flags:
    ///   bit    0: reliable
    ///   bits 1-7: reserved, must be zero
    pub flags: u8,
    /// Header version. Currently 0x01.
    pub version: u8,
    pub reserved: u8,
}

assert_eq_size!(EnvelopeHeader, [u8; 32]);

// ── Constants ─────────────────────────────────────────────────────────────────

pub const HEADER_LEN: usize = 32;

pub const HEADER_VERSION: u8 = 0x01;

const FLAG_RELIABLE: u8 = 0x01;

/// Largest payload a single send may carry.
pub const MAX_MESSAGE_SIZE: usize = 512 * 1024;

/// Sessions with no traffic for this long are timed out.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 180;

/// Highest channel number accepted by default.
pub const DEFAULT_MAX_CHANNEL: Channel = 65535;

/// Early reliable arrivals held per channel before a gap is skipped.
pub const DEFAULT_REORDER_WINDOW: usize = 64;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    #[error("unknown envelope kind: 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unknown header version: 0x{0:02x}")]
    UnknownVersion(u8),

    #[error("reserved flags are non-zero: 0x{0:02x}")]
    ReservedFlagsSet(u8),

    #[error("unknown send flag bits: 0x{0:x}")]
    UnknownSendFlags(u32),

    #[error("datagram of {0} bytes is shorter than the header")]
    Truncated(usize),

    #[error("header declares {declared} payload bytes, datagram carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload length {0} does not fit the header")]
    PayloadTooLarge(usize),
}

// ── Tests ─────────────────────────────────────────────────────────────────────
