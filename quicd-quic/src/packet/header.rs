//! # Packet Header Parsing and Serialization
//!
//! Long header (handshake and version negotiation):
//!
//! ```text
//! +-+-+-+-+-+-+-+-+
//! |1|   Type (7)  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Connection ID (64)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                       Packet Number (32)                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         Version (32)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Short header (1-RTT protected) with a 4 byte packet number:
//!
//! ```text
//! +-+-+-+-+-+-+-+-+
//! |0|C|K| Type (5)|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     [Connection ID (64)]                      |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      Packet Number (8/16/32)                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

#![forbid(unsafe_code)]

use crate::error::{Error, Result};

// ============================================================================
// Header Form Constants
// ============================================================================

/// Header Form Bit (most significant bit)
/// 1 = Long Header, 0 = Short Header
pub const HEADER_FORM_BIT: u8 = 0x80;

/// Long header type occupies the low seven bits
pub const LONG_TYPE_MASK: u8 = 0x7f;

/// Connection ID present flag (short header)
pub const SHORT_CONN_ID_BIT: u8 = 0x40;

/// Key Phase Bit (short header)
pub const SHORT_KEY_PHASE_BIT: u8 = 0x20;

/// Short header type occupies the low five bits
pub const SHORT_TYPE_MASK: u8 = 0x1f;

/// Encoded length of a long header
pub const LONG_HEADER_LEN: usize = 17;

// ============================================================================
// Packet Type Enumeration
// ============================================================================

/// Long header packet types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    VersionNegotiation,
    ClientInitial,
    ServerStatelessRetry,
    ServerCleartext,
    ClientCleartext,
    ZeroRttProtected,
    OneRttProtectedK0,
    OneRttProtectedK1,
    PublicReset,
    /// A type this engine does not know. Kept so version-mismatched
    /// headers can still be echoed back.
    Unknown(u8),
}

impl PacketType {
    pub fn from_byte(b: u8) -> Self {
        match b & LONG_TYPE_MASK {
            0x01 => PacketType::VersionNegotiation,
            0x02 => PacketType::ClientInitial,
            0x03 => PacketType::ServerStatelessRetry,
            0x04 => PacketType::ServerCleartext,
            0x05 => PacketType::ClientCleartext,
            0x06 => PacketType::ZeroRttProtected,
            0x07 => PacketType::OneRttProtectedK0,
            0x08 => PacketType::OneRttProtectedK1,
            0x09 => PacketType::PublicReset,
            other => PacketType::Unknown(other),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            PacketType::VersionNegotiation => 0x01,
            PacketType::ClientInitial => 0x02,
            PacketType::ServerStatelessRetry => 0x03,
            PacketType::ServerCleartext => 0x04,
            PacketType::ClientCleartext => 0x05,
            PacketType::ZeroRttProtected => 0x06,
            PacketType::OneRttProtectedK0 => 0x07,
            PacketType::OneRttProtectedK1 => 0x08,
            PacketType::PublicReset => 0x09,
            PacketType::Unknown(b) => b & LONG_TYPE_MASK,
        }
    }
}

/// Returns true if the first byte has the long form bit set.
pub fn is_long_header(first_byte: u8) -> bool {
    first_byte & HEADER_FORM_BIT != 0
}

// ============================================================================
// Long Header
// ============================================================================

/// Decoded long header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LongHeader {
    pub ty: PacketType,
    pub conn_id: u64,
    pub pkt_num: u32,
    pub version: u32,
}

impl LongHeader {
    /// Decode a long header from the start of `buf`.
    ///
    /// Only the layout is validated. Version and type are left to the caller.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < LONG_HEADER_LEN || !is_long_header(buf[0]) {
            return Err(Error::MalformedPacket);
        }

        let conn_id = u64::from_be_bytes(read_array(&buf[1..9])?);
        let pkt_num = u32::from_be_bytes(read_array(&buf[9..13])?);
        let version = u32::from_be_bytes(read_array(&buf[13..17])?);

        Ok(Self {
            ty: PacketType::from_byte(buf[0]),
            conn_id,
            pkt_num,
            version,
        })
    }

    /// Encode into `out`, returning the number of bytes written.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < LONG_HEADER_LEN {
            return Err(Error::BufferTooSmall);
        }

        out[0] = HEADER_FORM_BIT | self.ty.to_byte();
        out[1..9].copy_from_slice(&self.conn_id.to_be_bytes());
        out[9..13].copy_from_slice(&self.pkt_num.to_be_bytes());
        out[13..17].copy_from_slice(&self.version.to_be_bytes());
        Ok(LONG_HEADER_LEN)
    }
}

// ============================================================================
// Short Header
// ============================================================================

/// Decoded short header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortHeader {
    pub conn_id: Option<u64>,
    pub key_phase: bool,
    /// Truncated packet number as carried on the wire
    pub pkt_num: u32,
    /// Number of packet number bytes on the wire (1, 2 or 4)
    pub pkt_num_len: usize,
}

impl ShortHeader {
    /// Decode a short header, returning the header and its encoded length.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize)> {
        let first = *buf.first().ok_or(Error::MalformedPacket)?;
        if is_long_header(first) {
            return Err(Error::MalformedPacket);
        }

        let pkt_num_len = match first & SHORT_TYPE_MASK {
            0x01 => 1,
            0x02 => 2,
            0x03 => 4,
            _ => return Err(Error::MalformedPacket),
        };

        let mut pos = 1;
        let conn_id = if first & SHORT_CONN_ID_BIT != 0 {
            let bytes = buf.get(pos..pos + 8).ok_or(Error::MalformedPacket)?;
            pos += 8;
            Some(u64::from_be_bytes(read_array(bytes)?))
        } else {
            None
        };

        let pn_bytes = buf
            .get(pos..pos + pkt_num_len)
            .ok_or(Error::MalformedPacket)?;
        let pkt_num = pn_bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
        pos += pkt_num_len;

        Ok((
            Self {
                conn_id,
                key_phase: first & SHORT_KEY_PHASE_BIT != 0,
                pkt_num,
                pkt_num_len,
            },
            pos,
        ))
    }

    /// Encode with a 4 byte packet number.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        let len = 1 + if self.conn_id.is_some() { 8 } else { 0 } + 4;
        if out.len() < len {
            return Err(Error::BufferTooSmall);
        }

        let mut first = 0x03;
        if self.key_phase {
            first |= SHORT_KEY_PHASE_BIT;
        }
        let mut pos = 1;
        if let Some(cid) = self.conn_id {
            first |= SHORT_CONN_ID_BIT;
            out[pos..pos + 8].copy_from_slice(&cid.to_be_bytes());
            pos += 8;
        }
        out[0] = first;
        out[pos..pos + 4].copy_from_slice(&self.pkt_num.to_be_bytes());
        Ok(pos + 4)
    }
}

fn read_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| Error::MalformedPacket)
}
