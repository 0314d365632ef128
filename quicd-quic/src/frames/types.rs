//! Frame type definitions and encoders.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};

// ============================================================================
// Frame Type Constants
// ============================================================================

pub const FRAME_PADDING: u8 = 0x00;
pub const FRAME_CONNECTION_CLOSE: u8 = 0x02;
pub const FRAME_PING: u8 = 0x07;

/// ACK frames occupy 0xa0..=0xbf (`101NLLMM`)
pub const FRAME_ACK_MASK: u8 = 0xe0;
pub const FRAME_ACK: u8 = 0xa0;

/// STREAM frames occupy 0xc0..=0xff (`11FSSOOD`)
pub const FRAME_STREAM_MASK: u8 = 0xc0;
pub const FRAME_STREAM: u8 = 0xc0;
pub const STREAM_FIN_BIT: u8 = 0x20;
pub const STREAM_DATA_LEN_BIT: u8 = 0x01;

/// The stream that carries the handshake transcript
pub const HANDSHAKE_STREAM_ID: u32 = 0;

/// Encoded size of a STREAM frame header as written by [`StreamFrame::encode`]
/// (type, 4 byte stream id, 8 byte offset, 2 byte length).
pub const STREAM_FRAME_OVERHEAD: usize = 1 + 4 + 8 + 2;

// ============================================================================
// Frame Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// A run of consecutive PADDING bytes
    Padding { len: usize },
    Ping,
    Stream(StreamFrame<'a>),
    Ack(AckFrame),
    ConnectionClose { error_code: u32, reason: &'a [u8] },
}

impl Frame<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Padding { .. } => "PADDING",
            Frame::Ping => "PING",
            Frame::Stream(_) => "STREAM",
            Frame::Ack(_) => "ACK",
            Frame::ConnectionClose { .. } => "CONNECTION_CLOSE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFrame<'a> {
    pub stream_id: u32,
    pub offset: u64,
    pub fin: bool,
    pub data: &'a [u8],
}

impl StreamFrame<'_> {
    /// Encode with a 4 byte stream id, 8 byte offset and explicit length.
    pub fn encode(&self, out: &mut [u8]) -> Result<usize> {
        let len = STREAM_FRAME_OVERHEAD + self.data.len();
        if out.len() < len {
            return Err(Error::BufferTooSmall);
        }
        let data_len = u16::try_from(self.data.len()).map_err(|_| Error::BufferTooSmall)?;

        let mut ty = FRAME_STREAM | 0x18 | 0x06 | STREAM_DATA_LEN_BIT;
        if self.fin {
            ty |= STREAM_FIN_BIT;
        }
        out[0] = ty;
        out[1..5].copy_from_slice(&self.stream_id.to_be_bytes());
        out[5..13].copy_from_slice(&self.offset.to_be_bytes());
        out[13..15].copy_from_slice(&data_len.to_be_bytes());
        out[15..len].copy_from_slice(self.data);
        Ok(len)
    }
}

/// Fields of an ACK frame. The engine does not run loss recovery, so only
/// the summary is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckFrame {
    pub largest_acknowledged: u64,
    pub ack_delay: u16,
    pub first_ack_block: u64,
    pub num_blocks: u8,
    pub num_timestamps: u8,
}

/// Encode a PING frame.
pub fn encode_ping(out: &mut [u8]) -> Result<usize> {
    let slot = out.first_mut().ok_or(Error::BufferTooSmall)?;
    *slot = FRAME_PING;
    Ok(1)
}
