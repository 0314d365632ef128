//! Zero-copy frame iterator over a decrypted or cleartext payload.

#![forbid(unsafe_code)]

use super::types::*;
use crate::error::{Error, Result};

/// Iterates the frames of a packet payload.
///
/// Yields `Err(Error::FrameEncoding)` once and then stops if a frame is
/// truncated or of an unknown type.
pub struct FrameParser<'a> {
    buf: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> FrameParser<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            failed: false,
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(Error::FrameEncoding)?;
        let bytes = self.buf.get(self.pos..end).ok_or(Error::FrameEncoding)?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_uint(&mut self, n: usize) -> Result<u64> {
        Ok(self
            .take(n)?
            .iter()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn parse_frame(&mut self, ty: u8) -> Result<Frame<'a>> {
        if ty == FRAME_PADDING {
            let run = self.buf[self.pos..]
                .iter()
                .take_while(|b| **b == FRAME_PADDING)
                .count();
            self.pos += run;
            return Ok(Frame::Padding { len: run + 1 });
        }
        if ty == FRAME_PING {
            return Ok(Frame::Ping);
        }
        if ty == FRAME_CONNECTION_CLOSE {
            let error_code = self.read_uint(4)? as u32;
            let reason_len = self.read_uint(2)? as usize;
            let reason = self.take(reason_len)?;
            return Ok(Frame::ConnectionClose { error_code, reason });
        }
        if ty & FRAME_STREAM_MASK == FRAME_STREAM {
            return self.parse_stream(ty);
        }
        if ty & FRAME_ACK_MASK == FRAME_ACK {
            return self.parse_ack(ty);
        }
        Err(Error::FrameEncoding)
    }

    fn parse_stream(&mut self, ty: u8) -> Result<Frame<'a>> {
        let id_len = usize::from((ty >> 3) & 0x03) + 1;
        let offset_len = [0, 2, 4, 8][usize::from((ty >> 1) & 0x03)];

        let stream_id = self.read_uint(id_len)? as u32;
        let offset = if offset_len == 0 {
            0
        } else {
            self.read_uint(offset_len)?
        };
        let data = if ty & STREAM_DATA_LEN_BIT != 0 {
            let len = self.read_uint(2)? as usize;
            self.take(len)?
        } else {
            let rest = self.buf.len() - self.pos;
            self.take(rest)?
        };

        Ok(Frame::Stream(StreamFrame {
            stream_id,
            offset,
            fin: ty & STREAM_FIN_BIT != 0,
            data,
        }))
    }

    fn parse_ack(&mut self, ty: u8) -> Result<Frame<'a>> {
        const FIELD_LEN: [usize; 4] = [1, 2, 4, 6];
        let largest_len = FIELD_LEN[usize::from((ty >> 2) & 0x03)];
        let block_len = FIELD_LEN[usize::from(ty & 0x03)];

        let num_blocks = if ty & 0x10 != 0 {
            self.read_uint(1)? as u8
        } else {
            0
        };
        let num_timestamps = self.read_uint(1)? as u8;
        let largest_acknowledged = self.read_uint(largest_len)?;
        let ack_delay = self.read_uint(2)? as u16;
        let first_ack_block = self.read_uint(block_len)?;

        // gap + block length per additional block
        self.take(usize::from(num_blocks) * (1 + block_len))?;
        if num_timestamps > 0 {
            self.take(1 + 4)?;
            self.take(usize::from(num_timestamps - 1) * (1 + 2))?;
        }

        Ok(Frame::Ack(AckFrame {
            largest_acknowledged,
            ack_delay,
            first_ack_block,
            num_blocks,
            num_timestamps,
        }))
    }
}

impl<'a> Iterator for FrameParser<'a> {
    type Item = Result<Frame<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.buf.len() {
            return None;
        }
        let ty = self.buf[self.pos];
        self.pos += 1;
        let frame = self.parse_frame(ty);
        if frame.is_err() {
            self.failed = true;
        }
        Some(frame)
    }
}
