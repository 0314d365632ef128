//! # Server Connection State Machine
//!
//! A compact server engine for the draft handshake. It reassembles the
//! client's stream 0 transcript, packetizes the server's transcript into
//! Server Cleartext packets, and once keys are installed opens 1-RTT packets
//! and confirms the keys with a single protected PING.
//!
//! ## Lifecycle
//!
//! ```text
//! Initial --Client Initial--> Handshaking --completion--> Established
//!    \__________________________any error____________________/--> Closed
//! ```
//!
//! Loss recovery, flow control and application streams are not handled:
//! ACK frames are parsed and ignored, stream data on other streams is
//! dropped.

#![forbid(unsafe_code)]

use super::{EngineControl, ProtocolEngine, TransportCallbacks};
use crate::error::{Error, Result};
use crate::frames::{
    encode_ping, Frame, FrameParser, StreamFrame, HANDSHAKE_STREAM_ID, STREAM_FRAME_OVERHEAD,
};
use crate::packet::{
    self, LongHeader, PacketType, ShortHeader, CHECKSUM_LEN, LONG_HEADER_LEN,
};
use std::time::Instant;
use tracing::{debug, trace};

/// Largest AEAD key accepted by [`EngineControl::update_tx_keys`]
pub const MAX_KEY_LEN: usize = 32;

/// Largest AEAD IV accepted by [`EngineControl::update_tx_keys`]
pub const MAX_IV_LEN: usize = 16;

/// Encoded size of the short header this engine writes
const SHORT_HEADER_LEN: usize = 1 + 8 + 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, nothing received yet
    Initial,
    /// Client Initial seen, transcript flowing
    Handshaking,
    /// Keys installed
    Established,
    /// Terminal
    Closed,
}

// ============================================================================
// Key Material
// ============================================================================

/// Fixed-capacity key and IV with explicit lengths.
struct PacketKey {
    key: [u8; MAX_KEY_LEN],
    key_len: usize,
    iv: [u8; MAX_IV_LEN],
    iv_len: usize,
}

impl PacketKey {
    fn new(key: &[u8], iv: &[u8]) -> Result<Self> {
        if key.is_empty() || key.len() > MAX_KEY_LEN || iv.is_empty() || iv.len() > MAX_IV_LEN {
            return Err(Error::InvalidKey);
        }
        let mut k = Self {
            key: [0; MAX_KEY_LEN],
            key_len: key.len(),
            iv: [0; MAX_IV_LEN],
            iv_len: iv.len(),
        };
        k.key[..key.len()].copy_from_slice(key);
        k.iv[..iv.len()].copy_from_slice(iv);
        Ok(k)
    }

    fn key(&self) -> &[u8] {
        &self.key[..self.key_len]
    }

    fn iv(&self) -> &[u8] {
        &self.iv[..self.iv_len]
    }
}

/// The part of the engine callbacks may touch.
#[derive(Default)]
struct KeyState {
    tx: Option<PacketKey>,
    rx: Option<PacketKey>,
    aead_overhead: usize,
    tls_done: bool,
}

impl EngineControl for KeyState {
    fn handshake_completed(&mut self) {
        self.tls_done = true;
    }

    fn update_tx_keys(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        if self.tx.is_some() {
            return Err(Error::InvalidKey);
        }
        self.tx = Some(PacketKey::new(key, iv)?);
        Ok(())
    }

    fn update_rx_keys(&mut self, key: &[u8], iv: &[u8]) -> Result<()> {
        if self.rx.is_some() {
            return Err(Error::InvalidKey);
        }
        self.rx = Some(PacketKey::new(key, iv)?);
        Ok(())
    }

    fn set_aead_overhead(&mut self, overhead: usize) {
        self.aead_overhead = overhead;
    }
}

// ============================================================================
// Server Connection
// ============================================================================

pub struct ServerConnection {
    conn_id: u64,
    version: u32,
    state: ConnectionState,
    keys: KeyState,

    /// Next packet number to send; assigned by the first Server Cleartext
    next_pkt_num: Option<u64>,
    largest_rx_pkt_num: Option<u64>,

    /// Handshake stream offsets
    rx_offset: u64,
    tx_offset: u64,

    /// Server transcript bytes not yet packetized
    pending: Vec<u8>,

    completion_notified: bool,
    ping_pending: bool,
    last_activity: Option<Instant>,
}

impl ServerConnection {
    pub fn new(conn_id: u64, version: u32) -> Self {
        Self {
            conn_id,
            version,
            state: ConnectionState::Initial,
            keys: KeyState::default(),
            next_pkt_num: None,
            largest_rx_pkt_num: None,
            rx_offset: 0,
            tx_offset: 0,
            pending: Vec::new(),
            completion_notified: false,
            ping_pending: false,
            last_activity: None,
        }
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_handshake_completed(&self) -> bool {
        self.completion_notified
    }

    pub fn aead_overhead(&self) -> usize {
        self.keys.aead_overhead
    }

    pub fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }

    fn close(&mut self, err: Error) -> Error {
        self.state = ConnectionState::Closed;
        err
    }

    fn recv_packet(&mut self, datagram: &[u8], cb: &mut dyn TransportCallbacks) -> Result<()> {
        let first = *datagram.first().ok_or(Error::MalformedPacket)?;
        if packet::is_long_header(first) {
            self.recv_cleartext(datagram, cb)?;
        } else {
            self.recv_protected(datagram, cb)?;
        }
        self.notify_completion(cb)
    }

    fn recv_cleartext(&mut self, datagram: &[u8], cb: &mut dyn TransportCallbacks) -> Result<()> {
        let body = packet::verify_checksum(datagram)?;
        let hd = LongHeader::decode(body)?;
        if hd.version != self.version {
            return Err(Error::UnsupportedVersion);
        }

        match (hd.ty, self.state) {
            (PacketType::ClientInitial, ConnectionState::Initial | ConnectionState::Handshaking) => {}
            (
                PacketType::ClientCleartext,
                ConnectionState::Handshaking | ConnectionState::Established,
            ) => {}
            _ => return Err(Error::ProtocolViolation),
        }

        trace!(
            conn_id = self.conn_id,
            pkt_type = ?hd.ty,
            pkt_num = hd.pkt_num,
            len = datagram.len(),
            "recv packet"
        );
        self.on_packet_number(u64::from(hd.pkt_num));
        if self.state == ConnectionState::Initial {
            self.state = ConnectionState::Handshaking;
        }

        for frame in FrameParser::new(&body[LONG_HEADER_LEN..]) {
            let frame = frame?;
            trace!(conn_id = self.conn_id, frame = frame.name(), "recv frame");
            match frame {
                Frame::Stream(s) if s.stream_id == HANDSHAKE_STREAM_ID => {
                    self.recv_handshake_stream(&s, cb)?
                }
                Frame::Stream(_) => return Err(Error::ProtocolViolation),
                Frame::ConnectionClose { error_code, .. } => {
                    debug!(conn_id = self.conn_id, error_code, "peer closed connection");
                    return Err(Error::ConnectionClosed);
                }
                Frame::Padding { .. } | Frame::Ping | Frame::Ack(_) => {}
            }
        }
        Ok(())
    }

    fn recv_protected(&mut self, datagram: &[u8], cb: &mut dyn TransportCallbacks) -> Result<()> {
        let (hd, hdr_len) = ShortHeader::decode(datagram)?;
        if hd.conn_id.is_some_and(|cid| cid != self.conn_id) {
            trace!(conn_id = self.conn_id, "protected packet for another connection id");
            return Ok(());
        }
        let Some(rx) = self.keys.rx.as_ref() else {
            trace!(conn_id = self.conn_id, "protected packet before keys");
            return Ok(());
        };

        let pkt_num = decode_packet_number(self.largest_rx_pkt_num, hd.pkt_num, hd.pkt_num_len);
        let nonce = packet::packet_nonce(rx.iv(), pkt_num);
        let ciphertext = &datagram[hdr_len..];
        let mut plaintext = vec![0u8; ciphertext.len()];
        let n = cb.decrypt(&mut plaintext, ciphertext, rx.key(), &nonce, &datagram[..hdr_len])?;
        plaintext.truncate(n);

        trace!(
            conn_id = self.conn_id,
            pkt_type = "1RTT",
            pkt_num,
            len = datagram.len(),
            "recv packet"
        );
        self.on_packet_number(pkt_num);

        for frame in FrameParser::new(&plaintext) {
            let frame = frame?;
            trace!(conn_id = self.conn_id, frame = frame.name(), "recv frame");
            match frame {
                Frame::Stream(s) if s.stream_id == HANDSHAKE_STREAM_ID => {
                    self.recv_handshake_stream(&s, cb)?
                }
                Frame::Stream(s) => {
                    trace!(conn_id = self.conn_id, stream_id = s.stream_id, "dropping stream data");
                }
                Frame::ConnectionClose { error_code, .. } => {
                    debug!(conn_id = self.conn_id, error_code, "peer closed connection");
                    return Err(Error::ConnectionClosed);
                }
                Frame::Padding { .. } | Frame::Ping | Frame::Ack(_) => {}
            }
        }
        Ok(())
    }

    /// Deliver the in-order part of a handshake STREAM frame.
    fn recv_handshake_stream(
        &mut self,
        frame: &StreamFrame<'_>,
        cb: &mut dyn TransportCallbacks,
    ) -> Result<()> {
        let end = frame
            .offset
            .checked_add(frame.data.len() as u64)
            .ok_or(Error::FrameEncoding)?;
        if end <= self.rx_offset {
            trace!(conn_id = self.conn_id, offset = frame.offset, "duplicate handshake data");
            return Ok(());
        }
        if frame.offset > self.rx_offset {
            trace!(
                conn_id = self.conn_id,
                offset = frame.offset,
                expected = self.rx_offset,
                "out of order handshake data"
            );
            return Ok(());
        }

        let skip = (self.rx_offset - frame.offset) as usize;
        cb.recv_handshake_data(&mut self.keys, &frame.data[skip..])?;
        self.rx_offset = end;
        Ok(())
    }

    fn on_packet_number(&mut self, pkt_num: u64) {
        if self.largest_rx_pkt_num.map_or(true, |largest| pkt_num > largest) {
            self.largest_rx_pkt_num = Some(pkt_num);
        }
    }

    /// Run the completion callback once the TLS layer has signalled.
    fn notify_completion(&mut self, cb: &mut dyn TransportCallbacks) -> Result<()> {
        if !self.keys.tls_done || self.completion_notified {
            return Ok(());
        }
        self.completion_notified = true;
        debug!(conn_id = self.conn_id, "handshake completed");

        cb.handshake_completed(&mut self.keys)?;
        if self.keys.tx.is_none() || self.keys.rx.is_none() {
            return Err(Error::InvalidKey);
        }
        self.state = ConnectionState::Established;
        self.ping_pending = true;
        Ok(())
    }

    /// Pull whatever the TLS layer has queued into `pending`.
    fn pull_handshake_data(&mut self, cb: &mut dyn TransportCallbacks) -> Result<()> {
        match self.next_pkt_num {
            None => {
                let mut pkt_num = 0;
                let data = cb.send_server_cleartext(&mut self.keys, Some(&mut pkt_num))?;
                self.pending.extend_from_slice(data);
                self.next_pkt_num = Some(pkt_num);
            }
            Some(_) => {
                let data = cb.send_server_cleartext(&mut self.keys, None)?;
                self.pending.extend_from_slice(data);
            }
        }
        Ok(())
    }

    fn write_cleartext(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pkt_num = self.next_pkt_num.ok_or(Error::ProtocolViolation)?;
        let overhead = LONG_HEADER_LEN + STREAM_FRAME_OVERHEAD + CHECKSUM_LEN;
        if buf.len() <= overhead {
            return Err(Error::BufferTooSmall);
        }
        let chunk = self
            .pending
            .len()
            .min(buf.len() - overhead)
            .min(usize::from(u16::MAX));

        let hd = LongHeader {
            ty: PacketType::ServerCleartext,
            conn_id: self.conn_id,
            pkt_num: pkt_num as u32,
            version: self.version,
        };
        let frame = StreamFrame {
            stream_id: HANDSHAKE_STREAM_ID,
            offset: self.tx_offset,
            fin: false,
            data: &self.pending[..chunk],
        };
        hd.encode(buf)?;
        let frame_len = frame.encode(&mut buf[LONG_HEADER_LEN..])?;
        let n = packet::append_checksum(buf, LONG_HEADER_LEN + frame_len)?;

        self.pending.drain(..chunk);
        self.tx_offset += chunk as u64;
        self.next_pkt_num = Some(pkt_num + 1);

        trace!(
            conn_id = self.conn_id,
            pkt_type = ?hd.ty,
            pkt_num,
            len = n,
            "send packet"
        );
        Ok(n)
    }

    fn write_protected_ping(
        &mut self,
        buf: &mut [u8],
        cb: &mut dyn TransportCallbacks,
    ) -> Result<usize> {
        let pkt_num = self.next_pkt_num.ok_or(Error::ProtocolViolation)?;
        let tx = self.keys.tx.as_ref().ok_or(Error::Crypto)?;

        let mut plaintext = [0u8; 1];
        encode_ping(&mut plaintext)?;
        if buf.len() < SHORT_HEADER_LEN + plaintext.len() + self.keys.aead_overhead {
            return Err(Error::BufferTooSmall);
        }

        let hd = ShortHeader {
            conn_id: Some(self.conn_id),
            key_phase: false,
            pkt_num: pkt_num as u32,
            pkt_num_len: 4,
        };
        let hdr_len = hd.encode(buf)?;
        let nonce = packet::packet_nonce(tx.iv(), pkt_num);
        let (header, body) = buf.split_at_mut(hdr_len);
        let n = cb.encrypt(body, &plaintext, tx.key(), &nonce, header)?;

        self.ping_pending = false;
        self.next_pkt_num = Some(pkt_num + 1);

        trace!(conn_id = self.conn_id, pkt_type = "1RTT", pkt_num, len = hdr_len + n, "send packet");
        trace!(conn_id = self.conn_id, frame = "PING", "send frame");
        Ok(hdr_len + n)
    }
}

impl ProtocolEngine for ServerConnection {
    fn recv(
        &mut self,
        datagram: &[u8],
        now: Instant,
        callbacks: &mut dyn TransportCallbacks,
    ) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::ConnectionClosed);
        }
        self.last_activity = Some(now);
        self.recv_packet(datagram, callbacks)
            .map_err(|e| self.close(e))
    }

    fn send(
        &mut self,
        buf: &mut [u8],
        now: Instant,
        callbacks: &mut dyn TransportCallbacks,
    ) -> Result<usize> {
        match self.state {
            ConnectionState::Initial | ConnectionState::Closed => return Ok(0),
            ConnectionState::Handshaking | ConnectionState::Established => {}
        }
        self.last_activity = Some(now);

        // TLS keeps writing after completion (session tickets), so the
        // transcript is pulled on every call.
        self.pull_handshake_data(callbacks)
            .and_then(|_| self.notify_completion(callbacks))
            .map_err(|e| self.close(e))?;

        if !self.pending.is_empty() {
            return self.write_cleartext(buf).map_err(|e| self.close(e));
        }
        if self.ping_pending {
            return self
                .write_protected_ping(buf, callbacks)
                .map_err(|e| self.close(e));
        }
        Ok(0)
    }
}

/// Expand a truncated packet number relative to the largest one received.
fn decode_packet_number(largest: Option<u64>, truncated: u32, len: usize) -> u64 {
    let Some(largest) = largest else {
        return u64::from(truncated);
    };
    let window = 1u64 << (len * 8);
    let half = window / 2;
    let expected = largest + 1;
    let candidate = (expected & !(window - 1)) | u64::from(truncated);

    if candidate + half <= expected {
        candidate + window
    } else if candidate > expected + half && candidate >= window {
        candidate - window
    } else {
        candidate
    }
}

#[cfg(test)]
mod tests {
    use super::decode_packet_number;

    #[test]
    fn test_decode_packet_number() {
        assert_eq!(decode_packet_number(None, 5, 4), 5);
        assert_eq!(decode_packet_number(Some(0xa82f_30ea), 0x9b32, 2), 0xa82f_9b32);
        assert_eq!(decode_packet_number(Some(255), 0x01, 1), 257);
        assert_eq!(decode_packet_number(Some(100), 101, 4), 101);
    }
}
