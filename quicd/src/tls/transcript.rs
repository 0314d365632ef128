//! Handshake transcript pipes.
//!
//! The TLS library wants a byte stream; the engine hands us handshake bytes
//! one packet at a time. A [`TranscriptPipe`] is an append-only buffer with a
//! read cursor. [`HandshakeTransport`] pairs one inbound and one outbound
//! pipe and implements `Read`/`Write` so it can sit under an `SslStream`.
//!
//! "No data yet" is reported as [`io::ErrorKind::WouldBlock`], never as end
//! of stream.

use std::io::{self, Read, Write};

/// Append-only byte buffer with a monotonic read cursor.
#[derive(Debug, Default)]
pub struct TranscriptPipe {
    buf: Vec<u8>,
    cursor: usize,
}

impl TranscriptPipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes appended but not yet consumed.
    pub fn unread(&self) -> &[u8] {
        &self.buf[self.cursor..]
    }

    /// Mark `n` unread bytes as consumed. Clamped to the unread length.
    pub fn consume(&mut self, n: usize) {
        self.cursor += n.min(self.buf.len() - self.cursor);
    }

    /// Return the unread tail and consume it.
    pub fn take_unread(&mut self) -> &[u8] {
        let start = self.cursor;
        self.cursor = self.buf.len();
        &self.buf[start..]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Total bytes ever appended.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// The transport an `SslStream` runs over.
///
/// Reads drain `inbound` (client handshake bytes); writes append to
/// `outbound` (server handshake bytes awaiting packetization).
#[derive(Debug, Default)]
pub struct HandshakeTransport {
    pub inbound: TranscriptPipe,
    pub outbound: TranscriptPipe,
}

impl HandshakeTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Read for HandshakeTransport {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        let unread = self.inbound.unread();
        if unread.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = unread.len().min(out.len());
        out[..n].copy_from_slice(&unread[..n]);
        self.inbound.consume(n);
        Ok(n)
    }
}

impl Write for HandshakeTransport {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.outbound.append(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
