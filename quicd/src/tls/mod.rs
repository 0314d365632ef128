//! # TLS Integration
//!
//! The handshake runs inside the transport: client handshake bytes arrive in
//! stream 0 of cleartext packets, server handshake bytes leave the same way.
//! A [`TlsSession`] runs over a [`HandshakeTransport`], which turns those
//! packet-delivered bytes into the non-blocking byte stream a TLS library
//! expects.
//!
//! Every call is a single step. A step either finishes the handshake or
//! reports [`HandshakeStatus::WouldBlock`]; it never blocks.

pub mod boring;
pub mod transcript;

pub use self::boring::{create_ssl_context, BoringTlsSession};
pub use transcript::{HandshakeTransport, TranscriptPipe};

use crate::crypto::{AeadAlgorithm, Prf};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    Complete,
    /// Needs more client bytes, or produced output to send first
    WouldBlock,
}

/// One server-side TLS 1.3 session.
pub trait TlsSession {
    fn transport(&self) -> &HandshakeTransport;

    fn transport_mut(&mut self) -> &mut HandshakeTransport;

    /// Run one handshake step. Fatal alerts surface as `Err`.
    fn do_handshake(&mut self) -> Result<HandshakeStatus>;

    /// PRF of the negotiated cipher suite, once known.
    fn negotiated_prf(&self) -> Option<Prf>;

    /// AEAD of the negotiated cipher suite, once known.
    fn negotiated_aead(&self) -> Option<AeadAlgorithm>;

    /// Fill `out` from the TLS exporter with `label` and no context.
    fn export_secret(&self, label: &str, out: &mut [u8]) -> Result<()>;
}
