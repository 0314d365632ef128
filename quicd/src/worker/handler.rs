//! # Connection Handler
//!
//! One admitted connection: the protocol engine, the TLS session behind it,
//! and the idle deadline.
//!
//! The handler is split in two so the engine can call back into TLS state
//! while the handler drives it:
//!
//! ```text
//! ConnectionHandler
//! ├── engine: E                    (ProtocolEngine)
//! └── handshake: HandshakeDriver   (TransportCallbacks)
//!     ├── tls: T                   (TlsSession + transcript pipes)
//!     ├── rng                      (initial packet number)
//!     └── crypto: Option<CryptoContext>
//! ```
//!
//! `engine.recv(datagram, now, &mut handshake)` borrows the two halves
//! disjointly.

use crate::crypto::{self, CryptoContext};
use crate::error::{Error, Result};
use crate::netio::DatagramSocket;
use crate::tls::{HandshakeStatus, TlsSession};
use bytes::BytesMut;
use quicd_quic::{EngineControl, ProtocolEngine, TransportCallbacks};
use rand::rngs::StdRng;
use rand::Rng;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Largest initial packet number handed to the engine.
const MAX_INITIAL_PKT_NUM: u64 = i32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Handshaking,
    Established,
}

// ============================================================================
// Handshake Driver
// ============================================================================

/// The callback half of a connection.
pub struct HandshakeDriver<T> {
    conn_id: u64,
    peer: SocketAddr,
    tls: T,
    rng: StdRng,
    crypto: Option<CryptoContext>,
    completion_signalled: bool,
    /// Root cause of the last callback failure; the engine only sees a code.
    failure: Option<Error>,
}

impl<T: TlsSession> HandshakeDriver<T> {
    pub fn new(conn_id: u64, peer: SocketAddr, tls: T, rng: StdRng) -> Self {
        Self {
            conn_id,
            peer,
            tls,
            rng,
            crypto: None,
            completion_signalled: false,
            failure: None,
        }
    }

    pub fn tls(&self) -> &T {
        &self.tls
    }

    pub fn crypto(&self) -> Option<&CryptoContext> {
        self.crypto.as_ref()
    }

    /// Take the recorded failure, if any.
    pub fn take_failure(&mut self) -> Option<Error> {
        self.failure.take()
    }

    /// Record `err` and translate it for the engine.
    fn fail(&mut self, err: Error) -> quicd_quic::Error {
        let code = match &err {
            Error::Engine(e) => *e,
            Error::Crypto => quicd_quic::Error::Crypto,
            _ => quicd_quic::Error::CallbackFailure,
        };
        self.failure = Some(err);
        code
    }

    /// One TLS handshake step. Signals completion to the engine once.
    pub fn drive_handshake(&mut self, ctl: &mut dyn EngineControl) -> Result<()> {
        match self.tls.do_handshake() {
            Ok(HandshakeStatus::Complete) => {
                if !self.completion_signalled {
                    self.completion_signalled = true;
                    debug!(conn_id = self.conn_id, peer = %self.peer, "TLS handshake finished");
                    ctl.handshake_completed();
                }
                Ok(())
            }
            Ok(HandshakeStatus::WouldBlock) => Ok(()),
            Err(e) => {
                warn!(conn_id = self.conn_id, peer = %self.peer, error = %e, "TLS handshake failed");
                Err(e)
            }
        }
    }

    fn complete_handshake(&mut self, ctl: &mut dyn EngineControl) -> Result<()> {
        if self.crypto.is_some() {
            return Err(Error::KeyDerivation("keys already installed"));
        }
        let keys = crypto::derive_keys(&self.tls)?;
        crypto::install_keys(&keys, ctl)?;

        info!(
            conn_id = self.conn_id,
            peer = %self.peer,
            prf = ?keys.context.prf,
            aead = ?keys.context.aead,
            "handshake completed"
        );
        self.crypto = Some(keys.context);
        Ok(())
    }

    fn aead(&self) -> Result<crypto::AeadAlgorithm> {
        self.crypto.as_ref().map(|c| c.aead).ok_or(Error::Crypto)
    }
}

impl<T: TlsSession> TransportCallbacks for HandshakeDriver<T> {
    fn send_server_cleartext(
        &mut self,
        ctl: &mut dyn EngineControl,
        pkt_num: Option<&mut u64>,
    ) -> quicd_quic::Result<&[u8]> {
        self.drive_handshake(ctl).map_err(|e| self.fail(e))?;

        if let Some(pn) = pkt_num {
            *pn = self.rng.gen_range(0..=MAX_INITIAL_PKT_NUM);
            if self.tls.transport().outbound.unread().is_empty() {
                debug!(conn_id = self.conn_id, peer = %self.peer, "incomplete ClientHello");
                return Err(self.fail(Error::Handshake("incomplete ClientHello".to_string())));
            }
        }

        Ok(self.tls.transport_mut().outbound.take_unread())
    }

    fn recv_handshake_data(
        &mut self,
        ctl: &mut dyn EngineControl,
        data: &[u8],
    ) -> quicd_quic::Result<()> {
        trace!(conn_id = self.conn_id, len = data.len(), "handshake bytes from client");
        self.tls.transport_mut().inbound.append(data);
        self.drive_handshake(ctl).map_err(|e| self.fail(e))
    }

    fn handshake_completed(&mut self, ctl: &mut dyn EngineControl) -> quicd_quic::Result<()> {
        self.complete_handshake(ctl).map_err(|e| {
            warn!(conn_id = self.conn_id, peer = %self.peer, error = %e, "key installation failed");
            self.fail(e)
        })
    }

    fn encrypt(
        &mut self,
        dest: &mut [u8],
        plaintext: &[u8],
        key: &[u8],
        nonce: &[u8],
        ad: &[u8],
    ) -> quicd_quic::Result<usize> {
        self.aead()
            .and_then(|alg| crypto::boring::seal(alg, key, nonce, ad, plaintext, dest))
            .map_err(|e| self.fail(e))
    }

    fn decrypt(
        &mut self,
        dest: &mut [u8],
        ciphertext: &[u8],
        key: &[u8],
        nonce: &[u8],
        ad: &[u8],
    ) -> quicd_quic::Result<usize> {
        self.aead()
            .and_then(|alg| crypto::boring::open(alg, key, nonce, ad, ciphertext, dest))
            .map_err(|e| self.fail(e))
    }
}

// ============================================================================
// Connection Handler
// ============================================================================

pub struct ConnectionHandler<E, T> {
    peer: SocketAddr,
    conn_id: u64,
    max_pktlen: usize,
    engine: E,
    handshake: HandshakeDriver<T>,
    /// Armed once at admission.
    deadline: Instant,
    send_buf: BytesMut,
}

impl<E: ProtocolEngine, T: TlsSession> ConnectionHandler<E, T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        peer: SocketAddr,
        conn_id: u64,
        max_pktlen: usize,
        engine: E,
        tls: T,
        rng: StdRng,
        now: Instant,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            peer,
            conn_id,
            max_pktlen,
            engine,
            handshake: HandshakeDriver::new(conn_id, peer, tls, rng),
            deadline: now + idle_timeout,
            send_buf: BytesMut::zeroed(max_pktlen),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    pub fn max_pktlen(&self) -> usize {
        self.max_pktlen
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn handshake(&self) -> &HandshakeDriver<T> {
        &self.handshake
    }

    pub fn phase(&self) -> ConnectionPhase {
        if self.handshake.crypto.is_some() {
            ConnectionPhase::Established
        } else {
            ConnectionPhase::Handshaking
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    fn engine_error(&mut self, err: quicd_quic::Error) -> Error {
        self.handshake.take_failure().unwrap_or(Error::Engine(err))
    }

    /// Feed one datagram to the engine, then flush whatever it produced.
    pub fn on_receive<S: DatagramSocket>(
        &mut self,
        datagram: &[u8],
        now: Instant,
        socket: &S,
    ) -> Result<()> {
        if let Err(e) = self.engine.recv(datagram, now, &mut self.handshake) {
            return Err(self.engine_error(e));
        }
        self.drain_and_send(now, socket)
    }

    /// Pull packets from the engine until it has nothing left to send.
    pub fn drain_and_send<S: DatagramSocket>(&mut self, now: Instant, socket: &S) -> Result<()> {
        loop {
            let n = match self.engine.send(&mut self.send_buf, now, &mut self.handshake) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) => return Err(self.engine_error(e)),
            };
            socket.send_to(&self.send_buf[..n], self.peer)?;
            trace!(conn_id = self.conn_id, peer = %self.peer, len = n, "sent datagram");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AeadAlgorithm, Prf};
    use crate::tls::HandshakeTransport;
    use rand::SeedableRng;

    struct CompletedTls {
        transport: HandshakeTransport,
    }

    impl TlsSession for CompletedTls {
        fn transport(&self) -> &HandshakeTransport {
            &self.transport
        }

        fn transport_mut(&mut self) -> &mut HandshakeTransport {
            &mut self.transport
        }

        fn do_handshake(&mut self) -> Result<HandshakeStatus> {
            Ok(HandshakeStatus::Complete)
        }

        fn negotiated_prf(&self) -> Option<Prf> {
            Some(Prf::Sha256)
        }

        fn negotiated_aead(&self) -> Option<AeadAlgorithm> {
            Some(AeadAlgorithm::Aes128Gcm)
        }

        fn export_secret(&self, _label: &str, out: &mut [u8]) -> Result<()> {
            out.fill(7);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingControl {
        completed: usize,
        installs: usize,
    }

    impl EngineControl for CountingControl {
        fn handshake_completed(&mut self) {
            self.completed += 1;
        }

        fn update_tx_keys(&mut self, _key: &[u8], _iv: &[u8]) -> quicd_quic::Result<()> {
            self.installs += 1;
            Ok(())
        }

        fn update_rx_keys(&mut self, _key: &[u8], _iv: &[u8]) -> quicd_quic::Result<()> {
            self.installs += 1;
            Ok(())
        }

        fn set_aead_overhead(&mut self, _overhead: usize) {}
    }

    fn driver() -> HandshakeDriver<CompletedTls> {
        HandshakeDriver::new(
            1,
            "127.0.0.1:4433".parse().unwrap(),
            CompletedTls {
                transport: HandshakeTransport::new(),
            },
            StdRng::seed_from_u64(7),
        )
    }

    #[test]
    fn test_completion_signalled_once() {
        let mut d = driver();
        let mut ctl = CountingControl::default();
        d.drive_handshake(&mut ctl).unwrap();
        d.drive_handshake(&mut ctl).unwrap();
        assert_eq!(ctl.completed, 1);
    }

    #[test]
    fn test_second_completion_is_rejected() {
        let mut d = driver();
        let mut ctl = CountingControl::default();
        TransportCallbacks::handshake_completed(&mut d, &mut ctl).unwrap();
        assert_eq!(ctl.installs, 2);
        assert!(d.crypto().is_some());

        assert_eq!(
            TransportCallbacks::handshake_completed(&mut d, &mut ctl),
            Err(quicd_quic::Error::CallbackFailure)
        );
        assert_eq!(ctl.installs, 2, "keys must not be installed twice");
        assert!(matches!(d.take_failure(), Some(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_empty_flight_with_packet_number_fails() {
        let mut d = driver();
        let mut ctl = CountingControl::default();
        let mut pn = 0u64;
        assert!(d.send_server_cleartext(&mut ctl, Some(&mut pn)).is_err());
        assert!(pn <= MAX_INITIAL_PKT_NUM);
        assert!(matches!(d.take_failure(), Some(Error::Handshake(_))));
    }

    #[test]
    fn test_outbound_tail_returned_once() {
        let mut d = driver();
        let mut ctl = CountingControl::default();
        d.tls.transport_mut().outbound.append(b"server hello");

        let mut pn = 0u64;
        let first = d.send_server_cleartext(&mut ctl, Some(&mut pn)).unwrap().to_vec();
        assert_eq!(first, b"server hello");
        assert!(d.send_server_cleartext(&mut ctl, None).unwrap().is_empty());
    }

    #[test]
    fn test_aead_before_keys_fails() {
        let mut d = driver();
        let mut out = [0u8; 64];
        assert_eq!(
            d.encrypt(&mut out, b"x", &[0; 16], &[0; 12], b""),
            Err(quicd_quic::Error::Crypto)
        );
    }
}
