//! # Connection Dispatcher
//!
//! Demultiplexes datagrams from one unconnected UDP socket onto per-peer
//! [`ConnectionHandler`]s.
//!
//! ## Admission
//!
//! A datagram from an unknown peer is checked in order:
//!
//! 1. shorter than the address family's packet floor: dropped
//! 2. not a well-formed long header: dropped
//! 3. unsupported version: Version Negotiation reply, no state
//! 4. not a Client Initial: dropped
//! 5. otherwise a handler is built and fed the datagram; it enters the
//!    table only if that first receive succeeds
//!
//! ## Teardown
//!
//! Handlers leave the table on a fatal error or when their idle deadline
//! passes. Removal drops the handler, its engine and its TLS session
//! together.

use super::handler::ConnectionHandler;
use super::session::SessionFactory;
use super::version_negotiation::send_version_negotiation;
use crate::netio::DatagramSocket;
use crate::runtime::Clock;
use quicd_quic::packet::{self, Accept, PacketType, MAX_PKTLEN_IPV4, MAX_PKTLEN_IPV6};
use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Table key: the peer's numeric address as `[host]:port`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey(String);

impl From<SocketAddr> for ConnectionKey {
    fn from(peer: SocketAddr) -> Self {
        ConnectionKey(format!("[{}]:{}", peer.ip(), peer.port()))
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Smallest acceptable Client Initial datagram from `peer`.
pub fn min_initial_len(peer: SocketAddr) -> usize {
    match peer {
        SocketAddr::V4(_) => MAX_PKTLEN_IPV4,
        SocketAddr::V6(_) => MAX_PKTLEN_IPV6,
    }
}

type Handler<F> = ConnectionHandler<<F as SessionFactory>::Engine, <F as SessionFactory>::Tls>;

pub struct ConnectionDispatcher<S, F: SessionFactory> {
    socket: S,
    factory: F,
    connections: HashMap<ConnectionKey, Handler<F>>,
    clock: Box<dyn Clock>,
    rng: Box<dyn RngCore>,
    idle_timeout: Duration,
}

impl<S: DatagramSocket, F: SessionFactory> ConnectionDispatcher<S, F> {
    pub fn new(
        socket: S,
        factory: F,
        clock: Box<dyn Clock>,
        rng: Box<dyn RngCore>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            socket,
            factory,
            connections: HashMap::new(),
            clock,
            rng,
            idle_timeout,
        }
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn handler(&self, peer: SocketAddr) -> Option<&Handler<F>> {
        self.connections.get(&ConnectionKey::from(peer))
    }

    /// Route one inbound datagram.
    pub fn on_datagram(&mut self, datagram: &[u8], peer: SocketAddr) {
        let now = self.clock.now();
        let key = ConnectionKey::from(peer);

        if let Some(handler) = self.connections.get_mut(&key) {
            if let Err(e) = handler.on_receive(datagram, now, &self.socket) {
                warn!(
                    %peer,
                    conn_id = handler.conn_id(),
                    error = %e,
                    "closing connection"
                );
                self.connections.remove(&key);
            }
            return;
        }

        self.admit(datagram, peer, key, now);
    }

    fn admit(&mut self, datagram: &[u8], peer: SocketAddr, key: ConnectionKey, now: Instant) {
        let min_len = min_initial_len(peer);
        if datagram.len() < min_len {
            debug!(%peer, len = datagram.len(), min_len, "dropping short datagram from unknown peer");
            return;
        }

        let hd = match packet::accept(datagram) {
            Accept::Malformed => {
                debug!(%peer, len = datagram.len(), "dropping malformed datagram");
                return;
            }
            Accept::VersionMismatch(hd) => {
                send_version_negotiation(&self.socket, &hd, peer);
                return;
            }
            Accept::Recognized(hd) => hd,
        };

        if hd.ty != PacketType::ClientInitial {
            debug!(%peer, pkt_type = ?hd.ty, "dropping non-initial packet from unknown peer");
            return;
        }

        let conn_id: u64 = self.rng.gen();
        let tls = match self.factory.new_tls() {
            Ok(tls) => tls,
            Err(e) => {
                warn!(%peer, error = %e, "failed to create TLS session");
                return;
            }
        };
        let rng = match StdRng::from_rng(&mut self.rng) {
            Ok(rng) => rng,
            Err(e) => {
                warn!(%peer, error = %e, "failed to seed connection rng");
                return;
            }
        };
        let engine = self.factory.new_engine(conn_id, hd.version);

        let mut handler = ConnectionHandler::new(
            peer,
            conn_id,
            min_len,
            engine,
            tls,
            rng,
            now,
            self.idle_timeout,
        );

        match handler.on_receive(datagram, now, &self.socket) {
            Ok(()) => {
                info!(%peer, conn_id, "accepted connection");
                self.connections.insert(key, handler);
            }
            Err(e) => warn!(%peer, conn_id, error = %e, "connection admission failed"),
        }
    }

    /// Destroy every handler whose idle deadline has passed.
    ///
    /// Returns the number of connections removed.
    pub fn poll_timeouts(&mut self) -> usize {
        let now = self.clock.now();
        let before = self.connections.len();

        self.connections.retain(|key, handler| {
            if handler.is_expired(now) {
                info!(peer = %key, conn_id = handler.conn_id(), "connection timed out");
                false
            } else {
                true
            }
        });

        before - self.connections.len()
    }

    /// Earliest idle deadline among live connections.
    pub fn next_timeout(&self) -> Option<Instant> {
        self.connections.values().map(|h| h.deadline()).min()
    }

    /// Drop every connection. Returns how many were live.
    pub fn shutdown(&mut self) -> usize {
        let n = self.connections.len();
        self.connections.clear();
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_key_format() {
        let v4: SocketAddr = "192.0.2.1:443".parse().unwrap();
        let v6: SocketAddr = "[2001:db8::1]:8443".parse().unwrap();
        assert_eq!(ConnectionKey::from(v4).to_string(), "[192.0.2.1]:443");
        assert_eq!(ConnectionKey::from(v6).to_string(), "[2001:db8::1]:8443");
    }

    #[test]
    fn test_connection_key_distinguishes_ports() {
        let a: SocketAddr = "192.0.2.1:1000".parse().unwrap();
        let b: SocketAddr = "192.0.2.1:1001".parse().unwrap();
        assert_ne!(ConnectionKey::from(a), ConnectionKey::from(b));
    }

    #[test]
    fn test_family_floors() {
        assert_eq!(min_initial_len("192.0.2.1:1".parse().unwrap()), 1252);
        assert_eq!(min_initial_len("[::1]:1".parse().unwrap()), 1232);
    }
}
