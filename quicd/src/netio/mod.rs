//! Network I/O module.
//!
//! - Socket creation and bind-address fallback
//! - The [`DatagramSocket`] seam the dispatcher writes through
//!
//! Reads stay in the reactor (`worker` module); only writes go through the
//! trait so dispatcher scenarios can run against an in-memory socket.

pub mod socket;


pub use socket::{bind_first, create_udp_socket};

use std::io;
use std::net::SocketAddr;

/// Non-blocking datagram writes.
pub trait DatagramSocket {
    /// Send one datagram to `peer`. Never blocks; a full send buffer is an
    /// error.
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize>;
}

impl DatagramSocket for tokio::net::UdpSocket {
    fn send_to(&self, buf: &[u8], peer: SocketAddr) -> io::Result<usize> {
        self.try_send_to(buf, peer)
    }
}
