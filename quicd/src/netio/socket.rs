//! UDP socket creation.
//!
//! Sockets are created with socket2 so options can be set before bind, then
//! handed to tokio in non-blocking mode.

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket as Socket2, Type};
use std::net::{SocketAddr, UdpSocket};
use tracing::{debug, warn};

/// Create a non-blocking UDP socket bound to `bind_addr`.
pub fn create_udp_socket(bind_addr: SocketAddr) -> Result<UdpSocket> {
    let domain = match bind_addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket =
        Socket2::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("creating UDP socket")?;

    socket
        .set_reuse_address(true)
        .context("setting SO_REUSEADDR")?;

    // Wildcard IPv6 binds accept IPv4-mapped peers too.
    if let SocketAddr::V6(addr) = bind_addr {
        socket
            .set_only_v6(!addr.ip().is_unspecified())
            .context("setting IPV6_V6ONLY")?;
    }

    socket
        .set_nonblocking(true)
        .context("setting O_NONBLOCK")?;

    socket
        .bind(&bind_addr.into())
        .with_context(|| format!("binding UDP socket to {}", bind_addr))?;

    Ok(socket.into())
}

/// Try each candidate address in order and keep the first that binds.
pub fn bind_first(addrs: &[SocketAddr]) -> Result<UdpSocket> {
    let mut last_err = None;

    for addr in addrs {
        match create_udp_socket(*addr) {
            Ok(socket) => {
                debug!(addr = %addr, "bound UDP socket");
                return Ok(socket);
            }
            Err(e) => {
                warn!(addr = %addr, error = %format!("{:#}", e), "bind failed, trying next address");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no addresses to bind")))
}
