//! Reactor and connection management.
//!
//! One task on a current-thread runtime owns the socket and every
//! connection. Each loop iteration waits for exactly one of:
//!
//! - a datagram on the socket, routed through the [`ConnectionDispatcher`]
//! - the earliest connection idle deadline
//! - Ctrl-C, which drops all connections and returns
//!
//! Nothing blocks; TLS steps either complete or report would-block, and
//! sends never wait for socket buffer space.

pub mod dispatcher;
pub mod handler;
pub mod session;
pub mod version_negotiation;


pub use dispatcher::{ConnectionDispatcher, ConnectionKey};
pub use handler::{ConnectionHandler, ConnectionPhase, HandshakeDriver};
pub use session::{BoringSessionFactory, SessionFactory};

use crate::config::ServerConfig;
use crate::runtime::SystemClock;
use anyhow::{Context, Result};
use bytes::BytesMut;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::io;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

enum Event {
    Datagram(io::Result<(usize, SocketAddr)>),
    Timeout,
    Shutdown(io::Result<()>),
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}

/// Serve connections on `socket` until Ctrl-C.
pub async fn run<F: SessionFactory>(socket: UdpSocket, factory: F, config: &ServerConfig) -> Result<()> {
    let mut dispatcher = ConnectionDispatcher::new(
        socket,
        factory,
        Box::new(SystemClock),
        Box::new(StdRng::from_entropy()),
        config.idle_timeout,
    );
    let mut buf = BytesMut::zeroed(config.recv_buffer_size);

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let deadline = dispatcher.next_timeout();

        let event = tokio::select! {
            res = dispatcher.socket().recv_from(&mut buf) => Event::Datagram(res),
            _ = sleep_until(deadline) => Event::Timeout,
            res = &mut shutdown => Event::Shutdown(res),
        };

        match event {
            Event::Datagram(Ok((len, peer))) => {
                debug!(%peer, len, "received datagram");
                dispatcher.on_datagram(&buf[..len], peer);
            }
            Event::Datagram(Err(e)) => {
                // ICMP errors from earlier sends surface here; the socket stays usable.
                warn!(error = %e, "recv_from failed");
            }
            Event::Timeout => {
                dispatcher.poll_timeouts();
            }
            Event::Shutdown(res) => {
                res.context("failed to listen for Ctrl-C")?;
                info!(connections = dispatcher.len(), "shutdown signal received");
                dispatcher.shutdown();
                return Ok(());
            }
        }
    }
}
