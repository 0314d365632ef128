//! Per-connection engine and TLS construction.

use crate::error::Result;
use crate::tls::{BoringTlsSession, TlsSession};
use boring::ssl::SslContext;
use quicd_quic::{ProtocolEngine, ServerConnection};

/// Creates the engine and TLS session of a newly admitted connection.
pub trait SessionFactory {
    type Engine: ProtocolEngine;
    type Tls: TlsSession;

    fn new_engine(&self, conn_id: u64, version: u32) -> Self::Engine;

    fn new_tls(&self) -> Result<Self::Tls>;
}

/// Production sessions: the bundled engine over BoringSSL.
pub struct BoringSessionFactory {
    ctx: SslContext,
}

impl BoringSessionFactory {
    pub fn new(ctx: SslContext) -> Self {
        Self { ctx }
    }
}

impl SessionFactory for BoringSessionFactory {
    type Engine = ServerConnection;
    type Tls = BoringTlsSession;

    fn new_engine(&self, conn_id: u64, version: u32) -> ServerConnection {
        ServerConnection::new(conn_id, version)
    }

    fn new_tls(&self) -> Result<BoringTlsSession> {
        BoringTlsSession::new(&self.ctx)
    }
}
