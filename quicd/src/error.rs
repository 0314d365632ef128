//! Server error types.
//!
//! Every variant is fatal for the connection that raised it; the dispatcher
//! tears the handler down and logs the error. Only the binary converts these
//! into `anyhow` errors.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("socket I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS library error: {0}")]
    Tls(#[from] boring::error::ErrorStack),

    #[error("protocol engine error: {0}")]
    Engine(#[from] quicd_quic::Error),

    #[error("TLS handshake failed: {0}")]
    Handshake(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(&'static str),

    #[error("AEAD operation failed")]
    Crypto,

    #[error("invalid configuration: {0}")]
    Config(String),
}
