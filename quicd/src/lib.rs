//! quicd: a single-threaded draft-QUIC handshake server.
//!
//! The binary in `main.rs` wires these modules together; they are exposed
//! as a library so the dispatcher can be driven from tests with a fake
//! socket, clock and TLS session.

pub mod config;
pub mod crypto;
pub mod error;
pub mod netio;
pub mod runtime;
pub mod telemetry;
pub mod tls;
pub mod worker;
