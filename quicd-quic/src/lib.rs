//! quicd-quic: Draft QUIC Transport Engine
//!
//! A sans-IO protocol engine for the draft-05 wire format, plus the
//! interface the server uses to drive it.
//!
//! # Architecture
//!
//! - **Sans-IO**: the engine never touches sockets or clocks; the caller
//!   feeds datagrams in and pulls datagrams out
//! - **Callbacks per call**: TLS glue and AEAD are supplied through
//!   [`TransportCallbacks`] on every `recv`/`send`
//! - **Zero-copy parsing**: headers and frames borrow from the datagram
//!
//! # Module Organization
//!
//! - `packet`: long/short headers, cleartext checksums, version negotiation
//! - `frames`: STREAM, ACK, PING, PADDING, CONNECTION_CLOSE
//! - `connection`: engine traits and the reference server connection
//! - `version`: the supported protocol version
//! - `error`: engine error type

pub mod connection;
pub mod error;
pub mod frames;
pub mod packet;
pub mod version;

pub use connection::{EngineControl, ProtocolEngine, ServerConnection, TransportCallbacks};
pub use error::{Error, Result};
pub use packet::{Accept, LongHeader, PacketType, MAX_PKTLEN_IPV4, MAX_PKTLEN_IPV6};
pub use version::PROTO_VERSION;
