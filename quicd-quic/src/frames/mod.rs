//! # Frame Parsing and Types
//!
//! The subset of frames the handshake engine needs: STREAM (stream 0 carries
//! the TLS transcript), PADDING, PING, ACK and CONNECTION_CLOSE. Frame
//! payloads borrow from the packet buffer.

pub mod parse;
pub mod types;

pub use parse::FrameParser;
pub use types::*;
