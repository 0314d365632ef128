//! Engine Error Types
//!
//! Every error surfaced by the engine is fatal for the connection that
//! produced it. The server tears the connection down on any `Err`.

#![forbid(unsafe_code)]

use core::fmt;

/// Generic Result Type for engine operations
pub type Result<T> = core::result::Result<T, Error>;

/// Unified Error Type for the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A transport callback reported failure
    CallbackFailure,

    /// Output buffer cannot hold the packet being built
    BufferTooSmall,

    /// Packet is structurally invalid
    MalformedPacket,

    /// Cleartext packet checksum did not match
    BadChecksum,

    /// Frame could not be decoded
    FrameEncoding,

    /// Packet type not permitted in the current connection state
    ProtocolViolation,

    /// Packet carries a version other than the negotiated one
    UnsupportedVersion,

    /// Protected packet could not be opened or sealed
    Crypto,

    /// Keys were installed twice or with invalid lengths
    InvalidKey,

    /// Peer closed the connection
    ConnectionClosed,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::CallbackFailure => write!(f, "Callback failure"),
            Error::BufferTooSmall => write!(f, "Buffer too small"),
            Error::MalformedPacket => write!(f, "Malformed packet"),
            Error::BadChecksum => write!(f, "Bad cleartext checksum"),
            Error::FrameEncoding => write!(f, "Frame encoding error"),
            Error::ProtocolViolation => write!(f, "Protocol violation"),
            Error::UnsupportedVersion => write!(f, "Unsupported version"),
            Error::Crypto => write!(f, "Crypto error"),
            Error::InvalidKey => write!(f, "Invalid key material"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl std::error::Error for Error {}
