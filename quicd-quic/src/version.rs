//! # Protocol Version Constants
//!
//! The server speaks exactly one version. Anything else offered by a client
//! is answered with a Version Negotiation packet listing that version and a
//! reserved greasing value.

#![forbid(unsafe_code)]

// ============================================================================
// Version Constants
// ============================================================================

/// The one protocol version this engine implements (draft-05).
pub const PROTO_VERSION: u32 = 0xff00_0005;

/// Bit template shared by all reserved versions (`0x?a?a?a?a`).
pub const RESERVED_VERSION_PATTERN: u32 = 0x0a0a_0a0a;

/// Mask selecting the fixed nibbles of a reserved version.
pub const RESERVED_VERSION_MASK: u32 = 0x0f0f_0f0f;

/// Returns true if `version` is the version this engine implements.
pub fn is_supported_version(version: u32) -> bool {
    version == PROTO_VERSION
}

/// Reserved versions have the form 0x?a?a?a?a and are never real versions.
///
/// **Example**: 0x0a0a0a0a, 0x1a1a1a1a, 0xfafafafa
pub fn is_reserved_version(version: u32) -> bool {
    (version & RESERVED_VERSION_MASK) == RESERVED_VERSION_PATTERN
}
