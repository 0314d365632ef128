//! # Packet Layer
//!
//! Stateless packet primitives: header codec, cleartext checksums, the
//! admission check used before any connection state exists, and Version
//! Negotiation encoding.

pub mod header;
pub mod protection;

pub use header::{is_long_header, LongHeader, PacketType, ShortHeader, LONG_HEADER_LEN};
pub use protection::{append_checksum, packet_nonce, verify_checksum, CHECKSUM_LEN};

use crate::error::{Error, Result};
use crate::version::is_supported_version;

/// Maximum packet length on IPv4 paths. Client Initial packets must be at
/// least this long.
pub const MAX_PKTLEN_IPV4: usize = 1252;

/// Maximum packet length on IPv6 paths. Client Initial packets must be at
/// least this long.
pub const MAX_PKTLEN_IPV6: usize = 1232;

/// Result of inspecting the first datagram from an unknown peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    /// Not a long header packet, or truncated
    Malformed,
    /// Well formed, but offers a version we do not speak
    VersionMismatch(LongHeader),
    /// Well formed and speaks our version
    Recognized(LongHeader),
}

/// Inspect a datagram without connection state.
pub fn accept(datagram: &[u8]) -> Accept {
    match LongHeader::decode(datagram) {
        Err(_) => Accept::Malformed,
        Ok(hd) if !is_supported_version(hd.version) => Accept::VersionMismatch(hd),
        Ok(hd) => Accept::Recognized(hd),
    }
}

/// Write `hd`, `payload` and the trailing checksum into `out`.
pub fn encode_cleartext_packet(hd: &LongHeader, payload: &[u8], out: &mut [u8]) -> Result<usize> {
    let body_len = LONG_HEADER_LEN + payload.len();
    if out.len() < body_len + CHECKSUM_LEN {
        return Err(Error::BufferTooSmall);
    }
    hd.encode(out)?;
    out[LONG_HEADER_LEN..body_len].copy_from_slice(payload);
    append_checksum(out, body_len)
}

/// Encode a Version Negotiation packet listing `versions`.
///
/// The header fields of `hd` are written as given; callers echo the
/// client's connection id, packet number and version.
pub fn encode_version_negotiation(hd: &LongHeader, versions: &[u32], out: &mut [u8]) -> Result<usize> {
    let payload: Vec<u8> = versions.iter().flat_map(|v| v.to_be_bytes()).collect();
    let hd = LongHeader {
        ty: PacketType::VersionNegotiation,
        ..*hd
    };
    encode_cleartext_packet(&hd, &payload, out)
}

/// Decode the version list of a Version Negotiation packet.
pub fn decode_version_negotiation(packet: &[u8]) -> Result<(LongHeader, Vec<u32>)> {
    let body = verify_checksum(packet)?;
    let hd = LongHeader::decode(body)?;
    if hd.ty != PacketType::VersionNegotiation {
        return Err(Error::MalformedPacket);
    }
    let payload = &body[LONG_HEADER_LEN..];
    if payload.len() % 4 != 0 {
        return Err(Error::MalformedPacket);
    }
    let versions = payload
        .chunks_exact(4)
        .map(|c| u32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok((hd, versions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::PROTO_VERSION;

    fn header(version: u32) -> LongHeader {
        LongHeader {
            ty: PacketType::ClientInitial,
            conn_id: 7,
            pkt_num: 9,
            version,
        }
    }

    #[test]
    fn test_accept_tri_state() {
        let mut buf = [0u8; 64];
        header(PROTO_VERSION).encode(&mut buf).unwrap();
        assert_eq!(accept(&buf), Accept::Recognized(header(PROTO_VERSION)));

        header(0x1234_5678).encode(&mut buf).unwrap();
        assert_eq!(accept(&buf), Accept::VersionMismatch(header(0x1234_5678)));

        buf[0] = 0x02;
        assert_eq!(accept(&buf), Accept::Malformed);
        assert_eq!(accept(&[]), Accept::Malformed);
    }

    #[test]
    fn test_accept_mismatches_neighbouring_and_reserved_versions() {
        let mut buf = [0u8; 64];
        for version in [0xff00_0004, 0xff00_0006, 0x0a0a_0a0a, 0] {
            header(version).encode(&mut buf).unwrap();
            assert_eq!(
                accept(&buf),
                Accept::VersionMismatch(header(version)),
                "version {:#x} must be negotiated",
                version
            );
        }
    }

    #[test]
    fn test_version_negotiation_echoes_header() {
        let client = header(0x1234_5678);
        let mut out = [0u8; 128];
        let n = encode_version_negotiation(&client, &[0x1a2a_3a4a, PROTO_VERSION], &mut out).unwrap();
        assert_eq!(n, LONG_HEADER_LEN + 8 + CHECKSUM_LEN);

        let (hd, versions) = decode_version_negotiation(&out[..n]).unwrap();
        assert_eq!(hd.ty, PacketType::VersionNegotiation);
        assert_eq!(hd.conn_id, client.conn_id);
        assert_eq!(hd.pkt_num, client.pkt_num);
        assert_eq!(hd.version, client.version);
        assert_eq!(versions, vec![0x1a2a_3a4a, PROTO_VERSION]);
    }

    #[test]
    fn test_ipv4_floor_exceeds_ipv6_floor() {
        assert!(MAX_PKTLEN_IPV4 > MAX_PKTLEN_IPV6);
    }
}
