//! Version Negotiation replies.
//!
//! A client offering an unsupported version gets one stateless reply listing
//! a reserved version and the version we speak. The reserved value is a
//! deterministic function of the peer's raw socket address and the offered
//! version, so retransmitted offers get identical replies.

use crate::netio::DatagramSocket;
use quicd_quic::packet::{encode_version_negotiation, LongHeader, CHECKSUM_LEN, LONG_HEADER_LEN};
use quicd_quic::version::{RESERVED_VERSION_PATTERN, PROTO_VERSION};
use socket2::SockAddr;
use std::net::SocketAddr;
use tracing::{debug, warn};

const FNV32_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV32_PRIME: u32 = 0x0100_0193;

/// Clears the low nibble of every byte before the reserved pattern is applied.
const RESERVED_HASH_MASK: u32 = 0xf0f0_f0f0;

fn fnv1a32(mut hash: u32, data: &[u8]) -> u32 {
    for b in data {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(FNV32_PRIME);
    }
    hash
}

/// The OS representation of `peer` (`sockaddr_in` / `sockaddr_in6`).
fn sockaddr_bytes(peer: SocketAddr) -> Vec<u8> {
    let addr = SockAddr::from(peer);
    // SAFETY: `as_ptr` points at storage owned by `addr` holding at least
    // `len()` initialized bytes; the slice is copied before `addr` drops.
    unsafe { std::slice::from_raw_parts(addr.as_ptr().cast::<u8>(), addr.len() as usize).to_vec() }
}

/// Reserved version advertised to `peer` in reply to `offered`.
pub fn reserved_version(peer: SocketAddr, offered: u32) -> u32 {
    let hash = fnv1a32(FNV32_OFFSET_BASIS, &sockaddr_bytes(peer));
    let hash = fnv1a32(hash, &offered.to_be_bytes());
    (hash & RESERVED_HASH_MASK) | RESERVED_VERSION_PATTERN
}

/// Encode the reply to `client` into `out`.
pub fn encode_reply(client: &LongHeader, peer: SocketAddr, out: &mut [u8]) -> quicd_quic::Result<usize> {
    let versions = [reserved_version(peer, client.version), PROTO_VERSION];
    encode_version_negotiation(client, &versions, out)
}

/// Send one Version Negotiation datagram. Failures are logged, not retried.
pub fn send_version_negotiation<S: DatagramSocket>(socket: &S, client: &LongHeader, peer: SocketAddr) {
    let mut buf = [0u8; LONG_HEADER_LEN + 8 + CHECKSUM_LEN];
    let len = match encode_reply(client, peer, &mut buf) {
        Ok(len) => len,
        Err(e) => {
            warn!(%peer, error = %e, "failed to encode version negotiation");
            return;
        }
    };

    match socket.send_to(&buf[..len], peer) {
        Ok(_) => debug!(
            %peer,
            offered = format_args!("{:#010x}", client.version),
            "sent version negotiation"
        ),
        Err(e) => warn!(%peer, error = %e, "failed to send version negotiation"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quicd_quic::packet::{decode_version_negotiation, PacketType};
    use quicd_quic::version::is_reserved_version;

    fn v4(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 7], port))
    }

    #[test]
    fn test_fnv1a32_reference_values() {
        assert_eq!(fnv1a32(FNV32_OFFSET_BASIS, b""), 0x811c_9dc5);
        assert_eq!(fnv1a32(FNV32_OFFSET_BASIS, b"a"), 0xe40c_292c);
        assert_eq!(fnv1a32(FNV32_OFFSET_BASIS, b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn test_reserved_version_has_reserved_shape() {
        for port in [1, 443, 4433, 65535] {
            let v = reserved_version(v4(port), 0x1234_5678);
            assert!(is_reserved_version(v), "{:#010x} is not 0x?a?a?a?a", v);
            assert_ne!(v, PROTO_VERSION);
        }
    }

    #[test]
    fn test_reserved_version_is_deterministic() {
        let peer: SocketAddr = "[2001:db8::1]:9000".parse().unwrap();
        assert_eq!(
            reserved_version(peer, 0xabad_cafe),
            reserved_version(peer, 0xabad_cafe)
        );
    }

    #[test]
    fn test_reserved_version_depends_on_inputs() {
        let values: std::collections::HashSet<u32> = (1000..1064)
            .map(|port| reserved_version(v4(port), 0x1234_5678))
            .collect();
        assert!(values.len() > 1, "hash ignores the peer address");

        let by_version: std::collections::HashSet<u32> = (0..64)
            .map(|v| reserved_version(v4(1000), v))
            .collect();
        assert!(by_version.len() > 1, "hash ignores the offered version");
    }

    #[test]
    fn test_sockaddr_sizes_match_os_structs() {
        assert_eq!(sockaddr_bytes(v4(1)).len(), 16);
        assert_eq!(sockaddr_bytes("[::1]:1".parse().unwrap()).len(), 28);
    }

    #[test]
    fn test_reply_lists_reserved_then_supported() {
        let client = LongHeader {
            ty: PacketType::ClientInitial,
            conn_id: 0x0102_0304_0506_0708,
            pkt_num: 77,
            version: 0x1234_5678,
        };
        let mut out = [0u8; 64];
        let n = encode_reply(&client, v4(5000), &mut out).unwrap();

        let (hd, versions) = decode_version_negotiation(&out[..n]).unwrap();
        assert_eq!(hd.ty, PacketType::VersionNegotiation);
        assert_eq!(hd.conn_id, client.conn_id);
        assert_eq!(hd.pkt_num, client.pkt_num);
        assert_eq!(hd.version, client.version);
        assert_eq!(
            versions,
            vec![reserved_version(v4(5000), 0x1234_5678), PROTO_VERSION]
        );
    }
}
