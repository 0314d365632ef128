//! # Cleartext Integrity and AEAD Nonce Construction
//!
//! Cleartext packets (Client Initial, Server/Client Cleartext, Version
//! Negotiation) are not encrypted. They end with an 8 byte FNV-1a 64-bit
//! hash over everything that precedes it.
//!
//! Protected packets use the engine-installed IV: the nonce is the IV with
//! the left-padded big-endian packet number XORed into its tail.

#![forbid(unsafe_code)]

use crate::error::{Error, Result};

/// Length of the FNV-1a trailer on cleartext packets
pub const CHECKSUM_LEN: usize = 8;

const FNV64_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV64_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit hash.
pub fn fnv1a64(data: &[u8]) -> u64 {
    data.iter().fold(FNV64_OFFSET_BASIS, |h, b| {
        (h ^ u64::from(*b)).wrapping_mul(FNV64_PRIME)
    })
}

/// Append the checksum of `buf[..len]` at `buf[len..len + 8]`.
///
/// Returns the total packet length.
pub fn append_checksum(buf: &mut [u8], len: usize) -> Result<usize> {
    let end = len + CHECKSUM_LEN;
    if buf.len() < end {
        return Err(Error::BufferTooSmall);
    }
    let sum = fnv1a64(&buf[..len]);
    buf[len..end].copy_from_slice(&sum.to_be_bytes());
    Ok(end)
}

/// Verify the trailing checksum and return the covered bytes.
pub fn verify_checksum(packet: &[u8]) -> Result<&[u8]> {
    if packet.len() < CHECKSUM_LEN {
        return Err(Error::MalformedPacket);
    }
    let (body, trailer) = packet.split_at(packet.len() - CHECKSUM_LEN);
    if fnv1a64(body).to_be_bytes() != trailer {
        return Err(Error::BadChecksum);
    }
    Ok(body)
}

/// Build the AEAD nonce for `pkt_num` from `iv`.
pub fn packet_nonce(iv: &[u8], pkt_num: u64) -> Vec<u8> {
    let mut nonce = iv.to_vec();
    let pn = pkt_num.to_be_bytes();
    let n = pn.len().min(nonce.len());
    let start = nonce.len() - n;
    for (dst, src) in nonce[start..].iter_mut().zip(&pn[pn.len() - n..]) {
        *dst ^= *src;
    }
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a64_reference_values() {
        assert_eq!(fnv1a64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a64(b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a64(b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_checksum_detects_corruption() {
        let mut buf = [0u8; 32];
        buf[..5].copy_from_slice(b"hello");
        let n = append_checksum(&mut buf, 5).unwrap();
        assert_eq!(n, 13);
        assert_eq!(verify_checksum(&buf[..n]).unwrap(), b"hello");

        buf[2] ^= 0x01;
        assert_eq!(verify_checksum(&buf[..n]), Err(Error::BadChecksum));
    }

    #[test]
    fn test_checksum_needs_room() {
        let mut buf = [0u8; 10];
        assert_eq!(append_checksum(&mut buf, 5), Err(Error::BufferTooSmall));
    }

    #[test]
    fn test_nonce_xors_packet_number_into_tail() {
        let iv = [0xffu8; 12];
        let nonce = packet_nonce(&iv, 0x0102);
        assert_eq!(&nonce[..10], &[0xff; 10]);
        assert_eq!(nonce[10], 0xff ^ 0x01);
        assert_eq!(nonce[11], 0xff ^ 0x02);
    }
}
