//! # Packet Protection Crypto
//!
//! Negotiated algorithm identifiers, the per-connection [`CryptoContext`],
//! and the key schedule run at handshake completion.
//!
//! ## Cipher suites
//!
//! | Suite  | PRF    | AEAD               | key | iv | tag |
//! |--------|--------|--------------------|-----|----|-----|
//! | 0x1301 | SHA256 | AES-128-GCM        | 16  | 12 | 16  |
//! | 0x1302 | SHA384 | AES-256-GCM        | 32  | 12 | 16  |
//! | 0x1303 | SHA256 | ChaCha20-Poly1305  | 32  | 12 | 16  |

pub mod boring;
pub mod key_schedule;

pub use key_schedule::{derive_keys, install_keys, DerivedKeys, PacketKeys};

/// Capacity of a secret buffer; large enough for any supported PRF.
pub const MAX_SECRET_LEN: usize = 64;

/// Hash function of the negotiated cipher suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prf {
    Sha256,
    Sha384,
}

impl Prf {
    pub fn digest_len(self) -> usize {
        match self {
            Prf::Sha256 => 32,
            Prf::Sha384 => 48,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AeadAlgorithm {
    Aes128Gcm,
    Aes256Gcm,
    ChaCha20Poly1305,
}

impl AeadAlgorithm {
    pub fn key_len(self) -> usize {
        match self {
            AeadAlgorithm::Aes128Gcm => 16,
            AeadAlgorithm::Aes256Gcm | AeadAlgorithm::ChaCha20Poly1305 => 32,
        }
    }

    pub fn iv_len(self) -> usize {
        12
    }

    pub fn tag_len(self) -> usize {
        16
    }
}

/// Map a TLS 1.3 cipher suite id to its PRF and AEAD.
pub fn suite_algorithms(suite: u16) -> Option<(Prf, AeadAlgorithm)> {
    match suite {
        0x1301 => Some((Prf::Sha256, AeadAlgorithm::Aes128Gcm)),
        0x1302 => Some((Prf::Sha384, AeadAlgorithm::Aes256Gcm)),
        0x1303 => Some((Prf::Sha256, AeadAlgorithm::ChaCha20Poly1305)),
        _ => None,
    }
}

/// Fixed-capacity secret with an explicit length.
#[derive(Clone)]
pub struct Secret {
    buf: [u8; MAX_SECRET_LEN],
    len: usize,
}

impl Secret {
    /// A zeroed secret of `len` bytes; `len` is clamped to the capacity.
    pub fn zeroed(len: usize) -> Self {
        Self {
            buf: [0; MAX_SECRET_LEN],
            len: len.min(MAX_SECRET_LEN),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret").field("len", &self.len).finish_non_exhaustive()
    }
}

/// Per-connection crypto state, set once when the handshake completes.
#[derive(Debug, Clone)]
pub struct CryptoContext {
    pub prf: Prf,
    pub aead: AeadAlgorithm,
    pub tx_secret: Secret,
    pub rx_secret: Secret,
    pub secret_len: usize,
    pub aead_overhead: usize,
}
