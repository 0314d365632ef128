//! BoringSSL primitives: HKDF-Expand-Label and one-shot AEAD seal/open.

use super::{AeadAlgorithm, Prf};
use crate::error::{Error, Result};
use boring_sys as ffi;
use std::ptr;

const LABEL_PREFIX: &[u8] = b"tls13 ";

fn digest(prf: Prf) -> *const ffi::EVP_MD {
    // SAFETY: returns a pointer to a static digest table.
    unsafe {
        match prf {
            Prf::Sha256 => ffi::EVP_sha256(),
            Prf::Sha384 => ffi::EVP_sha384(),
        }
    }
}

fn aead(alg: AeadAlgorithm) -> *const ffi::EVP_AEAD {
    // SAFETY: returns a pointer to a static AEAD table.
    unsafe {
        match alg {
            AeadAlgorithm::Aes128Gcm => ffi::EVP_aead_aes_128_gcm(),
            AeadAlgorithm::Aes256Gcm => ffi::EVP_aead_aes_256_gcm(),
            AeadAlgorithm::ChaCha20Poly1305 => ffi::EVP_aead_chacha20_poly1305(),
        }
    }
}

/// HKDF-Expand-Label with an empty context.
///
/// ```text
/// info = u16(len) || u8(6 + |label|) || "tls13 " || label || u8(0)
/// ```
pub fn hkdf_expand_label(prf: Prf, secret: &[u8], label: &str, len: usize) -> Result<Vec<u8>> {
    let out_len = u16::try_from(len).map_err(|_| Error::KeyDerivation("output too long"))?;
    let label_len = u8::try_from(LABEL_PREFIX.len() + label.len())
        .map_err(|_| Error::KeyDerivation("label too long"))?;

    let mut info = Vec::with_capacity(4 + usize::from(label_len));
    info.extend_from_slice(&out_len.to_be_bytes());
    info.push(label_len);
    info.extend_from_slice(LABEL_PREFIX);
    info.extend_from_slice(label.as_bytes());
    info.push(0);

    let mut out = vec![0u8; len];
    // SAFETY: all pointers come from live slices with matching lengths.
    let ok = unsafe {
        ffi::HKDF_expand(
            out.as_mut_ptr(),
            out.len(),
            digest(prf),
            secret.as_ptr(),
            secret.len(),
            info.as_ptr(),
            info.len(),
        )
    };
    if ok != 1 {
        return Err(Error::KeyDerivation("HKDF_expand"));
    }
    Ok(out)
}

struct AeadCtx(ffi::EVP_AEAD_CTX);

impl AeadCtx {
    fn new(alg: AeadAlgorithm, key: &[u8]) -> Result<Self> {
        // SAFETY: the context is zero-initialized and then initialized by
        // EVP_AEAD_CTX_init before any use; cleanup runs in Drop.
        unsafe {
            let mut ctx = AeadCtx(std::mem::zeroed());
            let ok = ffi::EVP_AEAD_CTX_init(
                &mut ctx.0,
                aead(alg),
                key.as_ptr(),
                key.len(),
                ffi::EVP_AEAD_DEFAULT_TAG_LENGTH as usize,
                ptr::null_mut(),
            );
            if ok != 1 {
                // Init failed; nothing to clean up.
                std::mem::forget(ctx);
                return Err(Error::Crypto);
            }
            Ok(ctx)
        }
    }
}

impl Drop for AeadCtx {
    fn drop(&mut self) {
        // SAFETY: only constructed after a successful init.
        unsafe { ffi::EVP_AEAD_CTX_cleanup(&mut self.0) };
    }
}

/// Encrypt `plaintext` into `dest`; returns ciphertext plus tag length.
pub fn seal(
    alg: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    ad: &[u8],
    plaintext: &[u8],
    dest: &mut [u8],
) -> Result<usize> {
    let mut ctx = AeadCtx::new(alg, key)?;
    let mut out_len = 0usize;
    // SAFETY: pointers and lengths come from live slices; BoringSSL checks
    // max_out_len against the required output size.
    let ok = unsafe {
        ffi::EVP_AEAD_CTX_seal(
            &mut ctx.0,
            dest.as_mut_ptr(),
            &mut out_len,
            dest.len(),
            nonce.as_ptr(),
            nonce.len(),
            plaintext.as_ptr(),
            plaintext.len(),
            ad.as_ptr(),
            ad.len(),
        )
    };
    if ok != 1 {
        return Err(Error::Crypto);
    }
    Ok(out_len)
}

/// Decrypt and authenticate `ciphertext` into `dest`; returns plaintext length.
pub fn open(
    alg: AeadAlgorithm,
    key: &[u8],
    nonce: &[u8],
    ad: &[u8],
    ciphertext: &[u8],
    dest: &mut [u8],
) -> Result<usize> {
    let mut ctx = AeadCtx::new(alg, key)?;
    let mut out_len = 0usize;
    // SAFETY: as for seal.
    let ok = unsafe {
        ffi::EVP_AEAD_CTX_open(
            &mut ctx.0,
            dest.as_mut_ptr(),
            &mut out_len,
            dest.len(),
            nonce.as_ptr(),
            nonce.len(),
            ciphertext.as_ptr(),
            ciphertext.len(),
            ad.as_ptr(),
            ad.len(),
        )
    };
    if ok != 1 {
        return Err(Error::Crypto);
    }
    Ok(out_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    /// RFC 9001 Appendix A.1 client initial keys.
    #[test]
    fn test_expand_label_known_vector() {
        let secret = hex("c00cf151ca5be075ed0ebfb5c80323c42d6b7db67881289af4008f1f6c357aea");
        let key = hkdf_expand_label(Prf::Sha256, &secret, "quic key", 16).unwrap();
        let iv = hkdf_expand_label(Prf::Sha256, &secret, "quic iv", 12).unwrap();
        assert_eq!(key, hex("1f369613dd76d5467730efcbe3b1a22d"));
        assert_eq!(iv, hex("fa044b2f42a3fd3b46fb255c"));
    }

    #[test]
    fn test_sha384_expansion_differs() {
        let secret = [0x42u8; 48];
        let a = hkdf_expand_label(Prf::Sha384, &secret, "quic key", 32).unwrap();
        let b = hkdf_expand_label(Prf::Sha384, &secret, "quic iv", 12).unwrap();
        assert_eq!(a.len(), 32);
        assert_ne!(&a[..12], &b[..]);
    }

    #[test]
    fn test_seal_open_every_algorithm() {
        for alg in [
            AeadAlgorithm::Aes128Gcm,
            AeadAlgorithm::Aes256Gcm,
            AeadAlgorithm::ChaCha20Poly1305,
        ] {
            let key = vec![0x11u8; alg.key_len()];
            let nonce = [0x22u8; 12];
            let mut sealed = [0u8; 64];
            let n = seal(alg, &key, &nonce, b"hdr", b"ping", &mut sealed).unwrap();
            assert_eq!(n, 4 + alg.tag_len(), "{:?}", alg);

            let mut opened = [0u8; 64];
            let m = open(alg, &key, &nonce, b"hdr", &sealed[..n], &mut opened).unwrap();
            assert_eq!(&opened[..m], b"ping");
        }
    }

    #[test]
    fn test_open_rejects_wrong_associated_data() {
        let key = [0x11u8; 16];
        let nonce = [0x22u8; 12];
        let mut sealed = [0u8; 64];
        let n = seal(AeadAlgorithm::Aes128Gcm, &key, &nonce, b"hdr", b"ping", &mut sealed).unwrap();

        let mut opened = [0u8; 64];
        assert!(matches!(
            open(AeadAlgorithm::Aes128Gcm, &key, &nonce, b"HDR", &sealed[..n], &mut opened),
            Err(Error::Crypto)
        ));
    }

    #[test]
    fn test_bad_key_length_fails() {
        let mut out = [0u8; 64];
        assert!(seal(AeadAlgorithm::Aes256Gcm, &[0u8; 5], &[0u8; 12], b"", b"x", &mut out).is_err());
    }
}
