//! # 1-RTT Key Schedule
//!
//! Runs once, when the engine reports handshake completion:
//!
//! 1. Read the negotiated PRF and AEAD; the secret length is the PRF digest
//!    length.
//! 2. Export the server and client 1-RTT secrets from TLS.
//! 3. Expand each into an AEAD key and IV with HKDF-Expand-Label
//!    (`quic key`, `quic iv`).
//! 4. Install transmit keys, receive keys and the AEAD overhead.
//!
//! Steps 1-3 ([`derive_keys`]) finish before step 4 ([`install_keys`])
//! touches the engine, so a failure never leaves one direction keyed.

use super::boring::hkdf_expand_label;
use super::{AeadAlgorithm, CryptoContext, Prf, Secret};
use crate::error::{Error, Result};
use crate::tls::TlsSession;
use quicd_quic::EngineControl;
use tracing::debug;

/// Exporter label of the server's (transmit) traffic secret
pub const SERVER_1RTT_LABEL: &str = "EXPORTER-QUIC server 1-RTT Secret";

/// Exporter label of the client's (receive) traffic secret
pub const CLIENT_1RTT_LABEL: &str = "EXPORTER-QUIC client 1-RTT Secret";

const KEY_LABEL: &str = "quic key";
const IV_LABEL: &str = "quic iv";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketKeys {
    pub key: Vec<u8>,
    pub iv: Vec<u8>,
}

impl PacketKeys {
    fn expand(prf: Prf, aead: AeadAlgorithm, secret: &Secret) -> Result<Self> {
        Ok(Self {
            key: hkdf_expand_label(prf, secret.as_bytes(), KEY_LABEL, aead.key_len())?,
            iv: hkdf_expand_label(prf, secret.as_bytes(), IV_LABEL, aead.iv_len())?,
        })
    }
}

/// Everything the key schedule produces, ready to install.
#[derive(Debug)]
pub struct DerivedKeys {
    pub context: CryptoContext,
    pub tx: PacketKeys,
    pub rx: PacketKeys,
}

/// Export secrets and expand both directions' keys.
pub fn derive_keys<T: TlsSession + ?Sized>(tls: &T) -> Result<DerivedKeys> {
    let prf = tls
        .negotiated_prf()
        .ok_or(Error::KeyDerivation("no negotiated PRF"))?;
    let aead = tls
        .negotiated_aead()
        .ok_or(Error::KeyDerivation("no negotiated AEAD"))?;
    let secret_len = prf.digest_len();

    let mut tx_secret = Secret::zeroed(secret_len);
    tls.export_secret(SERVER_1RTT_LABEL, tx_secret.as_mut_bytes())?;
    let tx = PacketKeys::expand(prf, aead, &tx_secret)?;

    let mut rx_secret = Secret::zeroed(secret_len);
    tls.export_secret(CLIENT_1RTT_LABEL, rx_secret.as_mut_bytes())?;
    let rx = PacketKeys::expand(prf, aead, &rx_secret)?;

    debug!(?prf, ?aead, secret_len, "derived 1-RTT keys");

    Ok(DerivedKeys {
        context: CryptoContext {
            prf,
            aead,
            tx_secret,
            rx_secret,
            secret_len,
            aead_overhead: aead.tag_len(),
        },
        tx,
        rx,
    })
}

/// Hand derived keys to the engine.
pub fn install_keys(keys: &DerivedKeys, ctl: &mut dyn EngineControl) -> Result<()> {
    ctl.update_tx_keys(&keys.tx.key, &keys.tx.iv)?;
    ctl.update_rx_keys(&keys.rx.key, &keys.rx.iv)?;
    ctl.set_aead_overhead(keys.context.aead_overhead);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tls::{HandshakeStatus, HandshakeTransport};

    struct FixedTls {
        transport: HandshakeTransport,
        suite: Option<(Prf, AeadAlgorithm)>,
        fail_label: Option<&'static str>,
    }

    impl FixedTls {
        fn new(suite: Option<(Prf, AeadAlgorithm)>) -> Self {
            Self {
                transport: HandshakeTransport::new(),
                suite,
                fail_label: None,
            }
        }
    }

    impl TlsSession for FixedTls {
        fn transport(&self) -> &HandshakeTransport {
            &self.transport
        }

        fn transport_mut(&mut self) -> &mut HandshakeTransport {
            &mut self.transport
        }

        fn do_handshake(&mut self) -> Result<HandshakeStatus> {
            Ok(HandshakeStatus::Complete)
        }

        fn negotiated_prf(&self) -> Option<Prf> {
            self.suite.map(|s| s.0)
        }

        fn negotiated_aead(&self) -> Option<AeadAlgorithm> {
            self.suite.map(|s| s.1)
        }

        fn export_secret(&self, label: &str, out: &mut [u8]) -> Result<()> {
            if self.fail_label == Some(label) {
                return Err(Error::KeyDerivation("exporter"));
            }
            let fill = if label == SERVER_1RTT_LABEL { 0x5a } else { 0xc3 };
            out.fill(fill);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingControl {
        tx: Option<(Vec<u8>, Vec<u8>)>,
        rx: Option<(Vec<u8>, Vec<u8>)>,
        overhead: Option<usize>,
    }

    impl EngineControl for RecordingControl {
        fn handshake_completed(&mut self) {}

        fn update_tx_keys(&mut self, key: &[u8], iv: &[u8]) -> quicd_quic::Result<()> {
            self.tx = Some((key.to_vec(), iv.to_vec()));
            Ok(())
        }

        fn update_rx_keys(&mut self, key: &[u8], iv: &[u8]) -> quicd_quic::Result<()> {
            self.rx = Some((key.to_vec(), iv.to_vec()));
            Ok(())
        }

        fn set_aead_overhead(&mut self, overhead: usize) {
            self.overhead = Some(overhead);
        }
    }

    #[test]
    fn test_sha256_suite_sizes() {
        let tls = FixedTls::new(Some((Prf::Sha256, AeadAlgorithm::Aes128Gcm)));
        let keys = derive_keys(&tls).unwrap();

        assert_eq!(keys.context.secret_len, 32);
        assert_eq!(keys.context.tx_secret.as_bytes(), &[0x5a; 32]);
        assert_eq!(keys.context.rx_secret.as_bytes(), &[0xc3; 32]);
        assert_eq!(keys.tx.key.len(), 16);
        assert_eq!(keys.tx.iv.len(), 12);
        assert_ne!(keys.tx, keys.rx, "directions must use distinct keys");
    }

    #[test]
    fn test_sha384_suite_sizes() {
        let tls = FixedTls::new(Some((Prf::Sha384, AeadAlgorithm::Aes256Gcm)));
        let keys = derive_keys(&tls).unwrap();

        assert_eq!(keys.context.secret_len, 48);
        assert_eq!(keys.context.tx_secret.len(), 48);
        assert_eq!(keys.rx.key.len(), 32);
        assert_eq!(keys.context.aead_overhead, 16);
    }

    #[test]
    fn test_install_sets_both_directions_and_overhead() {
        let tls = FixedTls::new(Some((Prf::Sha256, AeadAlgorithm::ChaCha20Poly1305)));
        let keys = derive_keys(&tls).unwrap();
        let mut ctl = RecordingControl::default();

        install_keys(&keys, &mut ctl).unwrap();

        assert_eq!(ctl.tx, Some((keys.tx.key.clone(), keys.tx.iv.clone())));
        assert_eq!(ctl.rx, Some((keys.rx.key.clone(), keys.rx.iv.clone())));
        assert_eq!(ctl.overhead, Some(16));
    }

    #[test]
    fn test_missing_suite_fails_before_export() {
        let tls = FixedTls::new(None);
        assert!(matches!(derive_keys(&tls), Err(Error::KeyDerivation(_))));
    }

    #[test]
    fn test_client_export_failure_produces_nothing() {
        let mut tls = FixedTls::new(Some((Prf::Sha256, AeadAlgorithm::Aes128Gcm)));
        tls.fail_label = Some(CLIENT_1RTT_LABEL);
        assert!(derive_keys(&tls).is_err());
    }
}
