//! BoringSSL-backed [`TlsSession`].

use super::{HandshakeStatus, HandshakeTransport, TlsSession};
use crate::crypto::{suite_algorithms, AeadAlgorithm, Prf};
use crate::error::{Error, Result};
use boring::ssl::{
    ErrorCode, Ssl, SslContext, SslContextBuilder, SslFiletype, SslMethod, SslMode, SslOptions,
    SslStream, SslVersion,
};
use foreign_types::ForeignTypeRef;
use std::path::Path;
use tracing::debug;

/// Context options shared by every server session.
pub fn server_context_builder() -> Result<SslContextBuilder> {
    let mut builder = SslContext::builder(SslMethod::tls())?;
    builder.set_min_proto_version(Some(SslVersion::TLS1_3))?;
    builder.set_max_proto_version(Some(SslVersion::TLS1_3))?;
    builder.set_curves_list("P-256")?;
    builder.set_options(SslOptions::CIPHER_SERVER_PREFERENCE);
    builder.set_mode(SslMode::RELEASE_BUFFERS);
    builder.set_default_verify_paths()?;
    Ok(builder)
}

/// Build the server context from a PEM private key and certificate chain.
pub fn create_ssl_context(private_key_file: &Path, certificate_file: &Path) -> Result<SslContext> {
    let mut builder = server_context_builder()?;
    builder
        .set_private_key_file(private_key_file, SslFiletype::PEM)
        .map_err(|e| {
            Error::Config(format!(
                "could not read private key {}: {}",
                private_key_file.display(),
                e
            ))
        })?;
    builder
        .set_certificate_chain_file(certificate_file)
        .map_err(|e| {
            Error::Config(format!(
                "could not read certificate {}: {}",
                certificate_file.display(),
                e
            ))
        })?;
    builder
        .check_private_key()
        .map_err(|e| Error::Config(format!("private key does not match certificate: {}", e)))?;
    Ok(builder.build())
}

pub struct BoringTlsSession {
    stream: SslStream<HandshakeTransport>,
}

impl BoringTlsSession {
    /// A fresh server session in accept state.
    pub fn new(ctx: &SslContext) -> Result<Self> {
        let mut ssl = Ssl::new(ctx)?;
        ssl.set_accept_state();
        let stream = SslStream::new(ssl, HandshakeTransport::new())?;
        Ok(Self { stream })
    }

    fn negotiated_suite(&self) -> Option<(Prf, AeadAlgorithm)> {
        let cipher = self.stream.ssl().current_cipher()?;
        // SAFETY: `cipher` borrows from the live SSL object.
        let id = unsafe { boring_sys::SSL_CIPHER_get_protocol_id(cipher.as_ptr()) };
        suite_algorithms(id)
    }
}

impl TlsSession for BoringTlsSession {
    fn transport(&self) -> &HandshakeTransport {
        self.stream.get_ref()
    }

    fn transport_mut(&mut self) -> &mut HandshakeTransport {
        self.stream.get_mut()
    }

    fn do_handshake(&mut self) -> Result<HandshakeStatus> {
        match self.stream.do_handshake() {
            Ok(()) => Ok(HandshakeStatus::Complete),
            Err(e) if e.code() == ErrorCode::WANT_READ || e.code() == ErrorCode::WANT_WRITE => {
                Ok(HandshakeStatus::WouldBlock)
            }
            Err(e) => {
                debug!(error = %e, "TLS handshake step failed");
                Err(Error::Handshake(e.to_string()))
            }
        }
    }

    fn negotiated_prf(&self) -> Option<Prf> {
        self.negotiated_suite().map(|(prf, _)| prf)
    }

    fn negotiated_aead(&self) -> Option<AeadAlgorithm> {
        self.negotiated_suite().map(|(_, aead)| aead)
    }

    fn export_secret(&self, label: &str, out: &mut [u8]) -> Result<()> {
        self.stream.ssl().export_keying_material(out, label, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_schedule::{CLIENT_1RTT_LABEL, SERVER_1RTT_LABEL};
    use boring::asn1::Asn1Time;
    use boring::ec::{EcGroup, EcKey};
    use boring::hash::MessageDigest;
    use boring::nid::Nid;
    use boring::pkey::{PKey, Private};
    use boring::ssl::SslVerifyMode;
    use boring::x509::{X509NameBuilder, X509};

    fn self_signed() -> (PKey<Private>, X509) {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();

        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "localhost").unwrap();
        let name = name.build();

        let mut cert = X509::builder().unwrap();
        cert.set_version(2).unwrap();
        cert.set_subject_name(&name).unwrap();
        cert.set_issuer_name(&name).unwrap();
        cert.set_pubkey(&key).unwrap();
        cert.set_not_before(&Asn1Time::days_from_now(0).unwrap()).unwrap();
        cert.set_not_after(&Asn1Time::days_from_now(1).unwrap()).unwrap();
        cert.sign(&key, MessageDigest::sha256()).unwrap();
        (key, cert.build())
    }

    fn server_session() -> BoringTlsSession {
        let (key, cert) = self_signed();
        let mut builder = server_context_builder().unwrap();
        builder.set_private_key(&key).unwrap();
        builder.set_certificate(&cert).unwrap();
        BoringTlsSession::new(&builder.build()).unwrap()
    }

    fn client_stream() -> SslStream<HandshakeTransport> {
        let mut builder = SslContext::builder(SslMethod::tls()).unwrap();
        builder.set_min_proto_version(Some(SslVersion::TLS1_3)).unwrap();
        builder.set_verify(SslVerifyMode::NONE);
        let mut ssl = Ssl::new(&builder.build()).unwrap();
        ssl.set_connect_state();
        SslStream::new(ssl, HandshakeTransport::new()).unwrap()
    }

    /// Shuttle bytes between client and server until both are done.
    fn run_handshake(server: &mut BoringTlsSession, client: &mut SslStream<HandshakeTransport>) {
        let mut server_done = false;
        let mut client_done = false;
        for _ in 0..16 {
            if !client_done {
                client_done = client.do_handshake().is_ok();
            }
            let c2s = client.get_mut().outbound.take_unread().to_vec();
            server.transport_mut().inbound.append(&c2s);

            if !server_done {
                server_done = server.do_handshake().unwrap() == HandshakeStatus::Complete;
            }
            let s2c = server.transport_mut().outbound.take_unread().to_vec();
            client.get_mut().inbound.append(&s2c);

            if server_done && client_done {
                return;
            }
        }
        panic!("handshake did not converge");
    }

    #[test]
    fn test_server_waits_for_client_hello() {
        let mut server = server_session();
        assert_eq!(server.do_handshake().unwrap(), HandshakeStatus::WouldBlock);
        assert!(server.transport().outbound.unread().is_empty());
        assert_eq!(server.negotiated_prf(), None);
    }

    #[test]
    fn test_full_handshake_agrees_on_exported_secrets() {
        let mut server = server_session();
        let mut client = client_stream();
        run_handshake(&mut server, &mut client);

        let prf = server.negotiated_prf().expect("suite negotiated");
        assert!(server.negotiated_aead().is_some());

        for label in [SERVER_1RTT_LABEL, CLIENT_1RTT_LABEL] {
            let mut ours = vec![0u8; prf.digest_len()];
            let mut theirs = vec![0u8; prf.digest_len()];
            server.export_secret(label, &mut ours).unwrap();
            client.ssl().export_keying_material(&mut theirs, label, None).unwrap();
            assert_eq!(ours, theirs, "exporter mismatch for {}", label);
        }
    }

    #[test]
    fn test_garbage_client_hello_is_fatal() {
        let mut server = server_session();
        server
            .transport_mut()
            .inbound
            .append(&[0x16, 0x03, 0x01, 0x00, 0x05, 0xff, 0xff, 0xff, 0xff, 0xff]);
        assert!(matches!(server.do_handshake(), Err(Error::Handshake(_))));
    }

    #[test]
    fn test_missing_key_file_is_config_error() {
        let err = create_ssl_context(
            Path::new("/nonexistent/key.pem"),
            Path::new("/nonexistent/cert.pem"),
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
