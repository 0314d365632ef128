//! Configuration validation.

use super::ServerConfig;

/// Configuration validator trait.
pub trait ConfigValidator {
    /// Validate the configuration.
    ///
    /// Returns `Ok(())` if valid, or a list of error messages if invalid.
    fn validate(&self) -> Result<(), Vec<String>>;
}

impl ConfigValidator for ServerConfig {
    fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push("Bind address must not be empty".to_string());
        }

        if self.port == 0 {
            errors.push("Port must be non-zero".to_string());
        }

        if !self.private_key_file.is_file() {
            errors.push(format!(
                "Private key file not found: {}",
                self.private_key_file.display()
            ));
        }

        if !self.certificate_file.is_file() {
            errors.push(format!(
                "Certificate file not found: {}",
                self.certificate_file.display()
            ));
        }

        if self.idle_timeout.is_zero() {
            errors.push("Idle timeout must be non-zero".to_string());
        }

        if self.recv_buffer_size < quicd_quic::MAX_PKTLEN_IPV4 {
            errors.push(format!(
                "Receive buffer ({}) smaller than the largest packet ({})",
                self.recv_buffer_size,
                quicd_quic::MAX_PKTLEN_IPV4
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
