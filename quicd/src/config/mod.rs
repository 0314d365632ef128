//! Server configuration module.
//!
//! The server takes exactly four positional arguments:
//!
//! ```text
//! quicd ADDR PORT PRIVATE_KEY_FILE CERTIFICATE_FILE
//! ```
//!
//! Everything else is fixed. [`ServerConfig`] is built from [`CliArgs`] and
//! validated with [`ConfigValidator`] before any socket is opened.

pub mod validation;


pub use validation::ConfigValidator;

use anyhow::Result;
use clap::Parser;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

/// Idle deadline armed when a connection is admitted. Never refreshed.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Receive buffer for one datagram.
pub const RECV_BUFFER_SIZE: usize = 65536;

/// Command-line interface for the server.
#[derive(Parser, Debug, Clone)]
#[command(author, about, long_about = None)]
pub struct CliArgs {
    /// Host name or address to bind to
    pub addr: String,

    /// UDP port to bind to
    pub port: u16,

    /// PEM private key file
    pub private_key_file: PathBuf,

    /// PEM certificate chain file
    pub certificate_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub private_key_file: PathBuf,
    pub certificate_file: PathBuf,
    pub idle_timeout: Duration,
    pub recv_buffer_size: usize,
}

impl From<CliArgs> for ServerConfig {
    fn from(args: CliArgs) -> Self {
        Self {
            host: args.addr,
            port: args.port,
            private_key_file: args.private_key_file,
            certificate_file: args.certificate_file,
            idle_timeout: IDLE_TIMEOUT,
            recv_buffer_size: RECV_BUFFER_SIZE,
        }
    }
}

impl ServerConfig {
    /// Resolve `host:port` into every candidate bind address, in resolver
    /// order.
    pub fn bind_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        Ok((self.host.as_str(), self.port).to_socket_addrs()?.collect())
    }
}

/// Parse the command line and validate it.
///
/// Missing arguments make clap print usage to stderr and exit non-zero.
pub fn load_config() -> Result<ServerConfig> {
    let config = ServerConfig::from(CliArgs::parse());

    config.validate().map_err(|errors| {
        anyhow::anyhow!("Configuration validation failed:\n{}", errors.join("\n"))
    })?;

    Ok(config)
}
