//! # Protocol Engine Interface
//!
//! The engine is a sans-IO state machine. The server feeds it datagrams and
//! asks it for datagrams; everything the engine needs from the outside
//! (handshake bytes, key material, AEAD) it obtains through
//! [`TransportCallbacks`], which the caller passes into every
//! [`ProtocolEngine::recv`] and [`ProtocolEngine::send`] call.
//!
//! Callbacks that must reach back into the engine (signal handshake
//! completion, install keys) receive an [`EngineControl`] handle for the
//! duration of the callback.

pub mod state;


pub use state::ServerConnection;

use crate::error::Result;
use std::time::Instant;

/// Inbound control surface handed to callbacks.
pub trait EngineControl {
    /// The TLS layer reports the handshake as done. Idempotent.
    fn handshake_completed(&mut self);

    /// Install the key and IV used to protect outgoing packets.
    fn update_tx_keys(&mut self, key: &[u8], iv: &[u8]) -> Result<()>;

    /// Install the key and IV used to open incoming packets.
    fn update_rx_keys(&mut self, key: &[u8], iv: &[u8]) -> Result<()>;

    /// Per-packet AEAD expansion (tag length).
    fn set_aead_overhead(&mut self, overhead: usize);
}

/// Hooks the engine invokes while processing.
pub trait TransportCallbacks {
    /// Supply handshake bytes for a Server Cleartext packet.
    ///
    /// `pkt_num` is `Some` when the engine needs the initial packet number
    /// assigned; the returned bytes must then be non-empty.
    fn send_server_cleartext(
        &mut self,
        ctl: &mut dyn EngineControl,
        pkt_num: Option<&mut u64>,
    ) -> Result<&[u8]>;

    /// In-order handshake bytes extracted from a client packet.
    fn recv_handshake_data(&mut self, ctl: &mut dyn EngineControl, data: &[u8]) -> Result<()>;

    /// Called once, after the engine observes the completion signal.
    fn handshake_completed(&mut self, ctl: &mut dyn EngineControl) -> Result<()>;

    /// Seal `plaintext` into `dest`, returning the bytes written.
    fn encrypt(
        &mut self,
        dest: &mut [u8],
        plaintext: &[u8],
        key: &[u8],
        nonce: &[u8],
        ad: &[u8],
    ) -> Result<usize>;

    /// Open `ciphertext` into `dest`, returning the bytes written.
    fn decrypt(
        &mut self,
        dest: &mut [u8],
        ciphertext: &[u8],
        key: &[u8],
        nonce: &[u8],
        ad: &[u8],
    ) -> Result<usize>;
}

/// A server-side protocol engine instance.
pub trait ProtocolEngine {
    /// Process one inbound datagram.
    fn recv(
        &mut self,
        datagram: &[u8],
        now: Instant,
        callbacks: &mut dyn TransportCallbacks,
    ) -> Result<()>;

    /// Write the next outbound packet into `buf`. Returns 0 when there is
    /// nothing left to send.
    fn send(
        &mut self,
        buf: &mut [u8],
        now: Instant,
        callbacks: &mut dyn TransportCallbacks,
    ) -> Result<usize>;
}
