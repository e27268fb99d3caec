//! Session-level error type.

use thiserror::Error;

use crate::packet::PacketError;
use crate::socket::SocketError;

/// Errors that end a transfer.
///
/// Corruption and loss never show up here; they are absorbed by the
/// acknowledge/retransmit cycle.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Socket(#[from] SocketError),
    /// Local file or address-resolution failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Packet(#[from] PacketError),
    /// Only possible when a retry ceiling is configured.
    #[error("no acknowledgement after {attempts} transmissions")]
    RetriesExhausted { attempts: u32 },
    #[error("could not resolve {0}")]
    Resolve(String),
}
