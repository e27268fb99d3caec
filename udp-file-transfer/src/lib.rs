//! `udp-file-transfer`: reliable single-file transfer over UDP.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐  name, chunks  ┌──────────┐
//!  │  Sender  │───────────────▶│ Receiver │
//!  └────┬─────┘                └─────┬────┘
//!       │                            │
//!       │       ACK / NAK            │
//!       │◀───────────────────────────┘
//!       │
//!  ┌────▼──────────────────────────────┐
//!  │            transfer               │
//!  │  (send / receive session loops)   │
//!  └────┬──────────────────────────────┘
//!       │ raw UDP datagrams
//!  ┌────▼──────┐
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! The protocol is stop-and-wait: exactly one packet is in flight, every
//! packet carries a CRC-32 over the full 1000-byte packet buffer, and the
//! sender resends on timeout or negative acknowledgement until it sees an ACK.
//!
//! Each module has a single responsibility:
//! - [`packet`]: wire format, checksum, flags
//! - [`chunker`]: splitting the source into FIN-terminated chunks
//! - [`sender`]: stop-and-wait outbound packet state
//! - [`receiver`]: inbound validation and receive-side state machine
//! - [`state`]: finite-state-machine types
//! - [`transfer`]: socket-driving session loops for both roles
//! - [`config`]: timeouts, retry ceiling, output directory
//! - [`error`]: session-level error type
//! - [`simulator`]: optional lossy/corrupting network layer for testing
//! - [`socket`]: async UDP socket abstraction

pub mod chunker;
pub mod config;
pub mod error;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod transfer;

pub use config::{ReceiverConfig, SenderConfig};
pub use error::TransferError;
pub use sender::SendReport;
pub use transfer::{receive_file, send_file, send_stream, ReceiveReport};
