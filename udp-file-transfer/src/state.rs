//! Finite-state-machine types for both transfer roles.
//!
//! Transitions live in [`crate::sender`] and [`crate::receiver`]; this module
//! only names the states.

use std::fmt;

/// Receive-side lifecycle.
///
/// ```text
///  AWAITING_FILE_NAME ──valid packet 0──▶ RECEIVING_DATA ──valid FIN──▶ DONE
///         │  ▲                               │  ▲
///         └──┘ corrupt: NAK, stay            └──┘ corrupt: NAK, stay
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReceiverState {
    /// No packet validated yet; the first valid payload names the file.
    #[default]
    AwaitingFileName,
    /// File open; valid payloads are appended to it.
    ReceivingData,
    /// FIN seen on a valid packet; the output is closed.
    Done,
}

/// Send-side lifecycle.
///
/// ```text
///  SENDING_FILE_NAME ──▶ AWAITING_ACK ──ACK──▶ SENDING_DATA ──▶ AWAITING_ACK
///                          │  ▲                                  │  ▲   │
///                          └──┘ timeout / NAK: resend            └──┘   │ ACK of FIN
///                                                                       ▼
///                                                                   FINISHED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SenderState {
    /// Nothing sent yet; packet 0 (the file name) is next.
    #[default]
    SendingFileName,
    /// Idle between chunks; the next chunk may be sent.
    SendingData,
    /// One packet in flight, waiting for its acknowledgement.
    AwaitingAck,
    /// The FIN chunk was acknowledged.
    Finished,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
