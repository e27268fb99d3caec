//! Inbound packet validation and the receive-side state machine.
//!
//! The [`Receiver`] is responsible for everything that happens between a raw
//! datagram arriving and bytes reaching the output file:
//! - Verifying every datagram's checksum before looking at it.
//! - Deciding between a positive and a negative acknowledgement.
//! - Interpreting the first valid payload as the file name.
//! - Handing data payloads on, and noticing the FIN flag.
//!
//! The [`Receiver`] does **not** send ACKs or write files itself; it returns a
//! [`Delivery`] that [`crate::transfer`] acts on.

use crate::packet::{self, flags, Packet};
use crate::state::ReceiverState;

/// The outcome of one inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Checksum mismatch (or malformed datagram): NAK, nothing delivered.
    Rejected,
    /// Valid packet 0: the output file name, filler trimmed.
    FileName(String),
    /// Valid data packet.  `fin` marks the last chunk.
    Data { payload: Vec<u8>, fin: bool },
    /// Valid packet after the transfer finished (a retransmitted FIN whose
    /// ACK was lost).  Acknowledged, never written.
    AfterFin,
}

impl Delivery {
    /// The acknowledgement to send back for this outcome.
    pub fn ack(&self) -> Packet {
        Packet::ack(!matches!(self, Delivery::Rejected))
    }
}

/// Stop-and-wait receive-side state for one transfer.
#[derive(Debug, Default)]
pub struct Receiver {
    pub state: ReceiverState,
    accepted: u64,
    rejected: u64,
    bytes: u64,
}

impl Receiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and interpret one datagram, advancing the state machine.
    ///
    /// Invalid datagrams never change state.
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Delivery {
        if !packet::verify(datagram) {
            self.rejected += 1;
            return Delivery::Rejected;
        }
        let pkt = match packet::decode(datagram, datagram.len()) {
            Ok(pkt) => pkt,
            Err(_) => {
                self.rejected += 1;
                return Delivery::Rejected;
            }
        };
        self.accepted += 1;

        match self.state {
            ReceiverState::AwaitingFileName => {
                self.state = ReceiverState::ReceivingData;
                Delivery::FileName(parse_file_name(&pkt.payload))
            }
            ReceiverState::ReceivingData => {
                let fin = pkt.is_set(flags::FIN);
                if fin {
                    self.state = ReceiverState::Done;
                }
                self.bytes += pkt.payload.len() as u64;
                Delivery::Data {
                    payload: pkt.payload,
                    fin,
                }
            }
            ReceiverState::Done => Delivery::AfterFin,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == ReceiverState::Done
    }

    /// Valid packets seen, including packet 0.
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Datagrams answered with a NAK.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Payload bytes handed on as file data.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Decode a file-name payload, dropping padding and surrounding whitespace.
pub fn parse_file_name(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .trim_matches(|c: char| c == '\0' || c.is_control() || c.is_whitespace())
        .to_string()
}
