//! Outbound packet state for stop-and-wait reliability.
//!
//! [`Sender`] tracks the single in-flight packet and the send-side FSM.
//! It does **not** touch the socket; [`crate::transfer`] calls these methods
//! and owns the actual send/receive loop.
//!
//! # Stop-and-Wait contract
//! - At most **one** packet is in flight at any moment (`unacked`).
//! - A new packet may only be sent once `unacked` is `None`.
//! - On ACK: clear `unacked`; advance to the next chunk or finish.
//! - On timeout or NAK: increment `tx_count`; resend the same bytes unchanged.

use crate::packet::{self, flags, Datagram, PacketError, MAX_PAYLOAD};
use crate::state::SenderState;

// ---------------------------------------------------------------------------
// RetransmitEntry
// ---------------------------------------------------------------------------

/// What an in-flight packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outbound {
    /// Packet 0: the destination file name.
    FileName,
    /// A chunk of file data.
    Chunk { len: usize, fin: bool },
}

/// A packet that has been sent but not yet acknowledged.
#[derive(Debug, Clone)]
pub struct RetransmitEntry {
    /// The encoded packet, resent verbatim on every retry.
    pub datagram: Datagram,
    pub kind: Outbound,
    /// How many times this packet has been transmitted (1 = first send).
    pub tx_count: u32,
}

// ---------------------------------------------------------------------------
// SendReport
// ---------------------------------------------------------------------------

/// Summary of a completed send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    /// Data chunks acknowledged (the file-name packet is not counted).
    pub chunks: u64,
    /// File bytes acknowledged.
    pub bytes: u64,
    /// Every datagram transmitted, including the file name and retries.
    pub transmissions: u64,
    /// Transmissions beyond the first attempt of each packet.
    pub retransmissions: u64,
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Stop-and-wait send-side state for one transfer.
#[derive(Debug, Default)]
pub struct Sender {
    pub state: SenderState,
    /// The in-flight packet, or `None` when the sender is idle.
    pub unacked: Option<RetransmitEntry>,
    report: SendReport,
}

impl Sender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode packet 0 for `name`.
    ///
    /// Names longer than one payload are cut at the last character boundary
    /// that fits.  Packet 0 never carries FIN.
    pub fn file_name_packet(name: &str) -> Result<Datagram, PacketError> {
        packet::encode(truncate_name(name).as_bytes(), false)
    }

    /// Encode one chunk of file data.
    pub fn data_packet(chunk: &[u8], fin: bool) -> Result<Datagram, PacketError> {
        packet::encode(chunk, fin)
    }

    /// Move `datagram` into the in-flight slot (first transmission).
    ///
    /// Panics in debug mode if a packet is already in flight.
    pub fn record_sent(&mut self, datagram: Datagram, kind: Outbound) {
        debug_assert!(
            self.unacked.is_none(),
            "record_sent called while a packet is already in flight"
        );
        self.unacked = Some(RetransmitEntry {
            datagram,
            kind,
            tx_count: 1,
        });
        self.report.transmissions += 1;
        self.state = SenderState::AwaitingAck;
    }

    /// Process a datagram received while waiting.
    ///
    /// Returns `true` when it is a positive acknowledgement for the in-flight
    /// packet.  Anything else (a NAK, a runt, or a stray datagram while idle)
    /// returns `false` and leaves the in-flight packet in place.
    pub fn on_response(&mut self, response: &[u8]) -> bool {
        let Some(entry) = self.unacked.as_ref() else {
            return false;
        };
        let acked = match packet::decode(response, response.len()) {
            Ok(pkt) => pkt.is_set(flags::ACK),
            Err(_) => false,
        };
        if !acked {
            return false;
        }

        self.state = match entry.kind {
            Outbound::FileName => SenderState::SendingData,
            Outbound::Chunk { len, fin } => {
                self.report.chunks += 1;
                self.report.bytes += len as u64;
                if fin {
                    SenderState::Finished
                } else {
                    SenderState::SendingData
                }
            }
        };
        self.unacked = None;
        true
    }

    /// Increment the retransmit count and return the bytes to resend.
    ///
    /// Returns `None` when nothing is in flight.
    pub fn on_retransmit(&mut self) -> Option<&Datagram> {
        let entry = self.unacked.as_mut()?;
        entry.tx_count += 1;
        self.report.transmissions += 1;
        self.report.retransmissions += 1;
        Some(&entry.datagram)
    }

    /// Returns the number of times the in-flight packet has been sent,
    /// or `0` if the sender is idle.
    pub fn retransmit_count(&self) -> u32 {
        self.unacked.as_ref().map_or(0, |e| e.tx_count)
    }

    /// `true` when a packet is waiting for an ACK.
    pub fn has_unacked(&self) -> bool {
        self.unacked.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.state == SenderState::Finished
    }

    pub fn report(&self) -> SendReport {
        self.report
    }
}

/// Longest prefix of `name` that fits one payload without splitting a
/// UTF-8 sequence.
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_PAYLOAD {
        return name;
    }
    let mut end = MAX_PAYLOAD;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
