//! Wire-format definitions for file-transfer packets.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (checksum, flags, payload).
//! - Encoding a payload into a [`Datagram`] ready for transmission.
//! - Decoding a raw byte slice back into a [`Packet`].
//! - Verifying the CRC-32 integrity check.
//!
//! No I/O happens here.  Both the sending and receiving side use these
//! functions, so framing is byte-identical.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Checksum                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Flags     |              Payload (≤ 995 bytes) ...        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 5 bytes.
//!
//! # Checksum
//!
//! The checksum is a CRC-32 (IEEE) over the whole [`PACKET_BUFFER_SIZE`]-byte
//! physical buffer with the checksum field zeroed.  Bytes past the used
//! prefix are always zero, so a peer can verify a short datagram by
//! zero-extending it to the physical size.

use std::fmt;

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Acknowledgement: the previous packet arrived intact.
    pub const ACK: u8 = 0b0000_0001;
    /// Finish: this packet carries the last chunk of the file.
    pub const FIN: u8 = 0b0000_0010;
}

/// Size of the physical packet buffer; also the largest datagram on the wire.
pub const PACKET_BUFFER_SIZE: usize = 1000;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 5;

/// Largest payload that fits behind the header.
pub const MAX_PAYLOAD: usize = PACKET_BUFFER_SIZE - HEADER_LEN;

// Byte offsets of each field within the serialised header.
const OFF_CHECKSUM: usize = 0;
const OFF_FLAGS: usize = 4;

/// Fixed-size protocol header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// CRC-32 as carried on the wire.  Always `0` on acknowledgements.
    pub checksum: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
}

/// A decoded protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build the acknowledgement for a received packet.
    ///
    /// `accepted == false` produces a negative acknowledgement (ACK bit clear).
    pub fn ack(accepted: bool) -> Self {
        Packet {
            header: Header {
                checksum: 0,
                flags: if accepted { flags::ACK } else { 0 },
            },
            payload: Vec::new(),
        }
    }

    /// Serialise this packet header-first, exactly as given.
    ///
    /// No checksum is computed; use [`encode`] for data packets.  This is the
    /// path acknowledgements take, whose checksum field is unused.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_LEN + self.payload.len());
        buf.extend_from_slice(&self.header.checksum.to_be_bytes());
        buf.push(self.header.flags);
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// `true` when every bit of `mask` is set in this packet's flags.
    pub fn is_set(&self, mask: u8) -> bool {
        is_set(self.header.flags, mask)
    }
}

/// An encoded data packet: the full zero-padded physical buffer plus the
/// number of bytes that go on the wire.
#[derive(Clone, PartialEq, Eq)]
pub struct Datagram {
    buf: [u8; PACKET_BUFFER_SIZE],
    len: usize,
}

impl Datagram {
    /// The bytes to transmit (header + payload, no trailing filler).
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// The whole physical buffer the checksum was computed over.
    pub fn physical(&self) -> &[u8; PACKET_BUFFER_SIZE] {
        &self.buf
    }

    /// Wire length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` only for a zero-length wire image; [`encode`] always emits at
    /// least the header, so its datagrams are never empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn checksum(&self) -> u32 {
        read_checksum(&self.buf)
    }

    pub fn flags(&self) -> u8 {
        self.buf[OFF_FLAGS]
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_LEN..self.len]
    }
}

impl fmt::Debug for Datagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datagram")
            .field("checksum", &format_args!("{:#010x}", self.checksum()))
            .field("flags", &format_args!("{:#04x}", self.flags()))
            .field("payload_len", &(self.len - HEADER_LEN))
            .finish()
    }
}

/// Errors that can arise when framing or parsing a datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    /// Payload does not fit behind the header.
    #[error("payload of {0} bytes exceeds the {max}-byte maximum", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),
    /// Buffer shorter than the fixed header size.
    #[error("buffer too short to contain a header")]
    BufferTooShort,
    /// Buffer longer than the physical packet size.
    #[error(
        "datagram of {0} bytes exceeds the {max}-byte packet buffer",
        max = PACKET_BUFFER_SIZE
    )]
    BufferTooLong(usize),
}

/// Encode `payload` into a data packet.
///
/// The checksum field is zero while the CRC is computed over the full
/// physical buffer, then overwritten with the result.  The ACK bit is never
/// set here; only acknowledgements carry it.
pub fn encode(payload: &[u8], is_fin: bool) -> Result<Datagram, PacketError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(PacketError::PayloadTooLarge(payload.len()));
    }

    let mut buf = [0u8; PACKET_BUFFER_SIZE];
    buf[OFF_FLAGS] = if is_fin { flags::FIN } else { 0 };
    buf[HEADER_LEN..HEADER_LEN + payload.len()].copy_from_slice(payload);

    let csum = checksum(&buf);
    buf[OFF_CHECKSUM..OFF_CHECKSUM + 4].copy_from_slice(&csum.to_be_bytes());

    Ok(Datagram {
        buf,
        len: HEADER_LEN + payload.len(),
    })
}

/// Parse the first `length` bytes of `buf` into a [`Packet`].
///
/// This does **not** judge integrity; call [`verify`] for that.
pub fn decode(buf: &[u8], length: usize) -> Result<Packet, PacketError> {
    if length < HEADER_LEN || buf.len() < length {
        return Err(PacketError::BufferTooShort);
    }
    if length > PACKET_BUFFER_SIZE {
        return Err(PacketError::BufferTooLong(length));
    }

    Ok(Packet {
        header: Header {
            checksum: read_checksum(buf),
            flags: buf[OFF_FLAGS],
        },
        payload: buf[HEADER_LEN..length].to_vec(),
    })
}

/// Recompute the CRC over `buf` (zero-extended to the physical packet size,
/// checksum field zeroed) and compare it with the stored checksum.
pub fn verify(buf: &[u8]) -> bool {
    if buf.len() < HEADER_LEN || buf.len() > PACKET_BUFFER_SIZE {
        return false;
    }
    checksum(buf) == read_checksum(buf)
}

/// Bitwise flag test.
#[inline]
pub fn is_set(flags: u8, mask: u8) -> bool {
    flags & mask == mask
}

/// CRC-32 of `buf` as if it were a [`PACKET_BUFFER_SIZE`]-byte buffer with a
/// zeroed checksum field.
///
/// `buf` must hold at least the header.  Missing trailing bytes count as zero.
pub fn checksum(buf: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&[0u8; 4]);
    hasher.update(&buf[OFF_FLAGS..]);
    let padding = PACKET_BUFFER_SIZE.saturating_sub(buf.len());
    hasher.update(&ZEROES[..padding]);
    hasher.finalize()
}

/// Uppercase hex rendering of `bytes`, used for trace-level packet dumps.
pub fn hex_dump(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

static ZEROES: [u8; PACKET_BUFFER_SIZE] = [0u8; PACKET_BUFFER_SIZE];

fn read_checksum(buf: &[u8]) -> u32 {
    let mut field = [0u8; 4];
    field.copy_from_slice(&buf[OFF_CHECKSUM..OFF_CHECKSUM + 4]);
    u32::from_be_bytes(field)
}
