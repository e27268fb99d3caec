//! Transfer sessions: the socket-driving loops for both roles.
//!
//! A session owns the complete state for one file transfer.  Its
//! responsibilities are:
//! - Driving the state machines in [`crate::sender`] / [`crate::receiver`].
//! - Moving datagrams through the [`Socket`].
//! - Running the acknowledgement timeout on the send side.
//! - Opening, writing and closing the local files.
//!
//! Both loops are strictly sequential: one datagram in flight, no spawned
//! tasks.
//!
//! ```ignore
//! // receiving peer
//! let socket = Socket::bind("0.0.0.0:9000".parse()?).await?;
//! let report = receive_file(&socket, &ReceiverConfig::default()).await?;
//!
//! // sending peer
//! let socket = Socket::bind("0.0.0.0:0".parse()?).await?;
//! send_file(&socket, peer, "data.bin", "copy.bin", &SenderConfig::default()).await?;
//! ```

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::{Component, Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt, BufReader, BufWriter};
use tokio::time::{timeout, timeout_at, Instant};

use crate::chunker::{chunk_count, ChunkReader};
use crate::config::{ReceiverConfig, SenderConfig};
use crate::error::TransferError;
use crate::packet::{Datagram, MAX_PAYLOAD};
use crate::receiver::{Delivery, Receiver};
use crate::sender::{Outbound, SendReport, Sender};
use crate::socket::{Socket, SocketError};

// ---------------------------------------------------------------------------
// Send side
// ---------------------------------------------------------------------------

/// Send the file at `source` to `peer`, asking it to store the bytes as
/// `dest_name`.
pub async fn send_file(
    socket: &Socket,
    peer: SocketAddr,
    source: impl AsRef<Path>,
    dest_name: &str,
    config: &SenderConfig,
) -> Result<SendReport, TransferError> {
    let file = File::open(source.as_ref()).await?;
    let len = file.metadata().await?.len();
    log::info!(
        "[send] {} → {peer} as {dest_name:?} ({len} bytes, {} chunk(s))",
        source.as_ref().display(),
        chunk_count(len, MAX_PAYLOAD)
    );
    send_stream(socket, peer, BufReader::new(file), dest_name, config).await
}

/// Send everything `reader` yields to `peer` under `dest_name`.
///
/// Packet 0 carries the name; the data follows one acknowledged chunk at a
/// time and the last chunk carries FIN.  Returns once the FIN chunk is
/// acknowledged.
pub async fn send_stream<R: AsyncRead + Unpin>(
    socket: &Socket,
    peer: SocketAddr,
    reader: R,
    dest_name: &str,
    config: &SenderConfig,
) -> Result<SendReport, TransferError> {
    let mut sender = Sender::new();

    let name = Sender::file_name_packet(dest_name)?;
    deliver(socket, peer, &mut sender, name, Outbound::FileName, config).await?;
    log::debug!("[send] file name acknowledged");

    let mut chunks = ChunkReader::new(reader);
    while let Some(chunk) = chunks.next_chunk().await? {
        let kind = Outbound::Chunk {
            len: chunk.data.len(),
            fin: chunk.fin,
        };
        let datagram = Sender::data_packet(&chunk.data, chunk.fin)?;
        deliver(socket, peer, &mut sender, datagram, kind, config).await?;
    }

    let report = sender.report();
    log::info!(
        "[send] done: {} chunk(s), {} byte(s), {} retransmission(s)",
        report.chunks,
        report.bytes,
        report.retransmissions
    );
    Ok(report)
}

/// Transmit `datagram` and keep resending it until the peer acknowledges it.
///
/// A timeout and a negative acknowledgement are handled identically.
async fn deliver(
    socket: &Socket,
    peer: SocketAddr,
    sender: &mut Sender,
    datagram: Datagram,
    kind: Outbound,
    config: &SenderConfig,
) -> Result<(), TransferError> {
    log::debug!("[send] → {kind:?} len={}", datagram.len());
    socket.send_datagram(datagram.as_bytes(), peer).await?;
    sender.record_sent(datagram, kind);

    loop {
        match timeout(config.ack_timeout, socket.recv_datagram()).await {
            Ok(Ok((bytes, from))) => {
                if from == peer && sender.on_response(&bytes) {
                    log::debug!("[send] ← ACK; {}", sender.state);
                    return Ok(());
                }
                log::debug!("[send] ← not an ACK ({} bytes from {from})", bytes.len());
            }
            Ok(Err(SocketError::Io(e))) if is_transient_io_error(&e) => {
                log::debug!("[send] transient receive error: {e}");
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => {
                log::trace!("[send] ack timeout");
            }
        }

        let attempts = sender.retransmit_count();
        if let Some(max) = config.max_retries {
            if attempts > max {
                return Err(TransferError::RetriesExhausted { attempts });
            }
        }

        if let Some(resend) = sender.on_retransmit() {
            log::debug!("[send] ↻ retransmit #{attempts} {kind:?}");
            socket.send_datagram(resend.as_bytes(), peer).await?;
        }
    }
}

/// Returns true for receive errors that an ICMP reply can surface on a UDP
/// socket; the peer may simply not be listening yet.
fn is_transient_io_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

// ---------------------------------------------------------------------------
// Receive side
// ---------------------------------------------------------------------------

/// Summary of a completed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveReport {
    /// Name carried by packet 0.
    pub file_name: String,
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Bytes written to `path`.
    pub bytes: u64,
    /// Valid packets, including packet 0.
    pub packets: u64,
    /// Datagrams answered with a NAK.
    pub rejected: u64,
}

/// Receive one file on `socket` and store it under `config.output_dir`.
///
/// Blocks without a timeout until a valid packet carrying FIN arrives.
pub async fn receive_file(
    socket: &Socket,
    config: &ReceiverConfig,
) -> Result<ReceiveReport, TransferError> {
    let mut receiver = Receiver::new();
    let mut output: Option<(String, PathBuf, BufWriter<File>)> = None;
    log::info!("[recv] waiting on {}", socket.local_addr);

    while !receiver.is_done() {
        let (bytes, from) = next_datagram(socket).await?;
        let delivery = receiver.on_datagram(&bytes);
        socket.send_datagram(&delivery.ack().to_bytes(), from).await?;

        match delivery {
            Delivery::Rejected => {
                log::warn!(
                    "[recv] ← corrupt datagram ({} bytes) from {from}; → NAK",
                    bytes.len()
                );
            }
            Delivery::FileName(name) => {
                let path = output_path(&config.output_dir, &name)?;
                let file = File::create(&path).await?;
                log::info!(
                    "[recv] ← {from} sending {name:?}; writing {} ({})",
                    path.display(),
                    receiver.state
                );
                output = Some((name, path, BufWriter::new(file)));
            }
            Delivery::Data { payload, fin } => {
                log::debug!("[recv] ← DATA len={} fin={fin}; → ACK", payload.len());
                if let Some((_, _, writer)) = output.as_mut() {
                    writer.write_all(&payload).await?;
                }
            }
            Delivery::AfterFin => {}
        }
    }

    let (file_name, path, mut writer) = match output {
        Some(output) => output,
        None => return Err(TransferError::Io(ErrorKind::UnexpectedEof.into())),
    };
    writer.shutdown().await?;

    if !config.linger.is_zero() {
        linger(socket, &mut receiver, config).await?;
    }

    let report = ReceiveReport {
        file_name,
        path,
        bytes: receiver.bytes(),
        packets: receiver.accepted(),
        rejected: receiver.rejected(),
    };
    log::info!(
        "[recv] done: {} byte(s) in {} packet(s), {} rejected",
        report.bytes,
        report.packets,
        report.rejected
    );
    Ok(report)
}

/// Receive the next datagram, skipping transient ICMP-style errors.
async fn next_datagram(socket: &Socket) -> Result<(Vec<u8>, SocketAddr), SocketError> {
    loop {
        match socket.recv_datagram().await {
            Ok(received) => return Ok(received),
            Err(SocketError::Io(e)) if is_transient_io_error(&e) => {
                log::debug!("[recv] transient receive error: {e}");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Place `name` inside `dir`.
///
/// Only plain relative names are accepted: no root, prefix, `.` or `..`
/// components, so the file cannot land outside `dir`.
fn output_path(dir: &Path, name: &str) -> Result<PathBuf, TransferError> {
    let relative = Path::new(name);
    let plain = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if name.is_empty() || !plain {
        log::warn!("[recv] refusing file name {name:?}");
        return Err(TransferError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("file name {name:?} is not a plain relative path"),
        )));
    }
    Ok(dir.join(relative))
}

/// Keep answering retransmitted FIN packets until `config.linger` elapses,
/// so a lost final ACK cannot strand the sender.
async fn linger(
    socket: &Socket,
    receiver: &mut Receiver,
    config: &ReceiverConfig,
) -> Result<(), TransferError> {
    let deadline = Instant::now() + config.linger;
    while let Ok(result) = timeout_at(deadline, next_datagram(socket)).await {
        let (bytes, from) = result?;
        let delivery = receiver.on_datagram(&bytes);
        log::debug!("[recv] lingering: {delivery:?}");
        socket.send_datagram(&delivery.ack().to_bytes(), from).await?;
    }
    Ok(())
}
