//! End-to-end transfers over loopback.
//!
//! Each test binds real `tokio::net::UdpSocket`s on `127.0.0.1`, runs the
//! receiving half in a background task writing into a temporary directory,
//! and drives the sending half from the test body.  Most fault injection
//! happens on the sending socket; the acknowledgement-path tests put the
//! simulator on the receiving socket instead.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;

use udp_file_transfer::chunker::chunk_count;
use udp_file_transfer::packet::{self, flags, Packet, MAX_PAYLOAD};
use udp_file_transfer::simulator::{Fate, Simulator, SimulatorConfig};
use udp_file_transfer::socket::Socket;
use udp_file_transfer::{
    receive_file, send_file, send_stream, ReceiveReport, ReceiverConfig, SenderConfig,
    TransferError,
};

const TEST_DEADLINE: Duration = Duration::from_secs(20);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn loopback() -> Socket {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind loopback socket")
}

/// A generous timeout keeps spurious retransmissions out of lossless runs.
fn patient() -> SenderConfig {
    SenderConfig::default().with_ack_timeout(Duration::from_millis(250))
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 256) as u8).collect()
}

/// Start a receiver writing into `dir`; returns its address and task.
async fn spawn_receiver(
    dir: &Path,
) -> (SocketAddr, JoinHandle<Result<ReceiveReport, TransferError>>) {
    spawn_receiver_on(loopback().await, dir)
}

fn spawn_receiver_on(
    socket: Socket,
    dir: &Path,
) -> (SocketAddr, JoinHandle<Result<ReceiveReport, TransferError>>) {
    let addr = socket.local_addr;
    let config = ReceiverConfig::default().with_output_dir(dir);
    let task = tokio::spawn(async move { receive_file(&socket, &config).await });
    (addr, task)
}

async fn finish(task: JoinHandle<Result<ReceiveReport, TransferError>>) -> ReceiveReport {
    tokio::time::timeout(TEST_DEADLINE, task)
        .await
        .expect("receiver timed out")
        .expect("receiver task panicked")
        .expect("receiver failed")
}

// ---------------------------------------------------------------------------
// Lossless channel
// ---------------------------------------------------------------------------

/// 2000 bytes travel as 995 + 995 + 10 (FIN) and arrive byte-identical.
#[tokio::test]
async fn two_thousand_byte_file_arrives_intact() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, receiver) = spawn_receiver(dir.path()).await;
    let data = pattern(2000);

    let sender = loopback().await;
    let report = tokio::time::timeout(
        TEST_DEADLINE,
        send_stream(&sender, addr, &data[..], "copy.bin", &patient()),
    )
    .await
    .expect("sender timed out")
    .expect("send failed");

    assert_eq!(report.chunks, 3);
    assert_eq!(report.bytes, 2000);
    assert_eq!(report.transmissions, 4, "file name + three chunks");
    assert_eq!(report.retransmissions, 0);
    assert_eq!(sender.datagrams_sent(), 4);

    let received = finish(receiver).await;
    assert_eq!(received.file_name, "copy.bin");
    assert_eq!(received.path, dir.path().join("copy.bin"));
    assert_eq!(received.bytes, 2000);
    assert_eq!(received.packets, 4);
    assert_eq!(received.rejected, 0);
    assert_eq!(std::fs::read(&received.path).unwrap(), data);
}

/// A file of exactly three chunks still ends with FIN and the receiver stops.
#[tokio::test]
async fn exact_multiple_of_chunk_size_terminates() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, receiver) = spawn_receiver(dir.path()).await;
    let data = pattern(MAX_PAYLOAD * 3);

    let sender = loopback().await;
    let report = send_stream(&sender, addr, &data[..], "exact.bin", &patient())
        .await
        .expect("send failed");
    assert_eq!(report.chunks, 3);

    let received = finish(receiver).await;
    assert_eq!(std::fs::read(received.path).unwrap(), data);
}

/// An empty source still produces a file: one empty FIN chunk.
#[tokio::test]
async fn empty_file_is_transferred() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, receiver) = spawn_receiver(dir.path()).await;

    let sender = loopback().await;
    let report = send_stream(&sender, addr, &b""[..], "empty.txt", &patient())
        .await
        .expect("send failed");
    assert_eq!(report.chunks, 1);
    assert_eq!(report.bytes, 0);

    let received = finish(receiver).await;
    assert_eq!(received.bytes, 0);
    assert!(std::fs::read(received.path).unwrap().is_empty());
}

/// `send_file` reads from disk and the receiver honours its output directory.
#[tokio::test]
async fn file_on_disk_round_trip() {
    let src_dir = tempfile::tempdir().unwrap();
    let out_dir = tempfile::tempdir().unwrap();
    let source = src_dir.path().join("source.dat");
    let data = pattern(12_345);
    std::fs::write(&source, &data).unwrap();

    let (addr, receiver) = spawn_receiver(out_dir.path()).await;
    let sender = loopback().await;
    let report = send_file(&sender, addr, &source, "dest.dat", &patient())
        .await
        .expect("send failed");
    assert_eq!(report.chunks, chunk_count(12_345, MAX_PAYLOAD));

    let received = finish(receiver).await;
    assert_eq!(received.path, out_dir.path().join("dest.dat"));
    assert_eq!(std::fs::read(received.path).unwrap(), data);
}

#[tokio::test]
async fn missing_source_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let sender = loopback().await;
    let peer = loopback().await.local_addr;

    let err = send_file(&sender, peer, dir.path().join("nope"), "x", &patient())
        .await
        .unwrap_err();
    assert!(matches!(err, TransferError::Io(_)), "got {err:?}");
    assert_eq!(sender.datagrams_sent(), 0);
}

// ---------------------------------------------------------------------------
// Faulty channel
// ---------------------------------------------------------------------------

/// The third datagram overall (the first data chunk) is corrupted once.
#[tokio::test]
async fn single_corruption_costs_one_extra_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, receiver) = spawn_receiver(dir.path()).await;
    let data = pattern(2000);

    // Sender datagram #1 is the third on the wire: name, ACK, chunk 1.
    let sender = loopback()
        .await
        .with_simulator(Simulator::new(SimulatorConfig::default().corrupt_at([1])));
    let report = send_stream(&sender, addr, &data[..], "c.bin", &patient())
        .await
        .expect("send failed");

    assert_eq!(report.transmissions, 5);
    assert_eq!(report.retransmissions, 1);

    let received = finish(receiver).await;
    assert_eq!(received.rejected, 1);
    assert_eq!(std::fs::read(received.path).unwrap(), data);
}

/// What the receiver's third datagram (the ACK for chunk 2) becomes when a
/// simulator seeded with `seed` corrupts it.
fn third_ack_under(seed: u64) -> Vec<u8> {
    let mut sim = Simulator::new(SimulatorConfig::default().corrupt_at([2]).with_seed(seed));
    let ack = Packet::ack(true).to_bytes();
    sim.apply(&ack);
    sim.apply(&ack);
    match sim.apply(&ack) {
        Fate::Corrupt(bytes) => bytes,
        other => panic!("expected corruption, got {other:?}"),
    }
}

/// First seed whose flipped bit leaves the ACK flag as `keeps_ack` says.
fn ack_seed(keeps_ack: bool) -> u64 {
    (0..10_000)
        .find(|&seed| packet::is_set(third_ack_under(seed)[4], flags::ACK) == keeps_ack)
        .expect("no matching seed")
}

/// A corrupted acknowledgement whose ACK bit survives is still an ACK: the
/// sender only reads that bit, so nothing is resent.
#[tokio::test]
async fn corrupted_ack_with_intact_ack_bit_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let seed = ack_seed(true);
    let socket = loopback().await.with_simulator(Simulator::new(
        SimulatorConfig::default().corrupt_at([2]).with_seed(seed),
    ));
    let (addr, receiver) = spawn_receiver_on(socket, dir.path());
    let data = pattern(2000);

    let sender = loopback().await;
    let report = send_stream(&sender, addr, &data[..], "ackpath.bin", &patient())
        .await
        .expect("send failed");
    assert_eq!(report.transmissions, 4);
    assert_eq!(report.retransmissions, 0);

    let received = finish(receiver).await;
    assert_eq!(received.rejected, 0);
    assert_eq!(std::fs::read(received.path).unwrap(), data);
}

/// Flipping the ACK bit turns the acknowledgement into a NAK.  Without
/// sequence numbers the receiver cannot tell the resent chunk 2 from new
/// data and appends it a second time.
#[tokio::test]
async fn flipped_ack_bit_duplicates_the_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let seed = ack_seed(false);
    let socket = loopback().await.with_simulator(Simulator::new(
        SimulatorConfig::default().corrupt_at([2]).with_seed(seed),
    ));
    let (addr, receiver) = spawn_receiver_on(socket, dir.path());
    let data = pattern(2000);

    let sender = loopback().await;
    let report = send_stream(&sender, addr, &data[..], "dup.bin", &patient())
        .await
        .expect("send failed");
    assert_eq!(report.transmissions, 5);
    assert_eq!(report.retransmissions, 1);
    assert_eq!(report.bytes, 2000);

    let received = finish(receiver).await;
    assert_eq!(received.rejected, 0);
    assert_eq!(received.packets, 5);
    assert_eq!(received.bytes, 2000 + MAX_PAYLOAD as u64);

    let mut expected = data[..2 * MAX_PAYLOAD].to_vec();
    expected.extend_from_slice(&data[MAX_PAYLOAD..2 * MAX_PAYLOAD]);
    expected.extend_from_slice(&data[2 * MAX_PAYLOAD..]);
    assert_eq!(std::fs::read(received.path).unwrap(), expected);
}

/// Corrupting the first attempt of every packet exactly doubles the traffic.
#[tokio::test]
async fn first_attempt_corruption_doubles_transmissions() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, receiver) = spawn_receiver(dir.path()).await;
    let data = pattern(5000);
    let packets = 1 + 5000u64.div_ceil(MAX_PAYLOAD as u64);

    let every_first_attempt = (0..packets).map(|p| p * 2);
    let sender = loopback().await.with_simulator(Simulator::new(
        SimulatorConfig::default().corrupt_at(every_first_attempt),
    ));
    let report = send_stream(&sender, addr, &data[..], "d.bin", &patient())
        .await
        .expect("send failed");

    assert_eq!(report.transmissions, packets * 2);
    assert_eq!(report.retransmissions, packets);

    let received = finish(receiver).await;
    assert_eq!(received.rejected, packets);
    assert_eq!(std::fs::read(received.path).unwrap(), data);
}

/// Random loss and corruption on the data path; the timeout loop recovers.
#[tokio::test]
async fn lossy_data_path_still_delivers() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, receiver) = spawn_receiver(dir.path()).await;
    let data = pattern(30_000);

    let sender = loopback().await.with_simulator(Simulator::new(
        SimulatorConfig::default()
            .with_loss_rate(0.2)
            .with_corrupt_rate(0.1)
            .with_seed(7),
    ));
    let config = SenderConfig::default().with_ack_timeout(Duration::from_millis(100));
    let report = tokio::time::timeout(
        TEST_DEADLINE,
        send_stream(&sender, addr, &data[..], "lossy.bin", &config),
    )
    .await
    .expect("sender timed out")
    .expect("send failed");

    assert!(report.retransmissions > 0);

    let received = finish(receiver).await;
    assert_eq!(std::fs::read(received.path).unwrap(), data);
}

/// With a retry ceiling, a silent peer ends the send instead of hanging.
#[tokio::test]
async fn silent_receiver_exhausts_bounded_retries() {
    let silent = loopback().await;
    let sender = loopback().await;
    let config = SenderConfig::default()
        .with_ack_timeout(Duration::from_millis(5))
        .with_max_retries(Some(3));

    let err = send_stream(&sender, silent.local_addr, &b"data"[..], "f", &config)
        .await
        .unwrap_err();
    assert!(
        matches!(err, TransferError::RetriesExhausted { attempts: 4 }),
        "got {err:?}"
    );
    assert_eq!(sender.datagrams_sent(), 4);

    // All four datagrams are the same file-name packet.
    let mut seen = Vec::new();
    for _ in 0..4 {
        let (bytes, _) = tokio::time::timeout(Duration::from_secs(1), silent.recv_datagram())
            .await
            .expect("datagram missing")
            .unwrap();
        seen.push(bytes);
    }
    assert!(seen.windows(2).all(|w| w[0] == w[1]));
}
