//! Entry point for `udp-file-transfer`.
//!
//! Parses CLI arguments and dispatches into either **receive** or **send**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, address resolution).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use udp_file_transfer::socket::Socket;
use udp_file_transfer::{receive_file, send_file, ReceiverConfig, SenderConfig, TransferError};

/// Reliable single-file transfer over UDP.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Wait for one file and write it under the name the sender supplies.
    Receive {
        /// Local UDP port to listen on.
        port: u16,
        /// Directory the received file is written into.
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// Keep acknowledging a repeated final packet for this many milliseconds.
        #[arg(long, default_value_t = 0)]
        linger_ms: u64,
    },
    /// Send one file to a waiting receiver.
    Send {
        /// File to read.
        source: PathBuf,
        /// Receiver host name or address.
        host: String,
        /// Receiver UDP port.
        port: u16,
        /// Name the receiver should store the file under.
        dest_name: String,
        /// Acknowledgement timeout in milliseconds.
        #[arg(long, default_value_t = 10)]
        timeout_ms: u64,
        /// Give up after this many retransmissions of one packet (default: never).
        #[arg(long)]
        max_retries: Option<u32>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();

    match cli.mode {
        Mode::Receive {
            port,
            output_dir,
            linger_ms,
        } => {
            let config = ReceiverConfig::default()
                .with_output_dir(output_dir)
                .with_linger(Duration::from_millis(linger_ms));
            let socket = Socket::bind(SocketAddr::from(([0, 0, 0, 0], port)))
                .await
                .with_context(|| format!("binding UDP port {port}"))?;

            let report = receive_file(&socket, &config).await?;
            println!(
                "received {} ({} bytes, {} packets, {} rejected)",
                report.path.display(),
                report.bytes,
                report.packets,
                report.rejected
            );
        }
        Mode::Send {
            source,
            host,
            port,
            dest_name,
            timeout_ms,
            max_retries,
        } => {
            let config = SenderConfig::default()
                .with_ack_timeout(Duration::from_millis(timeout_ms))
                .with_max_retries(max_retries);
            let peer = resolve(&host, port).await?;
            let local = if peer.is_ipv4() {
                SocketAddr::from(([0, 0, 0, 0], 0))
            } else {
                SocketAddr::from(([0u16; 8], 0))
            };
            let socket = Socket::bind(local).await.context("binding sender socket")?;

            let report = send_file(&socket, peer, &source, &dest_name, &config)
                .await
                .with_context(|| format!("sending {}", source.display()))?;
            println!(
                "sent {} as {dest_name:?} ({} bytes, {} chunks, {} retransmissions)",
                source.display(),
                report.bytes,
                report.chunks,
                report.retransmissions
            );
        }
    }

    Ok(())
}

/// Resolve `host:port`, preferring an IPv4 address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransferError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port)).await?.collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| TransferError::Resolve(format!("{host}:{port}")))
}
