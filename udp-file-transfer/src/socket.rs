//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that moves whole
//! datagrams.  All protocol logic lives elsewhere; this module owns only byte
//! I/O, the outbound datagram counter, and the optional fault [`Simulator`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use thiserror::Error;
use tokio::net::UdpSocket;

use crate::packet::{hex_dump, PACKET_BUFFER_SIZE};
use crate::simulator::{Fate, Simulator};

/// Receive buffer size: one byte more than a legal datagram so oversized
/// datagrams are seen as such instead of being silently truncated to fit.
const RECV_BUFFER: usize = PACKET_BUFFER_SIZE + 1;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise from socket operations.
#[derive(Debug, Error)]
pub enum SocketError {
    /// Underlying I/O error from the OS.
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// An async, datagram-oriented UDP socket.
///
/// All methods are `&self`; the fault simulator sits behind a mutex that is
/// never held across an `.await`.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (filled in after OS assigns ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
    simulator: Option<Mutex<Simulator>>,
    sent: AtomicU64,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> Result<Self, SocketError> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self {
            local_addr,
            inner,
            simulator: None,
            sent: AtomicU64::new(0),
        })
    }

    /// Route every outbound datagram through `simulator` first.
    pub fn with_simulator(mut self, simulator: Simulator) -> Self {
        self.simulator = Some(Mutex::new(simulator));
        self
    }

    /// Send `bytes` as a single UDP datagram to `dest`.
    ///
    /// The datagram counts as sent even when the simulator drops it.
    pub async fn send_datagram(&self, bytes: &[u8], dest: SocketAddr) -> Result<(), SocketError> {
        self.sent.fetch_add(1, Ordering::Relaxed);
        log::trace!("[sock] → {dest} {}", hex_dump(bytes));

        match self.simulate(bytes) {
            Fate::Deliver => {
                self.inner.send_to(bytes, dest).await?;
            }
            Fate::Corrupt(mangled) => {
                self.inner.send_to(&mangled, dest).await?;
            }
            Fate::Drop => {}
        }
        Ok(())
    }

    /// Receive the next datagram into a freshly zeroed buffer.
    ///
    /// Returns `(bytes, sender_address)`.  A datagram longer than a legal
    /// packet comes back one byte too long so integrity checks reject it.
    pub async fn recv_datagram(&self) -> Result<(Vec<u8>, SocketAddr), SocketError> {
        let mut buf = vec![0u8; RECV_BUFFER];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        log::trace!("[sock] ← {addr} {}", hex_dump(&buf));
        Ok((buf, addr))
    }

    /// Total datagrams handed to [`send_datagram`](Self::send_datagram).
    pub fn datagrams_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    fn simulate(&self, bytes: &[u8]) -> Fate {
        match &self.simulator {
            Some(sim) => match sim.lock() {
                Ok(mut sim) => sim.apply(bytes),
                Err(poisoned) => poisoned.into_inner().apply(bytes),
            },
            None => Fate::Deliver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::SimulatorConfig;

    async fn loopback() -> Socket {
        Socket::bind("127.0.0.1:0".parse().unwrap()).await.expect("bind")
    }

    #[tokio::test]
    async fn datagram_round_trip_on_loopback() {
        let a = loopback().await;
        let b = loopback().await;

        a.send_datagram(b"hello", b.local_addr).await.unwrap();
        let (bytes, from) = b.recv_datagram().await.unwrap();

        assert_eq!(bytes, b"hello");
        assert_eq!(from, a.local_addr);
        assert_eq!(a.datagrams_sent(), 1);
    }

    #[tokio::test]
    async fn simulated_drop_still_counts_as_sent() {
        let a = loopback()
            .await
            .with_simulator(Simulator::new(SimulatorConfig::default().drop_at([0])));
        let b = loopback().await;

        a.send_datagram(b"lost", b.local_addr).await.unwrap();
        a.send_datagram(b"kept", b.local_addr).await.unwrap();

        let (bytes, _) = b.recv_datagram().await.unwrap();
        assert_eq!(bytes, b"kept");
        assert_eq!(a.datagrams_sent(), 2);
    }

    #[tokio::test]
    async fn oversized_datagram_is_not_truncated_to_a_legal_size() {
        let a = loopback().await;
        let b = loopback().await;

        let big = vec![7u8; PACKET_BUFFER_SIZE + 50];
        a.send_datagram(&big, b.local_addr).await.unwrap();
        let (bytes, _) = b.recv_datagram().await.unwrap();
        assert!(bytes.len() > PACKET_BUFFER_SIZE);
    }
}
