//! Tunables for both transfer roles.
//!
//! Defaults reproduce the protocol's fixed behaviour: a 10 ms acknowledgement
//! timeout, no retry ceiling, no backoff, and a receiver that stops reading
//! the moment it sees FIN.

use std::path::PathBuf;
use std::time::Duration;

/// How long the sender waits for an acknowledgement before resending.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(10);

/// Send-side settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderConfig {
    /// Fixed wait per attempt; there is no backoff.
    pub ack_timeout: Duration,
    /// Retransmissions allowed per packet before giving up.
    ///
    /// `None` retries forever.
    pub max_retries: Option<u32>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            max_retries: None,
        }
    }
}

impl SenderConfig {
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: Option<u32>) -> Self {
        self.max_retries = retries;
        self
    }
}

/// Receive-side settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Directory the received file name is resolved against.
    pub output_dir: PathBuf,
    /// How long to keep acknowledging a retransmitted FIN after finishing.
    ///
    /// Zero stops reading immediately.
    pub linger: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            linger: Duration::ZERO,
        }
    }
}

impl ReceiverConfig {
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }
}
