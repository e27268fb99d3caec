//! Optional network simulator for deterministic testing.
//!
//! Real networks drop and corrupt packets.  To exercise the reliability
//! mechanisms without depending on actual network conditions, this module
//! provides a [`Simulator`] that a [`crate::socket::Socket`] consults on every
//! outbound datagram, applying a configurable fault model:
//!
//! | Fault            | Description                                        |
//! |------------------|----------------------------------------------------|
//! | Packet loss      | Drop a datagram with probability `loss_rate`.      |
//! | Corruption       | Flip one random bit with probability `corrupt_rate`.|
//! | Scripted drop    | Drop the datagrams whose send index is listed.     |
//! | Scripted corrupt | Corrupt the datagrams whose send index is listed.  |
//!
//! Send indices count every datagram handed to the socket, starting at `0`.
//! The RNG is seeded so test failures are reproducible.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for the fault-injection model.
///
/// Probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Probability that any given datagram is silently dropped.
    pub loss_rate: f64,
    /// Probability that any given datagram has one bit flipped.
    pub corrupt_rate: f64,
    /// Send indices that are always dropped.
    pub drop_at: BTreeSet<u64>,
    /// Send indices that are always corrupted.
    pub corrupt_at: BTreeSet<u64>,
    /// Seed for the fault RNG.
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            drop_at: BTreeSet::new(),
            corrupt_at: BTreeSet::new(),
            seed: 0x5eed,
        }
    }
}

impl SimulatorConfig {
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    pub fn with_corrupt_rate(mut self, rate: f64) -> Self {
        self.corrupt_rate = rate;
        self
    }

    pub fn drop_at(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.drop_at.extend(indices);
        self
    }

    pub fn corrupt_at(mut self, indices: impl IntoIterator<Item = u64>) -> Self {
        self.corrupt_at.extend(indices);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// What the simulated network did with one datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fate {
    /// Deliver unchanged.
    Deliver,
    /// Deliver with the given bytes (one bit flipped).
    Corrupt(Vec<u8>),
    /// Never deliver.
    Drop,
}

/// A fault-injecting filter for outbound datagrams.
#[derive(Debug)]
pub struct Simulator {
    pub config: SimulatorConfig,
    rng: StdRng,
    next_index: u64,
    dropped: u64,
    corrupted: u64,
}

impl Simulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            next_index: 0,
            dropped: 0,
            corrupted: 0,
        }
    }

    /// Decide the fate of the next outbound datagram.
    ///
    /// Scripted faults win over random ones; a scripted drop wins over a
    /// scripted corruption at the same index.
    pub fn apply(&mut self, datagram: &[u8]) -> Fate {
        let index = self.next_index;
        self.next_index += 1;

        let drop = self.config.drop_at.contains(&index)
            || (self.config.loss_rate > 0.0 && self.rng.random_bool(self.config.loss_rate));
        if drop {
            self.dropped += 1;
            log::debug!("[sim] drop datagram #{index}");
            return Fate::Drop;
        }

        let corrupt = self.config.corrupt_at.contains(&index)
            || (self.config.corrupt_rate > 0.0
                && self.rng.random_bool(self.config.corrupt_rate));
        if corrupt && !datagram.is_empty() {
            let mut bytes = datagram.to_vec();
            let byte = self.rng.random_range(0..bytes.len());
            let bit = self.rng.random_range(0..8u32);
            bytes[byte] ^= 1 << bit;
            self.corrupted += 1;
            log::debug!("[sim] corrupt datagram #{index} (byte {byte}, bit {bit})");
            return Fate::Corrupt(bytes);
        }

        Fate::Deliver
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn corrupted(&self) -> u64 {
        self.corrupted
    }
}
