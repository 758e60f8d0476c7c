//! Replay Protection for Encrypted Packet Sequences
//!
//! The packet processor authenticates frames but accepts any sequence number.
//! A session keeps one [`ReplayProtection`] per receive key and runs every
//! accepted sequence through it before acting on the packet.
//!
//! The window remembers the last `REPLAY_PROTECTION_BUFFER_SIZE` sequences
//! in a ring indexed by `sequence % size`. Anything older than the window is
//! treated as a replay, so memory stays constant regardless of traffic.

use crate::utils::metrics::global_metrics;
use tracing::{debug, instrument};

/// Sequences tracked behind the most recent one
pub const REPLAY_PROTECTION_BUFFER_SIZE: usize = 256;

/// Sliding-window received-sequence tracker
#[derive(Debug, Clone)]
pub struct ReplayProtection {
    most_recent_sequence: u64,
    received: Box<[Option<u64>; REPLAY_PROTECTION_BUFFER_SIZE]>,
}

impl ReplayProtection {
    pub fn new() -> Self {
        Self {
            most_recent_sequence: 0,
            received: Box::new([None; REPLAY_PROTECTION_BUFFER_SIZE]),
        }
    }

    /// Forget every sequence, e.g. after a rekey
    pub fn reset(&mut self) {
        self.most_recent_sequence = 0;
        self.received.fill(None);
    }

    /// Check a sequence and record it if fresh.
    ///
    /// Returns true if the sequence was already seen or is older than the
    /// window. Only call this for frames that authenticated.
    #[instrument(skip(self), level = "trace")]
    pub fn is_replay(&mut self, sequence: u64) -> bool {
        let window = REPLAY_PROTECTION_BUFFER_SIZE as u64;

        if sequence.saturating_add(window) <= self.most_recent_sequence {
            debug!(sequence, most_recent = self.most_recent_sequence, "Sequence behind replay window");
            global_metrics().replay_rejected();
            return true;
        }

        let index = (sequence % window) as usize;
        if matches!(self.received[index], Some(seen) if seen >= sequence) {
            debug!(sequence, "Replayed sequence rejected");
            global_metrics().replay_rejected();
            return true;
        }

        if sequence > self.most_recent_sequence {
            self.most_recent_sequence = sequence;
        }
        self.received[index] = Some(sequence);
        false
    }

    pub fn most_recent_sequence(&self) -> u64 {
        self.most_recent_sequence
    }
}

impl Default for ReplayProtection {
    fn default() -> Self {
        Self::new()
    }
}
