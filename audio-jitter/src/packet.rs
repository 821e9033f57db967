/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use web_time::{Duration, Instant};

/// Compressed audio packet waiting to be decoded
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Position of the packet in the sender's encode order
    pub sequence: i64,
    /// Codec payload
    pub payload: Vec<u8>,
    /// Time when packet was received
    pub arrival_time: Instant,
}

impl EncodedPacket {
    /// Create a new packet stamped with the current time
    pub fn new(sequence: i64, payload: Vec<u8>) -> Self {
        Self::received_at(sequence, payload, Instant::now())
    }

    /// Create a packet with an explicit arrival time
    pub fn received_at(sequence: i64, payload: Vec<u8>, arrival_time: Instant) -> Self {
        Self {
            sequence,
            payload,
            arrival_time,
        }
    }

    /// Get the size of the payload in bytes
    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    /// How long the packet has been waiting as of `now`
    pub fn waited(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.arrival_time)
    }

    /// Whether the packet sits behind decode progress
    pub fn is_stale(&self, next_sequence_expected: i64) -> bool {
        self.sequence < next_sequence_expected
    }
}
