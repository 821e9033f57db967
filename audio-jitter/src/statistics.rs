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

use serde::{Deserialize, Serialize};
use web_time::{Duration, Instant};

/// Counters describing one jitter buffer session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JitterStatistics {
    /// Packets handed to `add_encoded_packet`
    pub packets_received: u64,
    /// Packets accepted into the store
    pub packets_stored: u64,
    /// Packets rejected because decode progress had passed them
    pub stale_packets_dropped: u64,
    /// Extra copies of an already decoded sequence
    pub duplicate_packets_discarded: u64,
    /// Packets evicted from a full store
    pub overflow_packets_dropped: u64,
    /// Packets removed by a flush
    pub flushed_packets: u64,
    /// Packets that arrived with a sequence below the highest seen
    pub reordered_packets: u64,
    /// Largest sequence distance of a reordered arrival
    pub max_reorder_distance: u64,
    /// Packets run through the decoder (including failed decodes)
    pub packets_decoded: u64,
    /// Decodes that failed and produced no audio
    pub decoder_errors: u64,
    /// Samples produced by the decoder
    pub samples_decoded: u64,
    /// Frames synthesized for missing sequences
    pub concealed_frames: u64,
    /// Missing sequences given up on without concealment
    pub skipped_sequences: u64,
    /// Calls to `read`
    pub reads: u64,
    /// Reads that could not be fully served with decoded audio
    pub underrun_reads: u64,
    /// Decoded samples handed to the reader
    pub samples_emitted: u64,
    /// Zero samples written to pad underruns
    pub silent_samples: u64,
    /// Reads answered with silence because the buffer was locked
    pub contended_reads: u64,
    /// Packets dropped because the ingress queue was full
    pub queue_drops: u64,
    /// Seconds since the session started
    pub uptime_secs: f64,
}

impl JitterStatistics {
    /// Fraction of emitted samples that were padding silence
    pub fn silence_ratio(&self) -> f64 {
        let total = self.samples_emitted + self.silent_samples;
        if total == 0 {
            0.0
        } else {
            self.silent_samples as f64 / total as f64
        }
    }
}

/// Accumulates session counters
#[derive(Debug)]
pub struct StatisticsCalculator {
    stats: JitterStatistics,
    start_time: Instant,
}

impl Default for StatisticsCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsCalculator {
    /// Create a new statistics calculator
    pub fn new() -> Self {
        Self {
            stats: JitterStatistics::default(),
            start_time: Instant::now(),
        }
    }

    pub fn packet_received(&mut self) {
        self.stats.packets_received += 1;
    }

    pub fn packet_stored(&mut self) {
        self.stats.packets_stored += 1;
    }

    pub fn stale_packet_dropped(&mut self) {
        self.stats.stale_packets_dropped += 1;
    }

    pub fn duplicate_discarded(&mut self) {
        self.stats.duplicate_packets_discarded += 1;
    }

    pub fn overflow_packet_dropped(&mut self) {
        self.stats.overflow_packets_dropped += 1;
    }

    /// Record packets removed by a flush
    pub fn buffer_flush(&mut self, packets: u64) {
        self.stats.flushed_packets += packets;
    }

    /// Record packet reordering event
    pub fn packet_reordered(&mut self, sequence_distance: i64) {
        self.stats.reordered_packets += 1;
        let distance = sequence_distance.unsigned_abs();
        if distance > self.stats.max_reorder_distance {
            self.stats.max_reorder_distance = distance;
        }
    }

    /// Record a decode attempt and the samples it produced
    pub fn packet_decoded(&mut self, samples: usize, failed: bool) {
        self.stats.packets_decoded += 1;
        self.stats.samples_decoded += samples as u64;
        if failed {
            self.stats.decoder_errors += 1;
        }
    }

    pub fn frame_concealed(&mut self) {
        self.stats.concealed_frames += 1;
    }

    pub fn sequences_skipped(&mut self, count: u64) {
        self.stats.skipped_sequences += count;
    }

    /// Record a read that produced `decoded` samples out of `requested`
    pub fn read_completed(&mut self, requested: usize, decoded: usize) {
        self.stats.reads += 1;
        self.stats.samples_emitted += decoded as u64;
        if decoded < requested {
            self.stats.underrun_reads += 1;
            self.stats.silent_samples += (requested - decoded) as u64;
        }
    }

    /// Get uptime duration
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> JitterStatistics {
        JitterStatistics {
            uptime_secs: self.uptime().as_secs_f64(),
            ..self.stats.clone()
        }
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_calculator() {
        let mut calc = StatisticsCalculator::new();

        calc.packet_received();
        calc.packet_stored();
        calc.packet_decoded(960, false);
        calc.packet_decoded(0, true);
        calc.read_completed(1500, 960);
        calc.read_completed(480, 480);

        let stats = calc.snapshot();
        assert_eq!(stats.packets_received, 1);
        assert_eq!(stats.packets_decoded, 2);
        assert_eq!(stats.decoder_errors, 1);
        assert_eq!(stats.samples_decoded, 960);
        assert_eq!(stats.reads, 2);
        assert_eq!(stats.underrun_reads, 1);
        assert_eq!(stats.samples_emitted, 1440);
        assert_eq!(stats.silent_samples, 540);
    }

    #[test]
    fn test_silence_ratio() {
        let mut calc = StatisticsCalculator::new();
        assert_eq!(calc.snapshot().silence_ratio(), 0.0);

        calc.read_completed(100, 75);
        assert!((calc.snapshot().silence_ratio() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_reorder_distance_tracks_maximum() {
        let mut calc = StatisticsCalculator::new();
        calc.packet_reordered(3);
        calc.packet_reordered(1);

        let stats = calc.snapshot();
        assert_eq!(stats.reordered_packets, 2);
        assert_eq!(stats.max_reorder_distance, 3);
    }

    #[test]
    fn test_reset() {
        let mut calc = StatisticsCalculator::new();
        calc.stale_packet_dropped();
        calc.frame_concealed();
        calc.reset();

        let stats = calc.snapshot();
        assert_eq!(stats.stale_packets_dropped, 0);
        assert_eq!(stats.concealed_frames, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut calc = StatisticsCalculator::new();
        calc.frame_concealed();

        let json = serde_json::to_value(calc.snapshot()).unwrap();
        assert_eq!(json["concealed_frames"], 1);
        assert_eq!(json["underrun_reads"], 0);
    }
}
