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

use crate::codec::AudioDecoder;
use crate::ring::DecodedRing;
use crate::statistics::{JitterStatistics, StatisticsCalculator};
use crate::store::{InsertResult, PacketStore};
use crate::{EncodedPacket, JitterError, Result};

/// Where decoding happens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeMode {
    /// `read` decodes the next packet whenever the ring runs dry
    #[default]
    OnDemand,
    /// `read` only drains decoded audio; `prefill` (usually driven by a
    /// [`crate::DecodeWorker`]) does the decoding
    Prefill,
}

/// Upper bound on decoded samples the ring may hold (about 11 minutes of
/// 48 kHz stereo)
pub const MAX_RING_SAMPLES: usize = 1 << 26;

/// Jitter buffer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterBufferConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of audio channels
    pub channels: u8,
    /// Samples per channel in one codec frame
    pub frame_size: usize,
    /// Upper bound on decoded audio held in the ring
    pub max_latency_seconds: f64,
    pub decode_mode: DecodeMode,
    /// Maximum number of packets awaiting decode (0 = no limit)
    pub max_packets_in_store: usize,
    /// How long to hold a packet that follows a gap before giving up on the
    /// missing sequences (0 = never hold)
    pub max_gap_wait_ms: u64,
    /// Synthesize audio for missing sequences through the decoder
    pub conceal_missing: bool,
    /// Gaps wider than this are skipped without concealment
    pub max_concealed_frames: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 1,
            frame_size: 960,
            max_latency_seconds: 0.2,
            decode_mode: DecodeMode::OnDemand,
            max_packets_in_store: 0,
            max_gap_wait_ms: 0,
            conceal_missing: false,
            max_concealed_frames: 5,
        }
    }
}

impl JitterBufferConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(JitterError::InvalidSampleRate(self.sample_rate));
        }
        if self.channels == 0 {
            return Err(JitterError::InvalidChannelCount(self.channels));
        }
        if self.frame_size == 0 {
            return Err(JitterError::InvalidFrameSize(self.frame_size));
        }
        if !self.max_latency_seconds.is_finite() || self.max_latency_seconds <= 0.0 {
            return Err(JitterError::InvalidConfig(format!(
                "max_latency_seconds must be positive, got {}",
                self.max_latency_seconds
            )));
        }

        let frame_samples = self
            .frame_size
            .checked_mul(self.channels as usize)
            .filter(|&samples| samples <= MAX_RING_SAMPLES)
            .ok_or(JitterError::InvalidFrameSize(self.frame_size))?;
        let frames = (self.max_latency_seconds * self.sample_rate as f64
            / self.frame_size as f64
            - 1e-9)
            .ceil()
            .max(1.0);
        if frames * frame_samples as f64 > MAX_RING_SAMPLES as f64 {
            return Err(JitterError::InvalidConfig(format!(
                "max_latency_seconds {} needs {frames} frames of {frame_samples} samples, \
                 more than the {MAX_RING_SAMPLES} sample limit",
                self.max_latency_seconds
            )));
        }
        Ok(())
    }

    /// Number of ring slots: `ceil(max_latency * sample_rate / frame_size)`
    pub fn num_frames(&self) -> usize {
        let frames =
            self.max_latency_seconds * self.sample_rate as f64 / self.frame_size.max(1) as f64;
        // Absorb float noise so exact multiples do not round up
        (frames - 1e-9).ceil().max(1.0) as usize
    }

    /// Interleaved samples in one frame
    pub fn frame_samples(&self) -> usize {
        self.frame_size * self.channels as usize
    }

    /// Total decoded samples the ring can hold
    pub fn capacity_samples(&self) -> usize {
        self.num_frames() * self.frame_samples()
    }

    pub fn max_gap_wait(&self) -> Duration {
        Duration::from_millis(self.max_gap_wait_ms)
    }
}

/// A packet rejected because decode progress had already passed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StalePacket {
    pub sequence: i64,
    pub next_sequence_expected: i64,
}

/// Diagnostic hook invoked for every stale packet
pub type StaleCallback = Box<dyn FnMut(StalePacket) + Send>;

/// Reorders packets by sequence and turns them into a steady sample stream.
///
/// One instance holds all state for one audio session.
pub struct JitterBuffer<D> {
    config: JitterBufferConfig,
    store: PacketStore,
    ring: DecodedRing,
    decoder: D,
    next_sequence_expected: i64,
    /// Whether any packet has been decoded this session
    started: bool,
    statistics: StatisticsCalculator,
    on_stale: Option<StaleCallback>,
}

impl<D: AudioDecoder> JitterBuffer<D> {
    /// Create a new jitter buffer decoding through `decoder`
    pub fn new(config: JitterBufferConfig, decoder: D) -> Result<Self> {
        config.validate()?;

        if decoder.sample_rate() != config.sample_rate || decoder.channels() != config.channels {
            return Err(JitterError::InvalidConfig(format!(
                "decoder is {} Hz/{} ch, buffer expects {} Hz/{} ch",
                decoder.sample_rate(),
                decoder.channels(),
                config.sample_rate,
                config.channels
            )));
        }

        let ring = DecodedRing::new(config.num_frames(), config.frame_samples());
        log::debug!(
            "Jitter buffer: {} frames of {} samples ({} Hz, {} ch, {:?})",
            ring.num_frames(),
            ring.frame_samples(),
            config.sample_rate,
            config.channels,
            config.decode_mode
        );

        Ok(Self {
            store: PacketStore::with_capacity(config.max_packets_in_store),
            ring,
            decoder,
            next_sequence_expected: 0,
            started: false,
            statistics: StatisticsCalculator::new(),
            on_stale: None,
            config,
        })
    }

    /// Register a callback for packets dropped as stale
    pub fn set_stale_callback(&mut self, callback: impl FnMut(StalePacket) + Send + 'static) {
        self.on_stale = Some(Box::new(callback));
    }

    /// Hand a packet from the network to the buffer.
    ///
    /// Never fails: a packet behind decode progress is dropped, logged and
    /// reported as [`InsertResult::Stale`].
    pub fn add_encoded_packet(&mut self, sequence: i64, payload: Vec<u8>) -> InsertResult {
        self.insert_packet(EncodedPacket::new(sequence, payload))
    }

    /// Same as [`Self::add_encoded_packet`] for an already built packet
    pub fn insert_packet(&mut self, packet: EncodedPacket) -> InsertResult {
        let sequence = packet.sequence;
        let result = self
            .store
            .insert(packet, self.next_sequence_expected, &mut self.statistics);

        match result {
            InsertResult::Stale => {
                log::warn!(
                    "Dropping stale packet seq={sequence} (next expected {})",
                    self.next_sequence_expected
                );
                if let Some(callback) = self.on_stale.as_mut() {
                    callback(StalePacket {
                        sequence,
                        next_sequence_expected: self.next_sequence_expected,
                    });
                }
            }
            InsertResult::Overflowed { evicted } => {
                log::debug!("Packet store overflow: evicted seq={evicted} for seq={sequence}");
            }
            InsertResult::Stored => {}
        }

        result
    }

    /// Fill `dst[offset..offset + count]` with audio.
    ///
    /// Decoded audio is copied first; in [`DecodeMode::OnDemand`] more
    /// packets are decoded as the ring runs dry. Whatever cannot be served is
    /// zeroed, so the whole range always holds valid samples. A range running
    /// past the end of `dst` is clamped to it.
    ///
    /// Returns the number of decoded samples written; `0` means the range is
    /// pure silence.
    pub fn read(&mut self, dst: &mut [f32], offset: usize, count: usize) -> usize {
        let end = offset.saturating_add(count).min(dst.len());
        let out = &mut dst[offset.min(end)..end];
        let requested = out.len();

        let mut produced = 0;
        while produced < requested {
            if !self.ring.is_empty() {
                produced += self.ring.read_into(&mut out[produced..]);
            } else if self.config.decode_mode == DecodeMode::OnDemand && self.fill_buffer() {
                continue;
            } else {
                break;
            }
        }

        out[produced..].fill(0.0);
        self.statistics.read_completed(requested, produced);

        if produced < requested {
            log::trace!(
                "Underrun: {produced}/{requested} samples decoded, {} packets pending",
                self.store.len()
            );
        }

        produced
    }

    /// Decode the lowest pending packet into the next ring frame.
    ///
    /// Returns `false` when nothing could be decoded: the store is empty, the
    /// ring is full, or the packet after a gap is still inside its wait time.
    pub fn fill_buffer(&mut self) -> bool {
        self.fill_buffer_at(Instant::now())
    }

    /// Decode until the ring is full or no packet can be decoded.
    ///
    /// Returns how many frames were attempted.
    pub fn prefill(&mut self) -> usize {
        let now = Instant::now();
        let mut frames = 0;
        while self.ring.free_frames() > 0 && self.fill_buffer_at(now) {
            frames += 1;
        }
        frames
    }

    pub(crate) fn fill_buffer_at(&mut self, now: Instant) -> bool {
        self.discard_decoded_duplicates();

        let Some(head) = self.store.peek_earliest() else {
            return false;
        };
        if self.ring.free_frames() == 0 {
            return false;
        }

        let gap = head.sequence - self.next_sequence_expected;
        if gap > 0 && self.started {
            let max_wait = self.config.max_gap_wait();
            if !max_wait.is_zero() && head.waited(now) < max_wait {
                log::trace!(
                    "Holding seq={} for missing {}..{}",
                    head.sequence,
                    self.next_sequence_expected,
                    head.sequence
                );
                return false;
            }

            if self.config.conceal_missing && gap <= i64::from(self.config.max_concealed_frames) {
                return self.conceal_next(gap == 1);
            }

            log::debug!(
                "Skipping {gap} missing sequences {}..{}",
                self.next_sequence_expected,
                head.sequence
            );
            self.statistics.sequences_skipped(gap as u64);
        }

        self.decode_next()
    }

    /// Pop packets that sit behind decode progress (copies of decoded sequences)
    fn discard_decoded_duplicates(&mut self) {
        while let Some(head) = self.store.peek_earliest() {
            if head.sequence >= self.next_sequence_expected {
                break;
            }
            if let Some(duplicate) = self.store.pop_earliest() {
                log::debug!(
                    "Discarding duplicate seq={} (next expected {})",
                    duplicate.sequence,
                    self.next_sequence_expected
                );
                self.statistics.duplicate_discarded();
            }
        }
    }

    fn decode_next(&mut self) -> bool {
        let Some(frame) = self.ring.allocate_write_frame() else {
            return false;
        };
        let Some(packet) = self.store.pop_earliest() else {
            self.ring.commit_decoded(0);
            return false;
        };

        let capacity = frame.len();
        let (written, failed) = match self.decoder.decode(&packet.payload, frame) {
            Ok(samples) if samples > capacity => {
                log::warn!(
                    "Decoder reported {samples} samples for a {capacity}-sample frame (seq={})",
                    packet.sequence
                );
                (capacity, false)
            }
            Ok(samples) => (samples, false),
            Err(e) => {
                log::warn!("Decoder failure for seq={}: {e}", packet.sequence);
                (0, true)
            }
        };

        self.ring.commit_decoded(written);
        self.statistics.packet_decoded(written, failed);
        self.advance_past(packet.sequence);
        self.started = true;
        true
    }

    /// Synthesize one frame for `next_sequence_expected`, which never arrived
    fn conceal_next(&mut self, use_next_payload: bool) -> bool {
        let next_payload = if use_next_payload {
            self.store
                .peek_earliest()
                .map(|packet| packet.payload.as_slice())
        } else {
            None
        };
        let Some(frame) = self.ring.allocate_write_frame() else {
            return false;
        };

        let capacity = frame.len();
        let written = match self.decoder.conceal(next_payload, frame) {
            Ok(samples) => samples.min(capacity),
            Err(e) => {
                log::warn!(
                    "Concealment failed for seq={}: {e}",
                    self.next_sequence_expected
                );
                0
            }
        };

        log::debug!(
            "Concealed missing seq={} ({written} samples)",
            self.next_sequence_expected
        );
        self.ring.commit_decoded(written);
        self.statistics.frame_concealed();
        self.advance_past(self.next_sequence_expected);
        true
    }

    /// Each packet accounts for exactly one sequence slot, whatever the
    /// decoder produced, so progress never moves backwards or stalls.
    fn advance_past(&mut self, sequence: i64) {
        self.next_sequence_expected = self
            .next_sequence_expected
            .max(sequence.saturating_add(1));
        self.discard_decoded_duplicates();
    }

    /// Drop all pending packets and decoded audio, keeping decode progress
    pub fn flush(&mut self) {
        self.store.clear(&mut self.statistics);
        self.ring.clear();
    }

    /// Start a fresh session
    pub fn reset(&mut self) {
        self.flush();
        self.next_sequence_expected = 0;
        self.started = false;
        self.statistics.reset();
    }

    pub fn config(&self) -> &JitterBufferConfig {
        &self.config
    }

    /// Lowest sequence still accepted
    pub fn next_sequence_expected(&self) -> i64 {
        self.next_sequence_expected
    }

    /// Decoded samples ready to read
    pub fn available_samples(&self) -> usize {
        self.ring.available_samples()
    }

    /// Packets awaiting decode
    pub fn pending_packets(&self) -> usize {
        self.store.len()
    }

    pub fn ring(&self) -> &DecodedRing {
        &self.ring
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut D {
        &mut self.decoder
    }

    /// Get current statistics
    pub fn statistics(&self) -> JitterStatistics {
        self.statistics.snapshot()
    }
}
