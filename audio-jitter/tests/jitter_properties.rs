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
 */

//! End-to-end behaviour of the jitter buffer through the public API.
//!
//! All tests use the L16 codec at 48 kHz mono with 20 ms frames so decoded
//! audio can be compared with what was sent.

use audio_jitter::codec::Pcm16Decoder;
use audio_jitter::{
    packet_queue, DecodeMode, DecodeWorker, InsertResult, JitterBuffer, JitterBufferConfig,
    SharedJitterBuffer,
};
use std::time::{Duration, Instant};

const FRAME: usize = 960;
const TOLERANCE: f32 = 1e-3;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn jitter_with(config: JitterBufferConfig) -> JitterBuffer<Pcm16Decoder> {
    init_logging();
    let decoder = Pcm16Decoder::new(config.sample_rate, config.channels).unwrap();
    JitterBuffer::new(config, decoder).unwrap()
}

fn jitter() -> JitterBuffer<Pcm16Decoder> {
    jitter_with(JitterBufferConfig::default())
}

/// Frame `k` carries a ramp offset by `k`, so frames are distinguishable
fn pattern(k: i64) -> Vec<f32> {
    (0..FRAME)
        .map(|i| ((k as usize * 7 + i) % 100) as f32 / 200.0)
        .collect()
}

fn assert_frame(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() < TOLERANCE, "sample {i}: {a} != {e}");
    }
}

#[test]
fn empty_buffer_reads_silence() {
    let mut jitter = jitter();
    let mut out = vec![0.3f32; 1500];

    assert_eq!(jitter.read(&mut out, 0, 1500), 0);
    assert!(out.iter().all(|&s| s == 0.0));

    let stats = jitter.statistics();
    assert_eq!(stats.underrun_reads, 1);
    assert_eq!(stats.silent_samples, 1500);
}

#[test]
fn partial_availability_is_padded() {
    let mut jitter = jitter();
    jitter.add_encoded_packet(0, Pcm16Decoder::encode(&pattern(0)));

    let mut out = vec![0.9f32; 1500];
    assert_eq!(jitter.read(&mut out, 0, 1500), FRAME);
    assert_frame(&out[..FRAME], &pattern(0));
    assert!(out[FRAME..].iter().all(|&s| s == 0.0));
}

#[test]
fn reordered_arrivals_play_in_sequence() {
    let mut jitter = jitter();
    for sequence in [5, 3, 4] {
        assert_eq!(
            jitter.add_encoded_packet(sequence, Pcm16Decoder::encode(&pattern(sequence))),
            InsertResult::Stored
        );
    }

    let mut out = vec![0.0f32; 3 * FRAME];
    assert_eq!(jitter.read(&mut out, 0, 3 * FRAME), 3 * FRAME);
    for (slot, sequence) in [3, 4, 5].into_iter().enumerate() {
        assert_frame(&out[slot * FRAME..(slot + 1) * FRAME], &pattern(sequence));
    }
    assert_eq!(jitter.next_sequence_expected(), 6);
}

#[test]
fn three_frames_round_trip() {
    let mut jitter = jitter();
    for sequence in 0..3 {
        jitter.add_encoded_packet(sequence, Pcm16Decoder::encode(&pattern(sequence)));
    }

    // Odd block size so reads straddle frame boundaries
    let mut out = vec![0.0f32; 3 * FRAME];
    let mut offset = 0;
    while offset < out.len() {
        let count = 700.min(out.len() - offset);
        assert_eq!(jitter.read(&mut out, offset, count), count);
        offset += count;
    }

    for sequence in 0..3 {
        let start = sequence as usize * FRAME;
        assert_frame(&out[start..start + FRAME], &pattern(sequence));
    }
}

#[test]
fn stale_packet_leaves_buffer_untouched() {
    let mut jitter = jitter_with(JitterBufferConfig {
        decode_mode: DecodeMode::Prefill,
        ..Default::default()
    });
    for sequence in 0..3 {
        jitter.add_encoded_packet(sequence, Pcm16Decoder::encode(&pattern(sequence)));
    }
    assert_eq!(jitter.prefill(), 3);

    let available = jitter.available_samples();
    let read_cursor = jitter.ring().read_cursor();
    let write_cursor = jitter.ring().write_cursor();

    assert_eq!(
        jitter.add_encoded_packet(1, Pcm16Decoder::encode(&pattern(1))),
        InsertResult::Stale
    );
    assert_eq!(jitter.available_samples(), available);
    assert_eq!(jitter.ring().read_cursor(), read_cursor);
    assert_eq!(jitter.ring().write_cursor(), write_cursor);
    assert_eq!(jitter.pending_packets(), 0);
    assert_eq!(jitter.statistics().stale_packets_dropped, 1);
}

#[test]
fn decoded_audio_never_exceeds_capacity() {
    let mut jitter = jitter_with(JitterBufferConfig {
        decode_mode: DecodeMode::Prefill,
        ..Default::default()
    });
    let capacity = jitter.config().capacity_samples();
    assert_eq!(capacity, 10 * FRAME);

    for sequence in 0..25 {
        jitter.add_encoded_packet(sequence, Pcm16Decoder::encode(&pattern(sequence)));
    }
    assert_eq!(jitter.prefill(), 10);
    assert_eq!(jitter.available_samples(), capacity);
    assert_eq!(jitter.pending_packets(), 15);

    // Freeing one frame admits exactly one more
    let mut out = vec![0.0f32; FRAME];
    jitter.read(&mut out, 0, FRAME);
    assert!(jitter.fill_buffer());
    assert_eq!(jitter.available_samples(), capacity);
    assert!(!jitter.fill_buffer());
    assert_eq!(jitter.pending_packets(), 14);
}

#[test]
fn progress_is_monotonic_under_disorder() {
    let mut jitter = jitter();
    let arrivals = [2, 0, 1, 1, 4, 3, 7, 5, 6, 2, 9, 8, 8, 11, 10];
    let mut out = vec![0.0f32; 500];
    let mut last = jitter.next_sequence_expected();

    for sequence in arrivals {
        jitter.add_encoded_packet(sequence, Pcm16Decoder::encode(&pattern(sequence)));
        jitter.read(&mut out, 0, 500);

        let next = jitter.next_sequence_expected();
        assert!(next >= last, "progress went from {last} back to {next}");
        last = next;
    }
}

#[test]
fn worker_feeds_shared_buffer() {
    init_logging();
    let config = JitterBufferConfig {
        decode_mode: DecodeMode::Prefill,
        ..Default::default()
    };
    let decoder = Pcm16Decoder::new(config.sample_rate, config.channels).unwrap();
    let shared = SharedJitterBuffer::new(JitterBuffer::new(config, decoder).unwrap());

    // Queued before the worker starts so its first pass sees all three
    let (mut tx, rx) = packet_queue(16);
    for sequence in [1, 0, 2] {
        assert!(tx.send(sequence, Pcm16Decoder::encode(&pattern(sequence))));
    }
    let mut worker = DecodeWorker::spawn(shared.clone(), rx, Duration::from_millis(1)).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while shared.lock().available_samples() < 3 * FRAME && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(1));
    }
    worker.stop();

    let mut out = vec![0.0f32; 3 * FRAME];
    assert_eq!(shared.read(&mut out, 0, 3 * FRAME), 3 * FRAME);
    for sequence in 0..3 {
        let start = sequence as usize * FRAME;
        assert_frame(&out[start..start + FRAME], &pattern(sequence));
    }
}
