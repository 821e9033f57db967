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

use std::thread;
use web_time::{Duration, Instant};

use audio_jitter::codec::OpusDecoder;
use audio_jitter::{
    packet_queue, DecodeMode, DecodeWorker, JitterBuffer, JitterBufferConfig, SharedJitterBuffer,
};
use clap::Parser;
use opus::{Application as OpusApp, Channels as OpusChannels, Encoder as OpusEncoder};
use rand::Rng;

// This tool does the following:
// 1. Generates a tone (or loads a WAV file with --input).
// 2. Splits it into 20 ms Opus packets.
// 3. Schedules every packet with random delay, loss and duplication.
// 4. A network thread pushes the packets into the ingress queue on schedule.
// 5. A decode worker feeds the jitter buffer while the main thread pulls
//    fixed blocks at the playback rate, like an audio callback would.

const PACKET_MS: u64 = 20;

#[derive(Parser, Debug)]
#[clap(about = "Jitter buffer simulator with network impairment", version)]
struct Args {
    #[clap(long, default_value_t = 5.0, help = "Length of the generated tone in seconds")]
    duration_secs: f32,

    #[clap(long, default_value_t = 48000, help = "Sample rate in Hz (Opus rates only)")]
    sample_rate: u32,

    #[clap(long, default_value_t = 1, help = "Channel count (1 or 2)")]
    channels: u8,

    #[clap(long, default_value_t = 440.0, help = "Tone frequency in Hz")]
    tone_hz: f32,

    #[clap(long, default_value_t = 0.0, help = "Packet loss probability (0.0-1.0)")]
    loss: f32,

    #[clap(long, default_value_t = 0.0, help = "Packet duplication probability (0.0-1.0)")]
    duplicate: f32,

    #[clap(
        long,
        default_value_t = 0,
        help = "Maximum random network delay in milliseconds (0-500ms recommended)"
    )]
    max_jitter_ms: u32,

    #[clap(long, default_value_t = 60, help = "Delay before playback starts")]
    playout_delay_ms: u64,

    #[clap(long, default_value_t = 10, help = "Playback block length in milliseconds")]
    block_ms: u64,

    #[clap(long, default_value_t = 0.2, help = "Decoded audio the buffer may hold")]
    max_latency_seconds: f64,

    #[clap(long, default_value_t = 0, help = "How long to wait for a missing packet")]
    max_gap_wait_ms: u64,

    #[clap(long, help = "Conceal missing packets with Opus PLC/FEC")]
    conceal: bool,

    #[clap(long, help = "Only decode from the background worker")]
    prefill: bool,

    #[clap(long, default_value_t = 64, help = "Ingress queue capacity in packets")]
    queue_capacity: usize,

    #[cfg(feature = "audio_files")]
    #[clap(long, help = "WAV file to play instead of the generated tone")]
    input: Option<String>,

    #[cfg(feature = "audio_files")]
    #[clap(long, help = "Write the played audio to this WAV file")]
    output: Option<String>,
}

struct Scheduled {
    at: Duration,
    sequence: i64,
    payload: Vec<u8>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // ── Parse CLI ─────────────────────────────────────────────────────────────
    let args = Args::parse();
    let loss = args.loss.clamp(0.0, 1.0);
    let duplicate = args.duplicate.clamp(0.0, 1.0);
    let max_jitter_ms = args.max_jitter_ms.min(500);
    let block_ms = args.block_ms.max(1);

    let (sample_rate, channels, pcm) = load_source(&args)?;
    let frame_size = (sample_rate as u64 * PACKET_MS / 1000) as usize;
    let packet_samples = frame_size * channels as usize;

    log::info!(
        "Source: {} Hz, {} ch, {:.2} s",
        sample_rate,
        channels,
        pcm.len() as f32 / packet_samples as f32 * PACKET_MS as f32 / 1000.0
    );
    log::info!(
        "Network: loss={:.1}% duplicate={:.1}% max_jitter={}ms",
        loss * 100.0,
        duplicate * 100.0,
        max_jitter_ms
    );

    // ── Encode and schedule packets ───────────────────────────────────────────
    let ch_enum = if channels == 1 {
        OpusChannels::Mono
    } else {
        OpusChannels::Stereo
    };
    let mut encoder = OpusEncoder::new(sample_rate, ch_enum, OpusApp::Voip)?;
    encoder.set_inband_fec(true)?;
    encoder.set_packet_loss_perc((loss * 100.0) as i32)?;

    let mut rng = rand::rng();
    let mut schedule = Vec::new();
    let mut lost = 0u64;
    for (index, chunk) in pcm.chunks(packet_samples).enumerate() {
        let mut frame = chunk.to_vec();
        frame.resize(packet_samples, 0.0);
        let mut encoded = vec![0u8; 4000];
        let len = encoder.encode_float(&frame, &mut encoded)?;
        encoded.truncate(len);

        if rng.random::<f32>() < loss {
            lost += 1;
            continue;
        }

        let sent_at = Duration::from_millis(index as u64 * PACKET_MS);
        let copies = if rng.random::<f32>() < duplicate { 2 } else { 1 };
        for _ in 0..copies {
            let delay = if max_jitter_ms > 0 {
                Duration::from_millis(rng.random_range(0..=max_jitter_ms) as u64)
            } else {
                Duration::ZERO
            };
            schedule.push(Scheduled {
                at: sent_at + delay,
                sequence: index as i64,
                payload: encoded.clone(),
            });
        }
    }
    schedule.sort_by_key(|packet| packet.at);
    let total_packets = pcm.len().div_ceil(packet_samples);
    log::info!(
        "Scheduled {} deliveries for {} packets ({} lost)",
        schedule.len(),
        total_packets,
        lost
    );

    // ── Jitter buffer ─────────────────────────────────────────────────────────
    let config = JitterBufferConfig {
        sample_rate,
        channels,
        frame_size,
        max_latency_seconds: args.max_latency_seconds,
        decode_mode: if args.prefill {
            DecodeMode::Prefill
        } else {
            DecodeMode::OnDemand
        },
        max_gap_wait_ms: args.max_gap_wait_ms,
        conceal_missing: args.conceal,
        ..Default::default()
    };
    let decoder = OpusDecoder::new(sample_rate, channels)?;
    let mut jitter = JitterBuffer::new(config, decoder)?;
    jitter.set_stale_callback(|stale| {
        log::debug!(
            "Late packet seq={} (playing {})",
            stale.sequence,
            stale.next_sequence_expected
        );
    });
    let shared = SharedJitterBuffer::new(jitter);

    let (mut tx, rx) = packet_queue(args.queue_capacity);
    let mut worker = DecodeWorker::spawn(shared.clone(), rx, Duration::from_millis(5))?;

    // ── Network thread ────────────────────────────────────────────────────────
    let start = Instant::now();
    let network = thread::spawn(move || {
        for packet in schedule {
            let due = start + packet.at;
            let now = Instant::now();
            if due > now {
                thread::sleep(due - now);
            }
            tx.send(packet.sequence, packet.payload);
        }
        log::debug!("Network thread delivered every packet");
    });

    // ── Playback loop ─────────────────────────────────────────────────────────
    let block_samples = (sample_rate as u64 * block_ms / 1000) as usize * channels as usize;
    let total_samples = total_packets * packet_samples;
    let playout_start = start + Duration::from_millis(args.playout_delay_ms);
    let mut played = Vec::with_capacity(total_samples);
    let mut block = vec![0.0f32; block_samples];
    let mut ticks = 0u64;
    let mut last_report = playout_start;

    while played.len() < total_samples {
        let due = playout_start + Duration::from_millis(ticks * block_ms);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }

        shared.read(&mut block, 0, block_samples);
        played.extend_from_slice(&block);
        ticks += 1;

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let stats = shared.statistics();
            log::info!(
                "Stats: decoded={} concealed={} skipped={} stale={} underruns={} silence={:.1}%",
                stats.packets_decoded,
                stats.concealed_frames,
                stats.skipped_sequences,
                stats.stale_packets_dropped,
                stats.underrun_reads,
                stats.silence_ratio() * 100.0
            );
        }
    }

    if network.join().is_err() {
        log::error!("Network thread panicked");
    }
    worker.stop();

    let stats = shared.statistics();
    log::info!("Final statistics: {:#?}", stats);
    println!(
        "{} packets, {} decoded, {} concealed, {} skipped, {} stale, {} duplicates, {:.2}% silence",
        total_packets,
        stats.packets_decoded,
        stats.concealed_frames,
        stats.skipped_sequences,
        stats.stale_packets_dropped,
        stats.duplicate_packets_discarded,
        stats.silence_ratio() * 100.0
    );

    #[cfg(feature = "audio_files")]
    if let Some(path) = &args.output {
        write_wav(path, sample_rate, channels, &played)?;
        log::info!("Wrote {} samples to {}", played.len(), path);
    }

    Ok(())
}

#[cfg(feature = "audio_files")]
fn load_source(args: &Args) -> Result<(u32, u8, Vec<f32>), Box<dyn std::error::Error>> {
    match &args.input {
        Some(path) => read_wav(path),
        None => Ok(tone(args)),
    }
}

#[cfg(not(feature = "audio_files"))]
fn load_source(args: &Args) -> Result<(u32, u8, Vec<f32>), Box<dyn std::error::Error>> {
    Ok(tone(args))
}

fn tone(args: &Args) -> (u32, u8, Vec<f32>) {
    let channels = args.channels.clamp(1, 2);
    let frames = (args.duration_secs.max(0.0) * args.sample_rate as f32) as usize;
    let step = 2.0 * std::f32::consts::PI * args.tone_hz / args.sample_rate as f32;
    let pcm = (0..frames)
        .flat_map(|i| std::iter::repeat((i as f32 * step).sin() * 0.5).take(channels as usize))
        .collect();
    (args.sample_rate, channels, pcm)
}

#[cfg(feature = "audio_files")]
fn read_wav(path: &str) -> Result<(u32, u8, Vec<f32>), Box<dyn std::error::Error>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if ![8000, 12000, 16000, 24000, 48000].contains(&spec.sample_rate) {
        return Err(format!("{} Hz is not an Opus sample rate", spec.sample_rate).into());
    }
    if spec.channels == 0 || spec.channels > 2 {
        return Err(format!("{} channels not supported, use mono or stereo", spec.channels).into());
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Int => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
    };
    log::info!("Loaded {} samples from {}", samples.len(), path);
    Ok((spec.sample_rate, spec.channels as u8, samples))
}

#[cfg(feature = "audio_files")]
fn write_wav(
    path: &str,
    sample_rate: u32,
    channels: u8,
    samples: &[f32],
) -> Result<(), Box<dyn std::error::Error>> {
    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in samples {
        writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
