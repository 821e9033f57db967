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

//! Producer/consumer plumbing around [`JitterBuffer`].
//!
//! A typical session has three threads:
//!
//! * the network thread pushes packets into a [`PacketSender`]
//! * a [`DecodeWorker`] drains the matching [`PacketReceiver`] into the
//!   buffer and, in [`DecodeMode::Prefill`], decodes ahead of playback
//! * the audio callback calls [`SharedJitterBuffer::read`], which never
//!   waits for the lock

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread::{self, JoinHandle};

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};
use web_time::Duration;

use crate::codec::AudioDecoder;
use crate::jitter::{DecodeMode, JitterBuffer};
use crate::statistics::JitterStatistics;
use crate::store::InsertResult;
use crate::{EncodedPacket, JitterError, Result};

/// Build a bounded single-producer/single-consumer packet queue
pub fn packet_queue(capacity: usize) -> (PacketSender, PacketReceiver) {
    let (producer, consumer) = HeapRb::<EncodedPacket>::new(capacity.max(1)).split();
    let drops = Arc::new(AtomicU64::new(0));
    (
        PacketSender {
            producer,
            drops: drops.clone(),
        },
        PacketReceiver { consumer, drops },
    )
}

/// Network side of the ingress queue
pub struct PacketSender {
    producer: HeapProducer<EncodedPacket>,
    drops: Arc<AtomicU64>,
}

impl PacketSender {
    /// Queue a packet without blocking.
    ///
    /// Returns `false` if the queue was full and the packet was dropped.
    pub fn send(&mut self, sequence: i64, payload: Vec<u8>) -> bool {
        self.send_packet(EncodedPacket::new(sequence, payload))
    }

    pub fn send_packet(&mut self, packet: EncodedPacket) -> bool {
        match self.producer.push(packet) {
            Ok(()) => true,
            Err(packet) => {
                self.drops.fetch_add(1, Ordering::Relaxed);
                log::warn!("Ingress queue full, dropping seq={}", packet.sequence);
                false
            }
        }
    }

    /// Packets dropped so far because the queue was full
    pub fn dropped(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

/// Decode side of the ingress queue
pub struct PacketReceiver {
    consumer: HeapConsumer<EncodedPacket>,
    drops: Arc<AtomicU64>,
}

impl PacketReceiver {
    pub fn recv(&mut self) -> Option<EncodedPacket> {
        self.consumer.pop()
    }

    pub fn len(&self) -> usize {
        self.consumer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumer.is_empty()
    }

    /// Move every queued packet into `jitter`, returning how many were moved
    pub fn drain_into<D: AudioDecoder>(&mut self, jitter: &mut JitterBuffer<D>) -> usize {
        let mut moved = 0;
        while let Some(packet) = self.consumer.pop() {
            jitter.insert_packet(packet);
            moved += 1;
        }
        moved
    }

    pub fn dropped(&self) -> u64 {
        self.drops.load(Ordering::Relaxed)
    }
}

struct SharedState<D> {
    buffer: Mutex<JitterBuffer<D>>,
    contended_reads: AtomicU64,
    contended_samples: AtomicU64,
    queue_drops: AtomicU64,
}

/// Cloneable handle to a jitter buffer shared between threads
pub struct SharedJitterBuffer<D> {
    state: Arc<SharedState<D>>,
}

impl<D> Clone for SharedJitterBuffer<D> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<D: AudioDecoder> SharedJitterBuffer<D> {
    pub fn new(jitter: JitterBuffer<D>) -> Self {
        Self {
            state: Arc::new(SharedState {
                buffer: Mutex::new(jitter),
                contended_reads: AtomicU64::new(0),
                contended_samples: AtomicU64::new(0),
                queue_drops: AtomicU64::new(0),
            }),
        }
    }

    /// Lock the buffer, recovering it if a holder panicked
    pub fn lock(&self) -> MutexGuard<'_, JitterBuffer<D>> {
        self.state
            .buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Same contract as [`JitterBuffer::read`], but never blocks.
    ///
    /// If another thread holds the buffer the range is filled with silence
    /// and `0` is returned.
    pub fn read(&self, dst: &mut [f32], offset: usize, count: usize) -> usize {
        let mut jitter = match self.state.buffer.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                let end = offset.saturating_add(count).min(dst.len());
                let out = &mut dst[offset.min(end)..end];
                out.fill(0.0);
                self.state.contended_reads.fetch_add(1, Ordering::Relaxed);
                self.state
                    .contended_samples
                    .fetch_add(out.len() as u64, Ordering::Relaxed);
                return 0;
            }
        };
        jitter.read(dst, offset, count)
    }

    pub fn add_encoded_packet(&self, sequence: i64, payload: Vec<u8>) -> InsertResult {
        self.lock().add_encoded_packet(sequence, payload)
    }

    pub fn prefill(&self) -> usize {
        self.lock().prefill()
    }

    pub fn flush(&self) {
        self.lock().flush();
    }

    /// Buffer counters plus the ones kept outside the lock.
    ///
    /// Contended reads are folded into `reads`, `underrun_reads` and
    /// `silent_samples` as well.
    pub fn statistics(&self) -> JitterStatistics {
        let mut stats = self.lock().statistics();
        let contended = self.state.contended_reads.load(Ordering::Relaxed);
        stats.contended_reads = contended;
        stats.reads += contended;
        stats.underrun_reads += contended;
        stats.silent_samples += self.state.contended_samples.load(Ordering::Relaxed);
        stats.queue_drops = self.state.queue_drops.load(Ordering::Relaxed);
        stats
    }

    fn publish_queue_drops(&self, drops: u64) {
        self.state.queue_drops.store(drops, Ordering::Relaxed);
    }
}

/// Background thread feeding a [`SharedJitterBuffer`].
///
/// Every `interval` it moves queued packets into the buffer. Under
/// [`DecodeMode::Prefill`] it also decodes until the ring is full; under
/// [`DecodeMode::OnDemand`] decoding is left to `read`. Stopped by
/// [`DecodeWorker::stop`] or on drop.
pub struct DecodeWorker {
    quit: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DecodeWorker {
    pub fn spawn<D>(
        buffer: SharedJitterBuffer<D>,
        mut receiver: PacketReceiver,
        interval: Duration,
    ) -> Result<Self>
    where
        D: AudioDecoder + Send + 'static,
    {
        let quit = Arc::new(AtomicBool::new(false));
        let quit_clone = quit.clone();

        let handle = thread::Builder::new()
            .name("jitter-decode".into())
            .spawn(move || {
                log::debug!("Decode worker started ({interval:?} interval)");
                while !quit_clone.load(Ordering::Acquire) {
                    {
                        let mut jitter = buffer.lock();
                        receiver.drain_into(&mut *jitter);
                        if jitter.config().decode_mode == DecodeMode::Prefill {
                            jitter.prefill();
                        }
                    }
                    buffer.publish_queue_drops(receiver.dropped());
                    thread::park_timeout(interval);
                }
                log::debug!("Decode worker stopped");
            })
            .map_err(|e| JitterError::WorkerSpawn(e.to_string()))?;

        Ok(Self {
            quit,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(&mut self) {
        self.quit.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                log::error!("Decode worker panicked");
            }
        }
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
