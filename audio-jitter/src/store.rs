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

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::statistics::StatisticsCalculator;
use crate::EncodedPacket;

/// Outcome of handing a packet to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Packet is pending decode
    Stored,
    /// Packet was behind decode progress and was dropped
    Stale,
    /// Packet was stored but the store was full, so the lowest pending
    /// sequence was evicted to make room
    Overflowed { evicted: i64 },
}

/// Heap entry ordered by `(sequence, arrival index)`, smallest first.
#[derive(Debug)]
struct Pending {
    key: Reverse<(i64, u64)>,
    packet: EncodedPacket,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Packets that have arrived but are not decoded yet.
///
/// Selection is always by lowest sequence number, never by arrival order.
/// Packets sharing a sequence number come out in the order they went in.
#[derive(Debug, Default)]
pub struct PacketStore {
    heap: BinaryHeap<Pending>,
    /// Maximum number of pending packets (0 = no limit)
    max_packets: usize,
    /// Monotonic counter used to break ties between equal sequences
    arrivals: u64,
    highest_sequence_seen: Option<i64>,
}

impl PacketStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding at most `max_packets` packets (0 = no limit)
    pub fn with_capacity(max_packets: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(max_packets),
            max_packets,
            ..Self::default()
        }
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Get the number of pending packets
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Insert a packet unless it is already behind `next_sequence_expected`.
    ///
    /// Duplicates of a pending sequence are kept; the orchestrator discards
    /// the extra copies when they surface behind decode progress.
    pub fn insert(
        &mut self,
        packet: EncodedPacket,
        next_sequence_expected: i64,
        stats: &mut StatisticsCalculator,
    ) -> InsertResult {
        stats.packet_received();

        if packet.is_stale(next_sequence_expected) {
            stats.stale_packet_dropped();
            return InsertResult::Stale;
        }

        match self.highest_sequence_seen {
            Some(highest) if packet.sequence < highest => {
                stats.packet_reordered(highest - packet.sequence);
            }
            _ => self.highest_sequence_seen = Some(packet.sequence),
        }

        let mut result = InsertResult::Stored;
        if self.max_packets > 0 && self.heap.len() >= self.max_packets {
            if let Some(evicted) = self.pop_earliest() {
                log::debug!(
                    "Packet store full ({} packets): evicted seq={}",
                    self.max_packets,
                    evicted.sequence
                );
                stats.overflow_packet_dropped();
                result = InsertResult::Overflowed {
                    evicted: evicted.sequence,
                };
            }
        }

        let index = self.arrivals;
        self.arrivals += 1;
        self.heap.push(Pending {
            key: Reverse((packet.sequence, index)),
            packet,
        });
        stats.packet_stored();

        result
    }

    /// Remove and return the packet with the lowest sequence number
    pub fn pop_earliest(&mut self) -> Option<EncodedPacket> {
        self.heap.pop().map(|pending| pending.packet)
    }

    /// Look at the packet `pop_earliest` would return
    pub fn peek_earliest(&self) -> Option<&EncodedPacket> {
        self.heap.peek().map(|pending| &pending.packet)
    }

    /// Drop every pending packet
    pub fn clear(&mut self, stats: &mut StatisticsCalculator) {
        let flushed_count = self.heap.len();
        self.heap.clear();
        self.highest_sequence_seen = None;

        if flushed_count > 0 {
            stats.buffer_flush(flushed_count as u64);
            log::debug!("Flushed {flushed_count} packets from store");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: i64, tag: u8) -> EncodedPacket {
        EncodedPacket::new(seq, vec![tag])
    }

    #[test]
    fn test_store_creation() {
        let store = PacketStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.peek_earliest().is_none());
    }

    #[test]
    fn test_pop_earliest_orders_by_sequence() {
        let mut store = PacketStore::new();
        let mut stats = StatisticsCalculator::new();

        // Insert packets out of order
        store.insert(packet(5, 5), 0, &mut stats);
        store.insert(packet(3, 3), 0, &mut stats);
        store.insert(packet(4, 4), 0, &mut stats);

        assert_eq!(store.len(), 3);
        assert_eq!(store.peek_earliest().map(|p| p.sequence), Some(3));

        let order: Vec<i64> = std::iter::from_fn(|| store.pop_earliest())
            .map(|p| p.sequence)
            .collect();
        assert_eq!(order, vec![3, 4, 5]);
        assert!(store.pop_earliest().is_none());
    }

    #[test]
    fn test_stale_packet_rejected() {
        let mut store = PacketStore::new();
        let mut stats = StatisticsCalculator::new();

        assert_eq!(store.insert(packet(9, 0), 10, &mut stats), InsertResult::Stale);
        assert!(store.is_empty());
        assert_eq!(stats.snapshot().stale_packets_dropped, 1);

        // Equal to the expected sequence is not stale
        assert_eq!(
            store.insert(packet(10, 0), 10, &mut stats),
            InsertResult::Stored
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_duplicates_retained_in_insertion_order() {
        let mut store = PacketStore::new();
        let mut stats = StatisticsCalculator::new();

        store.insert(packet(1, 0xA), 0, &mut stats);
        store.insert(packet(1, 0xB), 0, &mut stats);
        store.insert(packet(0, 0xC), 0, &mut stats);

        assert_eq!(store.len(), 3);
        assert_eq!(store.pop_earliest().unwrap().payload, vec![0xC]);
        assert_eq!(store.pop_earliest().unwrap().payload, vec![0xA]);
        assert_eq!(store.pop_earliest().unwrap().payload, vec![0xB]);
    }

    #[test]
    fn test_bounded_store_evicts_lowest() {
        let mut store = PacketStore::with_capacity(2);
        let mut stats = StatisticsCalculator::new();

        store.insert(packet(1, 0), 0, &mut stats);
        store.insert(packet(2, 0), 0, &mut stats);
        let result = store.insert(packet(3, 0), 0, &mut stats);

        assert_eq!(result, InsertResult::Overflowed { evicted: 1 });
        assert_eq!(store.len(), 2);
        assert_eq!(store.peek_earliest().map(|p| p.sequence), Some(2));
        assert_eq!(stats.snapshot().overflow_packets_dropped, 1);
    }

    #[test]
    fn test_reorder_detection() {
        let mut store = PacketStore::new();
        let mut stats = StatisticsCalculator::new();

        store.insert(packet(5, 0), 0, &mut stats);
        store.insert(packet(3, 0), 0, &mut stats);
        store.insert(packet(6, 0), 0, &mut stats);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.reordered_packets, 1);
        assert_eq!(snapshot.max_reorder_distance, 2);
    }

    #[test]
    fn test_clear() {
        let mut store = PacketStore::new();
        let mut stats = StatisticsCalculator::new();

        store.insert(packet(1, 0), 0, &mut stats);
        store.insert(packet(2, 0), 0, &mut stats);
        store.clear(&mut stats);

        assert!(store.is_empty());
        assert_eq!(stats.snapshot().flushed_packets, 2);
    }
}
