//! Sequence verification utilities for testing delivery guarantees.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

/// Checks sequence continuity for one consumer and records gaps.
pub struct SequenceChecker {
    /// Expected next sequence
    next_expected: AtomicI64,
    /// Gaps detected: (start, end)
    gaps: Mutex<Vec<(i64, i64)>>,
    /// Total sequences seen
    total_seen: AtomicU64,
    /// Repeats or late arrivals
    out_of_order: AtomicU64,
    /// Highest sequence seen
    highest_seen: AtomicI64,
}

impl Default for SequenceChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl SequenceChecker {
    pub fn new() -> Self {
        Self::with_start(0)
    }

    pub fn with_start(start: i64) -> Self {
        Self {
            next_expected: AtomicI64::new(start),
            gaps: Mutex::new(Vec::new()),
            total_seen: AtomicU64::new(0),
            out_of_order: AtomicU64::new(0),
            highest_seen: AtomicI64::new(start - 1),
        }
    }

    /// Check a sequence number
    pub fn check(&self, seq: i64) -> SequenceStatus {
        self.total_seen.fetch_add(1, Ordering::Relaxed);
        self.highest_seen.fetch_max(seq, Ordering::Relaxed);

        let expected = self.next_expected.load(Ordering::Relaxed);

        if seq == expected {
            self.next_expected.store(seq + 1, Ordering::Relaxed);
            SequenceStatus::InOrder
        } else if seq < expected {
            // Repeat or late arrival
            self.out_of_order.fetch_add(1, Ordering::Relaxed);
            SequenceStatus::OutOfOrder
        } else {
            let gap = (expected, seq - 1);
            self.gaps.lock().unwrap().push(gap);
            self.next_expected.store(seq + 1, Ordering::Relaxed);
            SequenceStatus::Gap {
                start: gap.0,
                end: gap.1,
            }
        }
    }

    /// Get all detected gaps
    pub fn gaps(&self) -> Vec<(i64, i64)> {
        self.gaps.lock().unwrap().clone()
    }

    /// Number of missing sequences across all gaps
    pub fn total_gap_size(&self) -> u64 {
        self.gaps
            .lock()
            .unwrap()
            .iter()
            .map(|(start, end)| (end - start + 1) as u64)
            .sum()
    }

    pub fn stats(&self) -> SequenceStats {
        let gaps = self.gaps.lock().unwrap();
        SequenceStats {
            total_seen: self.total_seen.load(Ordering::Relaxed),
            highest_seen: self.highest_seen.load(Ordering::Relaxed),
            gap_count: gaps.len() as u64,
            total_missing: gaps.iter().map(|(s, e)| (e - s + 1) as u64).sum(),
            out_of_order: self.out_of_order.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceStatus {
    InOrder,
    OutOfOrder,
    Gap { start: i64, end: i64 },
}

#[derive(Debug, Clone)]
pub struct SequenceStats {
    pub total_seen: u64,
    pub highest_seen: i64,
    pub gap_count: u64,
    pub total_missing: u64,
    pub out_of_order: u64,
}

impl SequenceStats {
    pub fn is_perfect(&self) -> bool {
        self.gap_count == 0 && self.out_of_order == 0
    }
}

/// Verifies per-producer FIFO order when several producers interleave.
///
/// Each event carries `(producer, counter)`; counters from one producer must
/// arrive strictly increasing by one, whatever the interleaving.
#[derive(Default)]
pub struct ProducerOrderChecker {
    next: Mutex<HashMap<u32, u64>>,
    violations: AtomicU64,
    total_seen: AtomicU64,
}

impl ProducerOrderChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if `counter` is not the next one expected from `producer`.
    pub fn check(&self, producer: u32, counter: u64) -> bool {
        self.total_seen.fetch_add(1, Ordering::Relaxed);
        let mut next = self.next.lock().unwrap();
        let expected = next.entry(producer).or_insert(0);
        let in_order = counter == *expected;
        if !in_order {
            self.violations.fetch_add(1, Ordering::Relaxed);
        }
        *expected = counter + 1;
        in_order
    }

    pub fn violations(&self) -> u64 {
        self.violations.load(Ordering::Relaxed)
    }

    pub fn total_seen(&self) -> u64 {
        self.total_seen.load(Ordering::Relaxed)
    }

    /// Count received from `producer` so far.
    pub fn seen_from(&self, producer: u32) -> u64 {
        self.next
            .lock()
            .unwrap()
            .get(&producer)
            .copied()
            .unwrap_or(0)
    }
}
