//! Multi-producer sequencer.
//!
//! Producers race on a padded claim counter with CAS, so two producers never
//! receive overlapping ranges. Claims complete out of order, so publishing a
//! slot only stamps its availability marker with the slot's wrap round; the
//! cursor is then advanced through the contiguous run of stamped slots
//! starting at `cursor + 1`, by whichever publisher observes it.

use std::sync::atomic::{self, AtomicI64, Ordering};

use crate::disruptor::{ProducerType, RingBufferConfig, Sequencer, SequencerCore};
use crate::error::{KaosError, Result};
use crate::sequence::{Sequence, INITIAL_CURSOR_VALUE};
use crate::wait::WaitStrategy;

/// Sequencer safe for any number of concurrent publishing threads.
pub struct MultiProducerSequencer<W: WaitStrategy> {
    core: SequencerCore<W>,
    /// Highest claimed sequence; multi-writer via CAS.
    claimed: Sequence,
    /// Last observed gating minimum, shared by all producers.
    gating_cache: Sequence,
    /// Per-slot wrap round of the last publish, `-1` before the first.
    available: Box<[AtomicI64]>,
    index_mask: i64,
    index_shift: u32,
}

impl<W: WaitStrategy> MultiProducerSequencer<W> {
    pub fn new(buffer_size: usize, wait: W) -> Result<Self> {
        Self::with_config(&RingBufferConfig::new(buffer_size)?, wait)
    }

    pub fn with_config(config: &RingBufferConfig, wait: W) -> Result<Self> {
        let core = SequencerCore::new(config, wait)?;
        let size = core.buffer_size();
        let available = (0..size)
            .map(|_| AtomicI64::new(-1))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Ok(Self {
            index_mask: size as i64 - 1,
            index_shift: size.trailing_zeros(),
            core,
            claimed: Sequence::new(INITIAL_CURSOR_VALUE),
            gating_cache: Sequence::new(INITIAL_CURSOR_VALUE),
            available,
        })
    }

    #[inline]
    fn round(&self, sequence: i64) -> i64 {
        sequence >> self.index_shift
    }

    #[inline]
    fn marker(&self, sequence: i64) -> &AtomicI64 {
        &self.available[(sequence & self.index_mask) as usize]
    }

    #[inline]
    fn set_available(&self, sequence: i64) {
        self.marker(sequence)
            .store(self.round(sequence), Ordering::Release);
    }

    /// Advance the cursor over every contiguous published slot after it.
    ///
    /// Runs until a scan finds nothing new, so a publish that raced with a
    /// successful advance is still picked up by one of the two publishers.
    fn advance_cursor(&self) {
        let cursor = &self.core.cursor;
        loop {
            atomic::fence(Ordering::SeqCst);
            let current = cursor.get();
            let mut next = current;
            while self.is_available(next + 1) {
                next += 1;
            }
            if next == current {
                return;
            }
            // On failure another publisher moved the cursor; rescan from there.
            cursor.compare_and_set(current, next);
        }
    }

    /// True if `n` more slots fit after `current` claims.
    #[inline]
    fn has_capacity(&self, current: i64, n: i64) -> bool {
        let wrap_point = current + n - self.core.size();
        let cached = self.gating_cache.get();

        if wrap_point > cached || cached > current {
            let min = self.core.minimum_gating(current);
            self.gating_cache.set(min);
            if wrap_point > min {
                return false;
            }
        }
        true
    }
}

impl<W: WaitStrategy> Sequencer for MultiProducerSequencer<W> {
    type Wait = W;

    fn producer_type(&self) -> ProducerType {
        ProducerType::Multi
    }

    fn core(&self) -> &SequencerCore<W> {
        &self.core
    }

    fn next_n(&self, n: usize) -> Result<i64> {
        let n = self.core.check_claim(n)?;

        loop {
            if self.core.producers_alerted() {
                return Err(KaosError::Alerted);
            }

            let current = self.claimed.get();
            let next = current + n;
            let wrap_point = next - self.core.size();
            let cached = self.gating_cache.get();

            if wrap_point > cached || cached > current {
                let min = self.core.await_capacity(wrap_point, current)?;
                self.gating_cache.set(min);
                // Re-read the claim counter: others may have claimed meanwhile.
                continue;
            }

            if self.claimed.compare_and_set(current, next) {
                return Ok(next);
            }
            std::hint::spin_loop();
        }
    }

    fn try_next_n(&self, n: usize) -> Result<i64> {
        let n = self.core.check_claim(n)?;

        loop {
            if self.core.producers_alerted() {
                return Err(KaosError::Alerted);
            }
            let current = self.claimed.get();
            let next = current + n;
            if !self.has_capacity(current, n) {
                return Err(KaosError::InsufficientCapacity);
            }
            if self.claimed.compare_and_set(current, next) {
                return Ok(next);
            }
        }
    }

    fn publish(&self, sequence: i64) {
        self.set_available(sequence);
        self.advance_cursor();
        self.core.wait.signal_all_when_blocking();
    }

    fn publish_range(&self, lo: i64, hi: i64) {
        for sequence in lo..=hi {
            self.set_available(sequence);
        }
        self.advance_cursor();
        self.core.wait.signal_all_when_blocking();
    }

    #[inline]
    fn is_available(&self, sequence: i64) -> bool {
        self.marker(sequence).load(Ordering::Acquire) == self.round(sequence)
    }

    fn highest_published_sequence(&self, lo: i64, available: i64) -> i64 {
        for sequence in lo..=available {
            if !self.is_available(sequence) {
                return sequence - 1;
            }
        }
        available
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity(self.claimed.get(), required as i64)
    }

    fn remaining_capacity(&self) -> i64 {
        let produced = self.claimed.get();
        let consumed = self.core.minimum_gating(produced);
        self.core.size() - (produced - consumed)
    }

    fn claim(&self, sequence: i64) {
        self.claimed.set(sequence);
    }
}
