//! Single-producer sequencer.
//!
//! Exactly one thread claims and publishes. The claim position and the cached
//! gating minimum live in padded sequences written only by that thread, so a
//! claim is a couple of plain loads and stores unless the buffer is full.

use std::sync::atomic::{self, AtomicBool, Ordering};

use crate::disruptor::{ProducerType, RingBufferConfig, Sequencer, SequencerCore};
use crate::error::{KaosError, Result};
use crate::sequence::{Sequence, INITIAL_CURSOR_VALUE};
use crate::wait::WaitStrategy;

/// Sequencer for a single publishing thread.
///
/// Claims from more than one thread at a time are a logic error: two threads
/// could be handed the same sequence. Once the sequencer backs a
/// [`RingBuffer`](crate::RingBuffer), claims only go through the ring's
/// exclusive [`Producer`](crate::Producer) handle.
pub struct SingleProducerSequencer<W: WaitStrategy> {
    core: SequencerCore<W>,
    /// Highest claimed sequence (producer-local).
    next_value: Sequence,
    /// Last observed gating minimum (producer-local).
    cached_value: Sequence,
    /// Set while a `Producer` handle exists.
    producer_taken: AtomicBool,
}

impl<W: WaitStrategy> SingleProducerSequencer<W> {
    pub fn new(buffer_size: usize, wait: W) -> Result<Self> {
        Self::with_config(&RingBufferConfig::new(buffer_size)?, wait)
    }

    pub fn with_config(config: &RingBufferConfig, wait: W) -> Result<Self> {
        Ok(Self {
            core: SequencerCore::new(config, wait)?,
            next_value: Sequence::new(INITIAL_CURSOR_VALUE),
            cached_value: Sequence::new(INITIAL_CURSOR_VALUE),
            producer_taken: AtomicBool::new(false),
        })
    }

    /// Take the producer token. False if another handle holds it.
    pub(crate) fn acquire_producer(&self) -> bool {
        self.producer_taken
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Hand the token back; the next owner observes every claim made so far.
    pub(crate) fn release_producer(&self) {
        self.producer_taken.store(false, Ordering::Release);
    }

    /// Capacity check shared by `try_next_n` and `has_available_capacity`.
    #[inline]
    fn has_capacity(&self, required: i64) -> bool {
        let next_value = self.next_value.get_plain();
        let wrap_point = next_value + required - self.core.size();
        let cached = self.cached_value.get_plain();

        if wrap_point > cached || cached > next_value {
            // Gating reads must not be hoisted above the last cursor store.
            atomic::fence(Ordering::SeqCst);
            let min = self.core.minimum_gating(next_value);
            self.cached_value.set_plain(min);
            if wrap_point > min {
                return false;
            }
        }
        true
    }
}

impl<W: WaitStrategy> Sequencer for SingleProducerSequencer<W> {
    type Wait = W;

    fn producer_type(&self) -> ProducerType {
        ProducerType::Single
    }

    fn core(&self) -> &SequencerCore<W> {
        &self.core
    }

    fn next_n(&self, n: usize) -> Result<i64> {
        let n = self.core.check_claim(n)?;
        if self.core.producers_alerted() {
            return Err(KaosError::Alerted);
        }

        let next_value = self.next_value.get_plain();
        let next_sequence = next_value + n;
        let wrap_point = next_sequence - self.core.size();
        let cached = self.cached_value.get_plain();

        if wrap_point > cached || cached > next_value {
            atomic::fence(Ordering::SeqCst);
            let min = self.core.await_capacity(wrap_point, next_value)?;
            self.cached_value.set_plain(min);
        }

        self.next_value.set_plain(next_sequence);
        Ok(next_sequence)
    }

    fn try_next_n(&self, n: usize) -> Result<i64> {
        let n = self.core.check_claim(n)?;
        if self.core.producers_alerted() {
            return Err(KaosError::Alerted);
        }
        if !self.has_capacity(n) {
            return Err(KaosError::InsufficientCapacity);
        }
        let next_sequence = self.next_value.get_plain() + n;
        self.next_value.set_plain(next_sequence);
        Ok(next_sequence)
    }

    #[inline]
    fn publish(&self, sequence: i64) {
        self.core.cursor.set(sequence);
        self.core.wait.signal_all_when_blocking();
    }

    #[inline]
    fn publish_range(&self, _lo: i64, hi: i64) {
        self.publish(hi);
    }

    fn is_available(&self, sequence: i64) -> bool {
        let cursor = self.core.cursor.get();
        sequence <= cursor && sequence > cursor - self.core.size()
    }

    #[inline]
    fn highest_published_sequence(&self, _lo: i64, available: i64) -> i64 {
        available
    }

    fn has_available_capacity(&self, required: usize) -> bool {
        self.has_capacity(required as i64)
    }

    fn remaining_capacity(&self) -> i64 {
        let next_value = self.next_value.get_plain();
        let consumed = self.core.minimum_gating(next_value);
        self.core.size() - (next_value - consumed)
    }

    fn claim(&self, sequence: i64) {
        self.next_value.set_plain(sequence);
    }
}
