//! Exclusive publishing handle for a single-producer ring.
//!
//! The single-producer sequencer claims with plain loads and stores, so only
//! one thread may claim at a time. `RingBuffer::producer` hands out at most one
//! `Producer`, and every claim goes through `&mut self`.

use std::fmt;
use std::sync::Arc;

use crate::disruptor::{RingBuffer, Sequencer, SingleProducerSequencer};
use crate::error::Result;
use crate::wait::WaitStrategy;

type SingleRing<E, W> = RingBuffer<E, SingleProducerSequencer<W>>;

/// The only claim path into a single-producer [`RingBuffer`].
///
/// Move it to the publishing thread. Dropping it releases the handle so
/// another thread can take over.
pub struct Producer<E, W: WaitStrategy> {
    ring: Arc<SingleRing<E, W>>,
}

impl<E, W: WaitStrategy> Producer<E, W> {
    pub(crate) fn new(ring: Arc<SingleRing<E, W>>) -> Self {
        Self { ring }
    }

    pub fn ring(&self) -> &Arc<SingleRing<E, W>> {
        &self.ring
    }

    #[inline]
    pub fn next(&mut self) -> Result<i64> {
        self.ring.sequencer().next()
    }

    #[inline]
    pub fn next_n(&mut self, n: usize) -> Result<i64> {
        self.ring.sequencer().next_n(n)
    }

    #[inline]
    pub fn try_next(&mut self) -> Result<i64> {
        self.ring.sequencer().try_next()
    }

    #[inline]
    pub fn try_next_n(&mut self, n: usize) -> Result<i64> {
        self.ring.sequencer().try_next_n(n)
    }

    /// Make a claimed sequence visible to consumers.
    ///
    /// # Safety
    ///
    /// `sequence` must have been claimed through this handle and its slot
    /// fully written. Publishing ahead of the claims lets consumers read
    /// slots the producer will write later.
    #[inline]
    pub unsafe fn publish(&mut self, sequence: i64) {
        self.ring.sequencer().publish(sequence)
    }

    /// Make the claimed range `lo..=hi` visible to consumers.
    ///
    /// # Safety
    ///
    /// Same contract as [`publish`](Self::publish).
    #[inline]
    pub unsafe fn publish_range(&mut self, lo: i64, hi: i64) {
        self.ring.sequencer().publish_range(lo, hi)
    }

    /// Claim one slot, fill it with `translate` and publish it.
    pub fn publish_event<F>(&mut self, translate: F) -> Result<i64>
    where
        F: FnOnce(&mut E, i64),
    {
        let sequence = self.ring.sequencer().next()?;
        self.ring.translate_and_publish(sequence, translate);
        Ok(sequence)
    }

    /// Non-blocking [`publish_event`](Self::publish_event); fails with
    /// `InsufficientCapacity` instead of waiting.
    pub fn try_publish_event<F>(&mut self, translate: F) -> Result<i64>
    where
        F: FnOnce(&mut E, i64),
    {
        let sequence = self.ring.sequencer().try_next()?;
        self.ring.translate_and_publish(sequence, translate);
        Ok(sequence)
    }

    /// Claim `n` slots, fill each with `translate` and publish them together.
    /// Returns the highest published sequence.
    pub fn publish_events<F>(&mut self, n: usize, translate: F) -> Result<i64>
    where
        F: FnMut(&mut E, i64),
    {
        let hi = self.ring.sequencer().next_n(n)?;
        self.ring
            .translate_range_and_publish(hi - (n as i64) + 1, hi, translate);
        Ok(hi)
    }

    /// Reset the claim position without publishing.
    ///
    /// # Safety
    ///
    /// Moving the position back hands out sequences whose slots consumers
    /// may still be reading. Only use it before any consumer runs.
    pub unsafe fn claim(&mut self, sequence: i64) {
        self.ring.sequencer().claim(sequence)
    }
}

impl<E, W: WaitStrategy> Drop for Producer<E, W> {
    fn drop(&mut self) {
        self.ring.sequencer().release_producer();
    }
}

impl<E, W: WaitStrategy> fmt::Debug for Producer<E, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("cursor", &self.ring.cursor())
            .finish()
    }
}
