//! RingBuffer - pre-allocated event slots over a sequencer.
//!
//! Slots are created once by a factory and mutated in place forever after.
//! All coordination (claim, publish, gating) is delegated to the sequencer;
//! the buffer itself only maps `sequence & mask` to a slot.
//!
//! Claiming differs by producer type. A multi-producer ring claims through
//! `&self` from any thread. A single-producer ring claims only through its
//! [`Producer`] handle, which exists at most once and needs `&mut self`.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;

use crate::barrier::SequenceBarrier;
use crate::disruptor::{
    MultiProducerSequencer, Producer, ProducerType, RingBufferConfig, Sequencer,
    SingleProducerSequencer,
};
use crate::error::{KaosError, Result};
use crate::poller::EventPoller;
use crate::sequence::Sequence;
use crate::wait::WaitStrategy;

pub struct RingBuffer<E, S: Sequencer> {
    slots: Box<[UnsafeCell<E>]>,
    mask: i64,
    sequencer: Arc<S>,
}

// Slot access is serialised by the sequencer protocol: a slot is written
// only by the holder of an unpublished claim and read only after publish.
unsafe impl<E: Send, S: Sequencer> Send for RingBuffer<E, S> {}
unsafe impl<E: Send + Sync, S: Sequencer> Sync for RingBuffer<E, S> {}

impl<E, W: WaitStrategy> RingBuffer<E, SingleProducerSequencer<W>> {
    /// Ring buffer for exactly one publishing thread.
    pub fn single_producer<F>(config: RingBufferConfig, factory: F, wait: W) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        let sequencer = SingleProducerSequencer::with_config(&config, wait)?;
        Ok(Self::with_sequencer(sequencer, factory))
    }

    pub fn create_single_producer<F>(factory: F, size: usize, wait: W) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        Self::single_producer(RingBufferConfig::new(size)?, factory, wait)
    }

    /// Take the publishing handle. Fails with `IllegalState` while another
    /// handle is alive; dropping the handle makes it available again.
    pub fn producer(self: &Arc<Self>) -> Result<Producer<E, W>> {
        if !self.sequencer.acquire_producer() {
            return Err(KaosError::IllegalState("single producer handle already taken"));
        }
        Ok(Producer::new(self.clone()))
    }
}

impl<E, W: WaitStrategy> RingBuffer<E, MultiProducerSequencer<W>> {
    /// Ring buffer for any number of publishing threads.
    pub fn multi_producer<F>(config: RingBufferConfig, factory: F, wait: W) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        let sequencer = MultiProducerSequencer::with_config(&config, wait)?;
        Ok(Self::with_sequencer(sequencer, factory))
    }

    pub fn create_multi_producer<F>(factory: F, size: usize, wait: W) -> Result<Self>
    where
        F: FnMut() -> E,
    {
        Self::multi_producer(RingBufferConfig::new(size)?, factory, wait)
    }

    // ------------------------------------------------------------------
    // Producer API
    // ------------------------------------------------------------------

    #[inline]
    pub fn next(&self) -> Result<i64> {
        self.sequencer.next()
    }

    #[inline]
    pub fn next_n(&self, n: usize) -> Result<i64> {
        self.sequencer.next_n(n)
    }

    #[inline]
    pub fn try_next(&self) -> Result<i64> {
        self.sequencer.try_next()
    }

    #[inline]
    pub fn try_next_n(&self, n: usize) -> Result<i64> {
        self.sequencer.try_next_n(n)
    }

    /// Make a claimed sequence visible to consumers.
    ///
    /// # Safety
    ///
    /// `sequence` must have been claimed by the caller, and nothing may still
    /// be writing its slot. Publishing a sequence another thread is filling
    /// lets consumers read the slot while it is written.
    #[inline]
    pub unsafe fn publish(&self, sequence: i64) {
        self.sequencer.publish(sequence)
    }

    /// Make the claimed range `lo..=hi` visible to consumers.
    ///
    /// # Safety
    ///
    /// Same contract as [`publish`](Self::publish), for every sequence in
    /// the range.
    #[inline]
    pub unsafe fn publish_range(&self, lo: i64, hi: i64) {
        self.sequencer.publish_range(lo, hi)
    }

    /// Claim one slot, fill it with `translate` and publish it.
    pub fn publish_event<F>(&self, translate: F) -> Result<i64>
    where
        F: FnOnce(&mut E, i64),
    {
        let sequence = self.sequencer.next()?;
        self.translate_and_publish(sequence, translate);
        Ok(sequence)
    }

    /// Non-blocking [`publish_event`](Self::publish_event); fails with
    /// `InsufficientCapacity` instead of waiting.
    pub fn try_publish_event<F>(&self, translate: F) -> Result<i64>
    where
        F: FnOnce(&mut E, i64),
    {
        let sequence = self.sequencer.try_next()?;
        self.translate_and_publish(sequence, translate);
        Ok(sequence)
    }

    /// Claim `n` slots, fill each with `translate` and publish them together.
    /// Returns the highest published sequence.
    pub fn publish_events<F>(&self, n: usize, translate: F) -> Result<i64>
    where
        F: FnMut(&mut E, i64),
    {
        let hi = self.sequencer.next_n(n)?;
        self.translate_range_and_publish(hi - (n as i64) + 1, hi, translate);
        Ok(hi)
    }

    /// Reset the claim position without publishing.
    ///
    /// # Safety
    ///
    /// No producer may be claiming or publishing. Moving the position back
    /// hands out sequences whose slots consumers may be reading.
    pub unsafe fn claim(&self, sequence: i64) {
        self.sequencer.claim(sequence)
    }
}

impl<E, S: Sequencer> RingBuffer<E, S> {
    /// Wrap an already-built sequencer, filling every slot from `factory`.
    pub fn with_sequencer<F>(sequencer: S, mut factory: F) -> Self
    where
        F: FnMut() -> E,
    {
        let size = sequencer.buffer_size();
        let slots = (0..size)
            .map(|_| UnsafeCell::new(factory()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            mask: size as i64 - 1,
            sequencer: Arc::new(sequencer),
        }
    }

    #[inline]
    pub fn buffer_size(&self) -> usize {
        self.slots.len()
    }

    pub fn producer_type(&self) -> ProducerType {
        self.sequencer.producer_type()
    }

    /// Not public: claiming or publishing through the sequencer would
    /// bypass the ring's producer contract.
    pub(crate) fn sequencer(&self) -> &Arc<S> {
        &self.sequencer
    }

    /// Current published cursor value.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor().get()
    }

    #[inline]
    fn slot(&self, sequence: i64) -> &UnsafeCell<E> {
        &self.slots[(sequence & self.mask) as usize]
    }

    /// Shared access to the slot for `sequence`.
    ///
    /// # Safety
    ///
    /// `sequence` must be published and the caller's own sequence must gate
    /// producers (directly or through a downstream consumer) so the slot is not
    /// reclaimed while the reference lives.
    #[inline]
    pub unsafe fn get(&self, sequence: i64) -> &E {
        &*self.slot(sequence).get()
    }

    /// Exclusive access to the slot for `sequence`.
    ///
    /// # Safety
    ///
    /// The caller must hold an unpublished claim on `sequence`, and must not
    /// use the reference after publishing it.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self, sequence: i64) -> &mut E {
        &mut *self.slot(sequence).get()
    }

    #[inline]
    pub(crate) fn translate_and_publish<F>(&self, sequence: i64, translate: F)
    where
        F: FnOnce(&mut E, i64),
    {
        // SAFETY: `sequence` was just claimed and is not yet published.
        translate(unsafe { self.get_mut(sequence) }, sequence);
        self.sequencer.publish(sequence);
    }

    pub(crate) fn translate_range_and_publish<F>(&self, lo: i64, hi: i64, mut translate: F)
    where
        F: FnMut(&mut E, i64),
    {
        for sequence in lo..=hi {
            // SAFETY: lo..=hi is our unpublished claim.
            translate(unsafe { self.get_mut(sequence) }, sequence);
        }
        self.sequencer.publish_range(lo, hi);
    }

    pub fn is_published(&self, sequence: i64) -> bool {
        self.sequencer.is_available(sequence)
    }

    /// Highest sequence in `lo..=available` such that every sequence from
    /// `lo` up to it is published.
    pub fn highest_published_sequence(&self, lo: i64, available: i64) -> i64 {
        self.sequencer.highest_published_sequence(lo, available)
    }

    pub fn has_available_capacity(&self, required: usize) -> bool {
        self.sequencer.has_available_capacity(required)
    }

    pub fn remaining_capacity(&self) -> i64 {
        self.sequencer.remaining_capacity()
    }

    pub fn alert_producers(&self) {
        self.sequencer.alert_producers()
    }

    pub fn clear_producer_alert(&self) {
        self.sequencer.clear_producer_alert()
    }

    // ------------------------------------------------------------------
    // Consumer wiring
    // ------------------------------------------------------------------

    /// Gate producers on `sequences`; producers never overtake them by more
    /// than the buffer size.
    ///
    /// Processors and pollers register themselves. This is for consumers
    /// built directly on a barrier. Each new sequence is moved to the cursor;
    /// sequences that already gate are left where they are.
    pub fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.sequencer.add_gating_sequences(sequences)
    }

    /// Stop gating on `sequence`.
    ///
    /// # Safety
    ///
    /// The consumer behind `sequence` must no longer hold references into
    /// the ring; producers may overwrite its slots as soon as this returns.
    pub unsafe fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.sequencer.remove_gating_sequence(sequence)
    }

    pub fn minimum_gating_sequence(&self) -> i64 {
        self.sequencer.minimum_gating_sequence()
    }

    /// Barrier over the cursor, or over `dependencies` when given.
    pub fn new_barrier(&self, dependencies: &[Arc<Sequence>]) -> SequenceBarrier<S> {
        SequenceBarrier::new(self.sequencer.clone(), dependencies)
    }

    /// Pull-based consumer over the cursor and `dependencies`. The poller's
    /// sequence gates producers until the poller is dropped.
    pub fn new_poller(self: &Arc<Self>, dependencies: &[Arc<Sequence>]) -> EventPoller<E, S> {
        EventPoller::new(self.clone(), dependencies)
    }
}

impl<E, S: Sequencer> fmt::Debug for RingBuffer<E, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingBuffer")
            .field("buffer_size", &self.buffer_size())
            .field("producer", &self.producer_type())
            .field("cursor", &self.cursor())
            .finish()
    }
}
