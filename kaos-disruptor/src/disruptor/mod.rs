//! Ring buffer and the sequencers that coordinate it.
//!
//! - `SingleProducerSequencer<W>` - one publishing thread, no CAS on claim
//! - `MultiProducerSequencer<W>` - CAS claim, per-slot availability markers
//! - `RingBuffer<E, S>` - pre-allocated slots indexed by `sequence & mask`
//!
//! Both sequencers share [`SequencerCore`]: the published cursor, the gating
//! set (copy-on-write, so claims never lock) and the producer alert flag.

mod multi;
mod producer;
mod ring_buffer;
mod single;

pub use multi::MultiProducerSequencer;
pub use producer::Producer;
pub use ring_buffer::RingBuffer;
pub use single::SingleProducerSequencer;

use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;

use crate::error::{KaosError, Result};
use crate::sequence::{minimum_sequence, Sequence, INITIAL_CURSOR_VALUE};
use crate::wait::WaitStrategy;

/// Default ring buffer size (must be power of 2)
const DEFAULT_RING_BUFFER_SIZE: usize = 64 * 1024; // 64K slots

/// Spins before a stalled producer starts yielding.
const PRODUCER_SPIN_TRIES: u32 = 64;

/// Which claim protocol a sequencer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerType {
    Single,
    Multi,
}

/// Configuration for ring buffer construction
#[derive(Debug, Clone)]
pub struct RingBufferConfig {
    /// Size of the ring buffer (must be power of 2)
    pub size: usize,
    /// Largest claim a single `next_n`/`try_next_n` may request
    pub max_batch: usize,
}

impl Default for RingBufferConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_RING_BUFFER_SIZE,
            max_batch: DEFAULT_RING_BUFFER_SIZE,
        }
    }
}

impl RingBufferConfig {
    /// Create a new configuration with the specified size
    pub fn new(size: usize) -> Result<Self> {
        if size == 0 {
            return Err(KaosError::invalid("buffer size must be greater than 0"));
        }
        if !size.is_power_of_two() {
            return Err(KaosError::invalid("buffer size must be a power of 2"));
        }
        if size > i64::MAX as usize / 2 {
            return Err(KaosError::invalid("buffer size too large"));
        }

        Ok(Self {
            size,
            max_batch: size,
        })
    }

    /// Cap the number of slots one claim may request.
    pub fn with_max_batch(mut self, max_batch: usize) -> Result<Self> {
        if max_batch == 0 {
            return Err(KaosError::invalid("max batch must be greater than 0"));
        }
        if max_batch > self.size {
            return Err(KaosError::invalid("max batch cannot exceed buffer size"));
        }

        self.max_batch = max_batch;
        Ok(self)
    }
}

/// Claim/publish protocol over a ring of `buffer_size` slots.
///
/// Sequencers are shared between the producer side (claim, publish) and the
/// consumer side (cursor, availability), so every operation takes `&self`.
pub trait Sequencer: Send + Sync + 'static {
    /// Strategy consumers use to wait on this sequencer's cursor.
    type Wait: WaitStrategy;

    fn producer_type(&self) -> ProducerType;

    fn core(&self) -> &SequencerCore<Self::Wait>;

    fn buffer_size(&self) -> usize {
        self.core().buffer_size
    }

    /// Published cursor. For the multi-producer variant this only ever moves
    /// through a contiguous published prefix.
    fn cursor(&self) -> &Arc<Sequence> {
        &self.core().cursor
    }

    fn wait_strategy(&self) -> &Self::Wait {
        &self.core().wait
    }

    /// Claim the next slot, waiting for capacity.
    fn next(&self) -> Result<i64> {
        self.next_n(1)
    }

    /// Claim `n` contiguous slots, waiting for capacity. Returns the highest
    /// claimed sequence; the range is `hi - n + 1 ..= hi`.
    fn next_n(&self, n: usize) -> Result<i64>;

    fn try_next(&self) -> Result<i64> {
        self.try_next_n(1)
    }

    /// Claim `n` slots or fail with `InsufficientCapacity` without waiting.
    fn try_next_n(&self, n: usize) -> Result<i64>;

    /// Make `sequence` visible to consumers.
    fn publish(&self, sequence: i64);

    /// Make `lo..=hi` visible to consumers.
    fn publish_range(&self, lo: i64, hi: i64);

    /// True once `sequence` is published and not yet overwritten.
    fn is_available(&self, sequence: i64) -> bool;

    /// Highest sequence in `lo..=available` such that every sequence from
    /// `lo` up to it is published; `lo - 1` if `lo` itself is not.
    fn highest_published_sequence(&self, lo: i64, available: i64) -> i64;

    fn has_available_capacity(&self, required: usize) -> bool;

    /// Free slots between the last claim and the slowest gating sequence.
    fn remaining_capacity(&self) -> i64;

    /// Move the claim position to `sequence` without publishing. For
    /// initialisation only; never call while producers are active.
    fn claim(&self, sequence: i64);

    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        self.core().add_gating_sequences(sequences)
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        self.core().remove_gating_sequence(sequence)
    }

    /// Minimum of the gating sequences and the cursor.
    fn minimum_gating_sequence(&self) -> i64 {
        let core = self.core();
        core.minimum_gating(core.cursor.get())
    }

    /// Make blocked and future claims fail with `KaosError::Alerted`.
    fn alert_producers(&self) {
        self.core().producers_alerted.store(true, Ordering::Release);
    }

    fn clear_producer_alert(&self) {
        self.core().producers_alerted.store(false, Ordering::Release);
    }

    fn is_producer_alerted(&self) -> bool {
        self.core().producers_alerted()
    }
}

/// State shared by both sequencer variants.
pub struct SequencerCore<W> {
    buffer_size: usize,
    max_batch: usize,
    cursor: Arc<Sequence>,
    wait: W,
    gating: ArcSwap<Vec<Arc<Sequence>>>,
    producers_alerted: AtomicBool,
}

impl<W: WaitStrategy> SequencerCore<W> {
    fn new(config: &RingBufferConfig, wait: W) -> Result<Self> {
        // Re-validate: the fields are public.
        let checked = RingBufferConfig::new(config.size)?.with_max_batch(config.max_batch)?;
        Ok(Self {
            buffer_size: checked.size,
            max_batch: checked.max_batch,
            cursor: Arc::new(Sequence::new(INITIAL_CURSOR_VALUE)),
            wait,
            gating: ArcSwap::from_pointee(Vec::new()),
            producers_alerted: AtomicBool::new(false),
        })
    }

    #[inline]
    fn size(&self) -> i64 {
        self.buffer_size as i64
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    pub fn cursor(&self) -> &Arc<Sequence> {
        &self.cursor
    }

    pub fn wait_strategy(&self) -> &W {
        &self.wait
    }

    /// Validate a claim size.
    #[inline]
    fn check_claim(&self, n: usize) -> Result<i64> {
        if n < 1 {
            return Err(KaosError::invalid("claim size must be at least 1"));
        }
        if n > self.max_batch {
            return Err(KaosError::invalid(format!(
                "claim size {} exceeds max batch {}",
                n, self.max_batch
            )));
        }
        Ok(n as i64)
    }

    #[inline]
    fn producers_alerted(&self) -> bool {
        self.producers_alerted.load(Ordering::Acquire)
    }

    #[inline]
    fn minimum_gating(&self, minimum: i64) -> i64 {
        minimum_sequence(&self.gating.load(), minimum)
    }

    /// Poll the gating set until `wrap_point` is no longer ahead of it.
    ///
    /// Returns the gating minimum that let the claim through.
    fn await_capacity(&self, wrap_point: i64, claimed: i64) -> Result<i64> {
        let mut spins = 0u32;
        let mut stalled = false;
        loop {
            let min = self.minimum_gating(claimed);
            if wrap_point <= min {
                return Ok(min);
            }
            if self.producers_alerted() {
                return Err(KaosError::Alerted);
            }
            if !stalled {
                crate::insights::record_backpressure(wrap_point, min);
                stalled = true;
            }
            if spins < PRODUCER_SPIN_TRIES {
                spins += 1;
                hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    /// Start gating on `sequences`, moving each to the cursor first.
    ///
    /// Sequences already in the set are skipped: their consumer may be
    /// reading, and moving it forward would let producers reclaim the slot.
    fn add_gating_sequences(&self, sequences: &[Arc<Sequence>]) {
        let current = self.gating.load();
        let mut added: Vec<Arc<Sequence>> = Vec::with_capacity(sequences.len());
        for sequence in sequences {
            let known = current.iter().chain(added.iter()).any(|s| Arc::ptr_eq(s, sequence));
            if !known {
                added.push(sequence.clone());
            }
        }
        drop(current);
        if added.is_empty() {
            return;
        }

        let cursor = self.cursor.get();
        for sequence in &added {
            sequence.set(cursor);
        }
        self.gating.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + added.len());
            next.extend(current.iter().cloned());
            next.extend(added.iter().cloned());
            next
        });
        // A publish may have landed between the first set and the swap.
        let cursor = self.cursor.get();
        for sequence in &added {
            sequence.set(cursor);
        }
    }

    fn remove_gating_sequence(&self, sequence: &Arc<Sequence>) -> bool {
        let mut removed = false;
        self.gating.rcu(|current| {
            let next: Vec<_> = current
                .iter()
                .filter(|s| !Arc::ptr_eq(s, sequence))
                .cloned()
                .collect();
            removed = next.len() != current.len();
            next
        });
        removed
    }

    pub fn gating_count(&self) -> usize {
        self.gating.load().len()
    }
}

/// Keeps a consumer's sequence in the gating set for as long as the consumer
/// can hand out references into the ring.
pub(crate) struct GatingRegistration<S: Sequencer> {
    sequencer: Arc<S>,
    sequence: Arc<Sequence>,
}

impl<S: Sequencer> GatingRegistration<S> {
    pub(crate) fn new(sequencer: &Arc<S>, sequence: &Arc<Sequence>) -> Self {
        sequencer.add_gating_sequences(std::slice::from_ref(sequence));
        Self {
            sequencer: sequencer.clone(),
            sequence: sequence.clone(),
        }
    }
}

impl<S: Sequencer> Drop for GatingRegistration<S> {
    fn drop(&mut self) {
        self.sequencer.remove_gating_sequence(&self.sequence);
    }
}
