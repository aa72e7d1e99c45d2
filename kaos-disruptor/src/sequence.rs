//! Cache-line padded sequence counters.
//!
//! A `Sequence` is the unit of coordination: the producer cursor, every
//! consumer's progress marker and the multi-producer claim counter are all
//! sequences. Each one owns a full 128-byte region so that two hot counters
//! never share a line (adjacent-line prefetch pulls lines in pairs on x86).

use std::fmt;
use std::sync::atomic::{self, AtomicI64, Ordering};
use std::sync::Arc;

/// Value of a sequence before anything has been published or consumed.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Memory fence requested by a sequence read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fence {
    /// No cross-thread guarantee; same-thread program order only.
    None,
    /// Observes any prior release write; later accesses stay after it.
    Acquire,
    /// Prior writes become visible to a thread that acquires this value.
    Release,
    /// Bidirectional (store-load) fence.
    Full,
}

/// Padded, atomically updated 64-bit position counter.
///
/// Writes are owned by a single logical writer (a cursor or one consumer),
/// reads are shared. The multi-producer claim counter is the exception and
/// is only ever advanced with [`Sequence::compare_and_set`].
#[repr(align(128))]
pub struct Sequence {
    value: AtomicI64,
}

impl Sequence {
    pub const fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Read with the requested fence.
    ///
    /// A read has nothing to release, so `Fence::Release` is served as a full
    /// fence followed by a sequentially consistent load.
    #[inline]
    pub fn read(&self, fence: Fence) -> i64 {
        match fence {
            Fence::None => self.value.load(Ordering::Relaxed),
            Fence::Acquire => self.value.load(Ordering::Acquire),
            Fence::Release | Fence::Full => {
                atomic::fence(Ordering::SeqCst);
                self.value.load(Ordering::SeqCst)
            }
        }
    }

    /// Write with the requested fence.
    ///
    /// `Fence::Acquire` on a store is served as `Fence::Full`.
    #[inline]
    pub fn write(&self, value: i64, fence: Fence) {
        match fence {
            Fence::None => self.value.store(value, Ordering::Relaxed),
            Fence::Release => self.value.store(value, Ordering::Release),
            Fence::Acquire | Fence::Full => {
                self.value.store(value, Ordering::Release);
                atomic::fence(Ordering::SeqCst);
            }
        }
    }

    /// Acquire read.
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Unfenced read.
    #[inline]
    pub fn get_plain(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Release write.
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Unfenced write.
    #[inline]
    pub fn set_plain(&self, value: i64) {
        self.value.store(value, Ordering::Relaxed);
    }

    /// Release write followed by a store-load fence.
    #[inline]
    pub fn set_volatile(&self, value: i64) {
        self.write(value, Fence::Full);
    }

    #[inline]
    pub fn compare_and_set(&self, expected: i64, next: i64) -> bool {
        self.value
            .compare_exchange(expected, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn increment_and_get(&self) -> i64 {
        self.add_and_get(1)
    }

    #[inline]
    pub fn add_and_get(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::AcqRel) + delta
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR_VALUE)
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Sequence").field(&self.get()).finish()
    }
}

/// Smallest value among `sequences`, or `minimum` if that is smaller or the
/// slice is empty.
#[inline]
pub fn minimum_sequence(sequences: &[Arc<Sequence>], minimum: i64) -> i64 {
    sequences
        .iter()
        .map(|s| s.get())
        .fold(minimum, i64::min)
}

/// Immutable group of sequences read as their minimum.
///
/// Built once per barrier or poller; a consumer can never run ahead of the
/// slowest member. Re-registration builds a new group.
#[derive(Clone)]
pub struct SequenceGroup {
    members: Arc<[Arc<Sequence>]>,
}

impl SequenceGroup {
    /// Group over `dependencies`, falling back to `cursor` alone when there
    /// are none.
    pub fn new(cursor: &Arc<Sequence>, dependencies: &[Arc<Sequence>]) -> Self {
        let members: Arc<[Arc<Sequence>]> = if dependencies.is_empty() {
            Arc::from(vec![Arc::clone(cursor)])
        } else {
            Arc::from(dependencies.to_vec())
        };
        Self { members }
    }

    /// Minimum of all members.
    #[inline]
    pub fn get(&self) -> i64 {
        if self.members.len() == 1 {
            return self.members[0].get();
        }
        minimum_sequence(&self.members, i64::MAX)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl fmt::Debug for SequenceGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceGroup")
            .field("members", &self.members.len())
            .field("minimum", &self.get())
            .finish()
    }
}
