//! Sequence barrier: the consumer's view of what it may safely read.
//!
//! A barrier combines the sequencer's cursor with the sequences of upstream
//! consumers. The available sequence it reports is never ahead of the slowest
//! upstream consumer nor of the highest contiguously published sequence, which
//! is what makes pipelines (A -> B) and fan-in (A, B -> C) work.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::disruptor::Sequencer;
use crate::error::{KaosError, Result};
use crate::sequence::{Sequence, SequenceGroup};
use crate::wait::WaitStrategy;

/// Anything that can be woken out of a wait by an alert.
pub trait Alertable: Send + Sync {
    fn alert(&self);
}

pub struct SequenceBarrier<S: Sequencer> {
    sequencer: Arc<S>,
    dependents: SequenceGroup,
    alerted: AtomicBool,
}

impl<S: Sequencer> SequenceBarrier<S> {
    /// Barrier over `sequencer`, gated by `dependencies` (or by the cursor
    /// alone when empty).
    pub fn new(sequencer: Arc<S>, dependencies: &[Arc<Sequence>]) -> Self {
        let dependents = SequenceGroup::new(sequencer.cursor(), dependencies);
        Self {
            sequencer,
            dependents,
            alerted: AtomicBool::new(false),
        }
    }

    /// Wait until `sequence` is available and return the highest sequence
    /// that may be consumed.
    ///
    /// The result can be lower than `sequence` when the wait strategy returns
    /// early; callers must check before consuming.
    pub fn wait_for(&self, sequence: i64) -> Result<i64> {
        self.check_alert()?;

        let available = self.sequencer.wait_strategy().wait_for(
            sequence,
            self.sequencer.cursor(),
            &self.dependents,
            &self.alerted,
        )?;

        if available < sequence {
            return Ok(available);
        }
        Ok(self
            .sequencer
            .highest_published_sequence(sequence, available))
    }

    /// Minimum of the sequences this barrier depends on.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.dependents.get()
    }

    #[inline]
    pub fn is_alerted(&self) -> bool {
        self.alerted.load(Ordering::Acquire)
    }

    /// Interrupt any `wait_for` on this barrier.
    pub fn alert(&self) {
        self.alerted.store(true, Ordering::Release);
        self.sequencer.wait_strategy().signal_all_when_blocking();
    }

    pub fn clear_alert(&self) {
        self.alerted.store(false, Ordering::Release);
    }

    #[inline]
    pub fn check_alert(&self) -> Result<()> {
        if self.is_alerted() {
            Err(KaosError::Alerted)
        } else {
            Ok(())
        }
    }
}

impl<S: Sequencer> Alertable for SequenceBarrier<S> {
    fn alert(&self) {
        SequenceBarrier::alert(self)
    }
}

impl<S: Sequencer> fmt::Debug for SequenceBarrier<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceBarrier")
            .field("dependents", &self.dependents)
            .field("alerted", &self.is_alerted())
            .finish()
    }
}
