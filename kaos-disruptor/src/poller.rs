//! Pull-based consumer.
//!
//! An `EventPoller` never blocks: each `poll` drains whatever is available
//! and reports why it stopped, so one thread can interleave draining the ring
//! with other work.

use std::sync::Arc;

use crate::disruptor::{GatingRegistration, RingBuffer, Sequencer};
use crate::error::{HandlerError, KaosError, Result};
use crate::sequence::{Sequence, SequenceGroup, INITIAL_CURSOR_VALUE};

/// Outcome of one [`EventPoller::poll`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// At least one event was handed to the handler.
    Processing,
    /// Events are published but an upstream dependency has not reached them.
    Gating,
    /// Nothing new has been published.
    Idle,
}

pub struct EventPoller<E, S: Sequencer> {
    ring: Arc<RingBuffer<E, S>>,
    sequence: Arc<Sequence>,
    gating: SequenceGroup,
    _registration: GatingRegistration<S>,
}

impl<E, S: Sequencer> EventPoller<E, S> {
    pub(crate) fn new(ring: Arc<RingBuffer<E, S>>, dependencies: &[Arc<Sequence>]) -> Self {
        let cursor = ring.sequencer().cursor().clone();
        let gating = if dependencies.is_empty() {
            SequenceGroup::new(&cursor, &[])
        } else {
            let mut members = Vec::with_capacity(dependencies.len() + 1);
            members.push(cursor.clone());
            members.extend(dependencies.iter().cloned());
            SequenceGroup::new(&cursor, &members)
        };

        // Gates from here on: starts at the cursor, leaves on drop.
        let sequence = Arc::new(Sequence::new(INITIAL_CURSOR_VALUE));
        let registration = GatingRegistration::new(ring.sequencer(), &sequence);

        Self {
            ring,
            sequence,
            gating,
            _registration: registration,
        }
    }

    /// This poller's progress. It already gates producers; pass it to other
    /// barriers to consume downstream of this poller.
    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

    /// Hand every available event to `handler` until it returns `Ok(false)`
    /// or the available range is exhausted.
    ///
    /// A handler error stops the poll; the sequence stays at the last event
    /// handled successfully and the error is returned as
    /// `KaosError::EventHandler`.
    pub fn poll<F>(&mut self, mut handler: F) -> Result<PollState>
    where
        F: FnMut(&E, i64, bool) -> std::result::Result<bool, HandlerError>,
    {
        let current = self.sequence.get();
        let mut next = current + 1;
        let available = self
            .ring
            .sequencer()
            .highest_published_sequence(next, self.gating.get());

        if next > available {
            return Ok(if self.ring.cursor() >= next {
                PollState::Gating
            } else {
                PollState::Idle
            });
        }

        let mut processed = current;
        let mut outcome = Ok(PollState::Processing);
        while next <= available {
            // SAFETY: `next` is published and gated by this poller's sequence.
            let event = unsafe { self.ring.get(next) };
            match handler(event, next, next == available) {
                Ok(keep_going) => {
                    processed = next;
                    next += 1;
                    if !keep_going {
                        break;
                    }
                }
                Err(error) => {
                    outcome = Err(KaosError::EventHandler {
                        sequence: next,
                        message: error.to_string(),
                    });
                    break;
                }
            }
        }
        self.sequence.set(processed);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wait::BusySpinWaitStrategy;

    type Ring = RingBuffer<i64, crate::disruptor::MultiProducerSequencer<BusySpinWaitStrategy>>;

    fn ring(size: usize) -> Arc<Ring> {
        Arc::new(
            RingBuffer::create_multi_producer(|| 0i64, size, BusySpinWaitStrategy::new())
                .unwrap(),
        )
    }

    #[test]
    fn test_idle_then_processing() {
        let ring = ring(8);
        let mut poller = ring.new_poller(&[]);

        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Idle);

        for v in [5, 6, 7] {
            ring.publish_event(|slot, _| *slot = v).unwrap();
        }
        let mut seen = Vec::new();
        let state = poller
            .poll(|e, seq, end| {
                seen.push((*e, seq, end));
                Ok(true)
            })
            .unwrap();
        assert_eq!(state, PollState::Processing);
        assert_eq!(seen, vec![(5, 0, false), (6, 1, false), (7, 2, true)]);
        assert_eq!(poller.sequence().get(), 2);
        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Idle);
    }

    #[test]
    fn test_gating_on_dependency() {
        let ring = ring(8);
        let upstream = Arc::new(Sequence::default());
        let mut poller = ring.new_poller(&[upstream.clone()]);

        ring.publish_events(3, |slot, seq| *slot = seq).unwrap();
        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Gating);

        upstream.set(1);
        let mut count = 0;
        assert_eq!(
            poller
                .poll(|_, _, _| {
                    count += 1;
                    Ok(true)
                })
                .unwrap(),
            PollState::Processing
        );
        assert_eq!(count, 2);
        assert_eq!(poller.sequence().get(), 1);
    }

    #[test]
    fn test_handler_stops_early() {
        let ring = ring(8);
        let mut poller = ring.new_poller(&[]);
        ring.publish_events(4, |slot, seq| *slot = seq).unwrap();

        assert_eq!(poller.poll(|_, seq, _| Ok(seq < 1)).unwrap(), PollState::Processing);
        assert_eq!(poller.sequence().get(), 1);
        assert_eq!(poller.poll(|_, _, _| Ok(true)).unwrap(), PollState::Processing);
        assert_eq!(poller.sequence().get(), 3);
    }

    #[test]
    fn test_event_held_by_handler_is_not_overwritten() {
        let ring = Arc::new(
            RingBuffer::create_single_producer(|| 0i64, 1, BusySpinWaitStrategy::new()).unwrap(),
        );
        let mut poller = ring.new_poller(&[]);
        let mut producer = ring.producer().unwrap();
        producer.publish_event(|slot, _| *slot = 1).unwrap();

        let state = poller
            .poll(|e, _, _| {
                let before = *e;
                assert!(matches!(
                    producer.try_publish_event(|slot, _| *slot = 99),
                    Err(KaosError::InsufficientCapacity)
                ));
                assert_eq!((before, *e), (1, 1));
                Ok(true)
            })
            .unwrap();
        assert_eq!(state, PollState::Processing);

        assert_eq!(producer.try_publish_event(|slot, _| *slot = 99).unwrap(), 1);
        assert_eq!(unsafe { *ring.get(1) }, 99);
    }

    #[test]
    fn test_handler_error_keeps_last_good_sequence() {
        let ring = ring(8);
        let mut poller = ring.new_poller(&[]);
        ring.publish_events(3, |slot, seq| *slot = seq).unwrap();

        let result = poller.poll(|_, seq, _| {
            if seq == 1 {
                Err("bad".into())
            } else {
                Ok(true)
            }
        });
        assert!(matches!(result, Err(KaosError::EventHandler { sequence: 1, .. })));
        assert_eq!(poller.sequence().get(), 0);
    }
}
