//! Stress with random scheduling noise in producers and consumers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kaos_disruptor::{
    BatchEventProcessor, EventHandler, HandlerResult, PhasedBackoffWaitStrategy, ProcessorThread,
    RingBuffer,
};
use kaos_test_support::{ChaosMonkey, ProducerOrderChecker, SequenceChecker};

#[derive(Default)]
struct Event {
    producer: u32,
    counter: u64,
}

struct NoisyHandler {
    monkey: ChaosMonkey,
    sequences: Arc<SequenceChecker>,
    producers: Arc<ProducerOrderChecker>,
}

impl EventHandler<Event> for NoisyHandler {
    fn on_event(&mut self, event: &Event, sequence: i64, _end_of_batch: bool) -> HandlerResult {
        self.monkey.maybe_stall();
        self.sequences.check(sequence);
        self.producers.check(event.producer, event.counter);
        Ok(())
    }
}

#[test]
fn test_ordering_survives_chaos() {
    const PRODUCERS: u32 = 3;
    const PER_PRODUCER: u64 = 3_000;
    let total = PRODUCERS as u64 * PER_PRODUCER;

    let ring = Arc::new(
        RingBuffer::create_multi_producer(
            Event::default,
            64,
            PhasedBackoffWaitStrategy::with_lock(
                Duration::from_micros(10),
                Duration::from_micros(100),
            ),
        )
        .unwrap(),
    );

    let mut consumers = Vec::new();
    let mut checks = Vec::new();
    for _ in 0..2 {
        let sequences = Arc::new(SequenceChecker::new());
        let producers = Arc::new(ProducerOrderChecker::new());
        let processor = BatchEventProcessor::new(
            ring.clone(),
            ring.new_barrier(&[]),
            NoisyHandler {
                monkey: ChaosMonkey::mild().with_delay_range(1, 50),
                sequences: sequences.clone(),
                producers: producers.clone(),
            },
        );
        consumers.push(ProcessorThread::spawn(processor).unwrap());
        checks.push((sequences, producers));
    }

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let ring = ring.clone();
            thread::spawn(move || {
                let mut monkey = ChaosMonkey::mild().with_delay_range(1, 50);
                for counter in 0..PER_PRODUCER {
                    monkey.maybe_stall();
                    ring.publish_event(|slot, _| {
                        slot.producer = id;
                        slot.counter = counter;
                    })
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for consumer in &consumers {
        for _ in 0..10_000 {
            if consumer.sequence().get() == total as i64 - 1 {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
    for consumer in consumers {
        consumer.halt();
        consumer.join().unwrap();
    }
    for (sequences, producers) in checks {
        let stats = sequences.stats();
        assert!(stats.is_perfect(), "{:?}", stats);
        assert_eq!(stats.total_seen, total);
        assert_eq!(producers.violations(), 0);
    }
}
