//! Sequencer throughput: single vs multi producer, one batch consumer.
//!
//! Run: cargo bench --bench bench_sequencer

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use kaos_disruptor::{
    BatchEventProcessor, BusySpinWaitStrategy, HandlerResult, ProcessorControl, RingBuffer,
    Sequence, Sequencer, YieldingWaitStrategy,
};

const RING_SIZE: usize = 64 * 1024;
const BATCH_SIZE: usize = 64;
const TOTAL_EVENTS: i64 = 1_000_000;

#[derive(Default)]
struct Slot {
    value: i64,
}

/// One summing consumer running on its own thread.
struct Consumer {
    sum: Arc<AtomicI64>,
    sequence: Arc<Sequence>,
    control: ProcessorControl,
    handle: JoinHandle<kaos_disruptor::Result<()>>,
}

impl Consumer {
    fn start<S: Sequencer>(ring: &Arc<RingBuffer<Slot, S>>) -> Self {
        let sum = Arc::new(AtomicI64::new(0));
        let total = sum.clone();
        let mut processor = BatchEventProcessor::new(
            ring.clone(),
            ring.new_barrier(&[]),
            move |e: &Slot, _seq: i64, _end_of_batch: bool| -> HandlerResult {
                total.fetch_add(e.value, Ordering::Relaxed);
                Ok(())
            },
        );
        let sequence = processor.sequence();
        let control = processor.control();
        let handle = thread::spawn(move || processor.run());
        Self {
            sum,
            sequence,
            control,
            handle,
        }
    }

    fn finish(self, last: i64) -> i64 {
        while self.sequence.get() < last {
            std::hint::spin_loop();
        }
        self.control.halt();
        self.handle.join().unwrap().unwrap();
        self.sum.load(Ordering::Relaxed)
    }
}

fn run_single(events: i64, batch: usize) -> i64 {
    let ring = Arc::new(
        RingBuffer::create_single_producer(Slot::default, RING_SIZE, BusySpinWaitStrategy::new())
            .unwrap(),
    );
    let consumer = Consumer::start(&ring);
    let mut producer = ring.producer().unwrap();

    let mut sent = 0i64;
    while sent < events {
        let n = ((events - sent) as usize).min(batch);
        producer.publish_events(n, |slot, _| slot.value = 1).unwrap();
        sent += n as i64;
    }
    consumer.finish(events - 1)
}

fn run_multi(producers: usize, events: i64, batch: usize) -> i64 {
    let ring = Arc::new(
        RingBuffer::create_multi_producer(Slot::default, RING_SIZE, YieldingWaitStrategy::default())
            .unwrap(),
    );
    let consumer = Consumer::start(&ring);

    let per_producer = events / producers as i64;
    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let ring = ring.clone();
            thread::spawn(move || {
                let mut sent = 0i64;
                while sent < per_producer {
                    let n = ((per_producer - sent) as usize).min(batch);
                    ring.publish_events(n, |slot, _| slot.value = 1).unwrap();
                    sent += n as i64;
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    consumer.finish(per_producer * producers as i64 - 1)
}

fn benchmark_sequencers(c: &mut Criterion) {
    let mut group = c.benchmark_group("Sequencer");
    group.throughput(Throughput::Elements(TOTAL_EVENTS as u64));
    group.sample_size(10);

    group.bench_function(BenchmarkId::new("producer", "single-1P"), |b| {
        b.iter(|| run_single(TOTAL_EVENTS, 1))
    });

    group.bench_function(BenchmarkId::new("producer", "single-1P-batch"), |b| {
        b.iter(|| run_single(TOTAL_EVENTS, BATCH_SIZE))
    });

    for producers in [1usize, 2, 4] {
        group.bench_function(
            BenchmarkId::new("producer", format!("multi-{producers}P-batch")),
            |b| b.iter(|| run_multi(producers, TOTAL_EVENTS, BATCH_SIZE)),
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_sequencers);
criterion_main!(benches);
