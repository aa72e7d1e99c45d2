//! Capacity: the wrap invariant, blocking claims and fail-fast claims.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kaos_disruptor::{
    BlockingWaitStrategy, BusySpinWaitStrategy, KaosError, RingBuffer, Sequence,
    SleepingWaitStrategy,
};

#[test]
fn test_full_buffer_blocks_next_and_fails_try_next() {
    const SIZE: usize = 8;
    let ring = Arc::new(
        RingBuffer::create_single_producer(|| 0u64, SIZE, BusySpinWaitStrategy::new()).unwrap(),
    );
    let consumer = Arc::new(Sequence::default());
    ring.add_gating_sequences(&[consumer.clone()]);
    let mut producer = ring.producer().unwrap();

    for _ in 0..SIZE {
        producer.publish_event(|slot, seq| *slot = seq as u64).unwrap();
    }
    assert_eq!(ring.remaining_capacity(), 0);
    assert!(matches!(producer.try_next(), Err(KaosError::InsufficientCapacity)));
    assert!(matches!(producer.try_next_n(3), Err(KaosError::InsufficientCapacity)));

    let returned = Arc::new(AtomicBool::new(false));
    let claimed = Arc::new(AtomicI64::new(-1));
    let producer = {
        let (returned, claimed) = (returned.clone(), claimed.clone());
        thread::spawn(move || {
            let sequence = producer.next().unwrap();
            claimed.store(sequence, Ordering::SeqCst);
            returned.store(true, Ordering::SeqCst);
            unsafe { producer.publish(sequence) };
        })
    };

    thread::sleep(Duration::from_millis(50));
    assert!(!returned.load(Ordering::SeqCst));

    consumer.set(0);
    producer.join().unwrap();
    assert_eq!(claimed.load(Ordering::SeqCst), SIZE as i64);
}

#[test]
fn test_wrap_invariant_holds_under_load() {
    const SIZE: usize = 16;
    const EVENTS: i64 = 20_000;

    let ring = Arc::new(
        RingBuffer::create_multi_producer(|| 0i64, SIZE, SleepingWaitStrategy::default()).unwrap(),
    );
    let consumer = Arc::new(Sequence::default());
    ring.add_gating_sequences(&[consumer.clone()]);
    let violated = Arc::new(AtomicBool::new(false));

    let reader = {
        let (ring, consumer, violated) = (ring.clone(), consumer.clone(), violated.clone());
        thread::spawn(move || {
            let barrier = ring.new_barrier(&[]);
            let mut next = 0;
            while next < EVENTS {
                let available = barrier.wait_for(next).unwrap();
                if ring.cursor() - consumer.get() > SIZE as i64 {
                    violated.store(true, Ordering::SeqCst);
                }
                while next <= available {
                    assert_eq!(unsafe { *ring.get(next) }, next);
                    next += 1;
                }
                consumer.set(available);
            }
        })
    };

    let writers: Vec<_> = (0..2)
        .map(|_| {
            let ring = ring.clone();
            thread::spawn(move || {
                for _ in 0..EVENTS / 2 {
                    ring.publish_event(|slot, seq| *slot = seq).unwrap();
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }
    reader.join().unwrap();
    assert!(!violated.load(Ordering::SeqCst));
}

#[test]
fn test_producer_alert_releases_blocked_claim() {
    let ring = Arc::new(
        RingBuffer::create_multi_producer(|| 0u8, 4, BlockingWaitStrategy::new()).unwrap(),
    );
    ring.add_gating_sequences(&[Arc::new(Sequence::default())]);
    ring.publish_events(4, |_, _| {}).unwrap();

    let producer = {
        let ring = ring.clone();
        thread::spawn(move || ring.next())
    };
    thread::sleep(Duration::from_millis(20));
    ring.alert_producers();
    assert!(matches!(producer.join().unwrap(), Err(KaosError::Alerted)));

    ring.clear_producer_alert();
    assert!(matches!(ring.try_next(), Err(KaosError::InsufficientCapacity)));
}

#[test]
fn test_invalid_claims_rejected() {
    let ring = Arc::new(
        RingBuffer::create_single_producer(|| 0u8, 8, BusySpinWaitStrategy::new()).unwrap(),
    );
    let mut producer = ring.producer().unwrap();
    assert!(matches!(producer.next_n(0), Err(KaosError::InvalidArgument(_))));
    assert!(matches!(producer.try_next_n(0), Err(KaosError::InvalidArgument(_))));
    assert!(matches!(producer.next_n(9), Err(KaosError::InvalidArgument(_))));

    let ring = RingBuffer::create_multi_producer(|| 0u8, 8, BusySpinWaitStrategy::new()).unwrap();
    assert!(matches!(ring.next_n(0), Err(KaosError::InvalidArgument(_))));
    assert!(matches!(ring.try_next_n(9), Err(KaosError::InvalidArgument(_))));
}
