//! Diamond pipeline: two parallel stages feed a third.
//!
//!             +--> pricer ----+
//!   producer -+               +--> journaler
//!             +--> validator -+
//!
//! Run: cargo run --example diamond

use kaos_disruptor::{
    BatchEventProcessor, HandlerResult, ProcessorThread, RingBuffer, YieldingWaitStrategy,
};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const RING_SIZE: usize = 1024;
const ORDERS: i64 = 1_000_000;

#[derive(Default)]
struct Order {
    quantity: i64,
    price: i64,
    // Written by the parallel stages, read by the journaler.
    notional: AtomicI64,
    valid: AtomicBool,
}

fn main() -> kaos_disruptor::Result<()> {
    println!("\n=== Diamond Pipeline Example ===\n");

    let ring = Arc::new(RingBuffer::create_multi_producer(
        Order::default,
        RING_SIZE,
        YieldingWaitStrategy::default(),
    )?);

    let pricer = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        |order: &Order, _seq: i64, _eob: bool| -> HandlerResult {
            order
                .notional
                .store(order.quantity * order.price, Ordering::Release);
            Ok(())
        },
    );
    let validator = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[]),
        |order: &Order, _seq: i64, _eob: bool| -> HandlerResult {
            order.valid.store(order.quantity > 0, Ordering::Release);
            Ok(())
        },
    );

    let total = Arc::new(AtomicI64::new(0));
    let journaled = total.clone();
    let journaler = BatchEventProcessor::new(
        ring.clone(),
        ring.new_barrier(&[pricer.sequence(), validator.sequence()]),
        move |order: &Order, _seq: i64, _eob: bool| -> HandlerResult {
            if !order.valid.load(Ordering::Acquire) {
                return Err(format!("invalid order, quantity {}", order.quantity).into());
            }
            journaled.fetch_add(order.notional.load(Ordering::Acquire), Ordering::Relaxed);
            Ok(())
        },
    );
    let tail = journaler.sequence();

    let threads = [
        ProcessorThread::builder().name("pricer").spawn(pricer)?,
        ProcessorThread::builder().name("validator").spawn(validator)?,
        ProcessorThread::builder().name("journaler").spawn(journaler)?,
    ];

    let start = Instant::now();
    for i in 0..ORDERS {
        ring.publish_event(|order, _| {
            order.quantity = 1 + i % 10;
            order.price = 100 + i % 7;
        })?;
    }
    while tail.get() < ORDERS - 1 {
        std::thread::yield_now();
    }
    let elapsed = start.elapsed();

    for thread in threads {
        thread.halt();
        thread.join()?;
    }

    let expected: i64 = (0..ORDERS).map(|i| (1 + i % 10) * (100 + i % 7)).sum();
    println!("Journaled {} orders in {:?}", ORDERS, elapsed);
    println!(
        "Throughput: {:.2} M orders/sec",
        ORDERS as f64 / elapsed.as_secs_f64() / 1e6
    );
    println!("Total notional: {} (expected {})", total.load(Ordering::Relaxed), expected);
    assert_eq!(total.load(Ordering::Relaxed), expected);
    Ok(())
}
