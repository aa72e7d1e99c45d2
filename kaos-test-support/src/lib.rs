//! Test helpers for kaos-disruptor.
//!
//! - `verify` - gap/repeat detection per consumer, per-producer FIFO checks
//! - `chaos` - random delays and yields for stress tests

pub mod chaos;
pub mod verify;

pub use chaos::{ChaosEvent, ChaosMonkey};
pub use verify::{ProducerOrderChecker, SequenceChecker, SequenceStats, SequenceStatus};
