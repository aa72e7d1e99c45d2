//! Kaos disruptor - sequencing and coordination core.
//!
//! - `Sequence` - cache-line padded counter, the unit of coordination
//! - `RingBuffer<E, S>` - pre-allocated slots over a single or multi producer sequencer
//! - `Producer` - the exclusive claim handle of a single producer ring
//! - `SequenceBarrier` - wait on the cursor and upstream consumers
//! - `BatchEventProcessor` - batch-driven consumer loop
//! - `EventPoller` - non-blocking pull consumer
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kaos_disruptor::{
//!     BatchEventProcessor, HandlerResult, ProcessorThread, RingBuffer, YieldingWaitStrategy,
//! };
//!
//! let wait = YieldingWaitStrategy::default();
//! let ring = Arc::new(RingBuffer::create_single_producer(|| 0u64, 1024, wait)?);
//! let mut producer = ring.producer()?;
//! // The processor gates the producer from here until it is dropped.
//! let processor = BatchEventProcessor::new(ring.clone(), ring.new_barrier(&[]),
//!     |e: &u64, _seq: i64, _eob: bool| -> HandlerResult { println!("{e}"); Ok(()) });
//! let consumer = ProcessorThread::spawn(processor)?;
//!
//! producer.publish_event(|slot, seq| *slot = seq as u64 * 2)?;
//! consumer.halt();
//! consumer.join()?;
//! ```

// Tracing macros - no-op when feature disabled
#[cfg(feature = "tracing")]
macro_rules! trace_debug { ($($arg:tt)*) => { tracing::debug!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_warn { ($($arg:tt)*) => { tracing::warn!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn { ($($arg:tt)*) => {} }

#[cfg(feature = "tracing")]
macro_rules! trace_error { ($($arg:tt)*) => { tracing::error!($($arg)*) } }
#[cfg(not(feature = "tracing"))]
macro_rules! trace_error { ($($arg:tt)*) => {} }

pub mod barrier;
pub mod disruptor;
pub mod error;
pub mod insights;
pub mod poller;
pub mod processor;
pub mod sequence;
pub mod thread;
pub mod wait;

// Re-export main components
pub use barrier::{Alertable, SequenceBarrier};
pub use disruptor::{
    MultiProducerSequencer, Producer, ProducerType, RingBuffer, RingBufferConfig, Sequencer,
    SequencerCore, SingleProducerSequencer,
};
pub use error::{HandlerError, HandlerResult, KaosError, Result};
pub use insights::{record_backpressure, record_batch};
pub use poller::{EventPoller, PollState};
pub use processor::{
    BatchEventProcessor, EventHandler, EventProcessor, ExceptionAction, ExceptionHandler,
    FatalExceptionHandler, IgnoreExceptionHandler, ProcessorControl, ProcessorState,
};
pub use sequence::{minimum_sequence, Fence, Sequence, SequenceGroup, INITIAL_CURSOR_VALUE};
pub use thread::{pin_to_core, ProcessorThread, ProcessorThreadBuilder};
pub use wait::{
    BlockingWaitStrategy, BusySpinWaitStrategy, LiteBlockingWaitStrategy,
    PhasedBackoffWaitStrategy, SleepingWaitStrategy, TimeoutBlockingWaitStrategy, WaitStrategy,
    YieldingWaitStrategy,
};
