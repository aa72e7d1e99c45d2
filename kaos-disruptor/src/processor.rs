//! Batch event processor: the consumer loop.
//!
//! ```text
//!   Idle --run()--> Running --halt()--> Halting --> Stopped
//!     |                                                ^
//!     +----------halt() before run()-------------------+
//! ```
//!
//! A processor halted before it ran still fires `on_start` and `on_shutdown`.
//!
//! Each iteration waits on the barrier for `last + 1`, hands every sequence
//! up to the returned value to the handler, then advances the processor's
//! sequence once for the whole batch. A processor is not restartable.
//!
//! The processor's sequence gates producers from construction until the
//! processor is dropped, so a slot is never reclaimed under a handler.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::barrier::{Alertable, SequenceBarrier};
use crate::disruptor::{GatingRegistration, RingBuffer, Sequencer};
use crate::error::{HandlerError, HandlerResult, KaosError, Result};
use crate::insights;
use crate::sequence::{Sequence, INITIAL_CURSOR_VALUE};

// ============================================================================
// Handler contracts
// ============================================================================

/// Consumer callback for a [`BatchEventProcessor`].
///
/// Any `FnMut(&E, i64, bool) -> HandlerResult + Send` closure is a handler.
pub trait EventHandler<E>: Send {
    /// Called once per event; `end_of_batch` is true only for the last
    /// sequence of the current batch.
    fn on_event(&mut self, event: &E, sequence: i64, end_of_batch: bool) -> HandlerResult;

    fn on_batch_start(&mut self, _batch_size: i64) {}

    fn on_start(&mut self) -> HandlerResult {
        Ok(())
    }

    fn on_shutdown(&mut self) -> HandlerResult {
        Ok(())
    }

    /// Called instead of `on_event` when a timeout-capable wait strategy
    /// gives up; `sequence` is the last processed sequence.
    fn on_timeout(&mut self, _sequence: i64) -> HandlerResult {
        Ok(())
    }
}

impl<E, F> EventHandler<E> for F
where
    F: FnMut(&E, i64, bool) -> HandlerResult + Send,
{
    #[inline]
    fn on_event(&mut self, event: &E, sequence: i64, end_of_batch: bool) -> HandlerResult {
        self(event, sequence, end_of_batch)
    }
}

/// What the processor does after an event handler error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionAction {
    /// Treat the event as processed and keep going.
    Continue,
    /// Stop the processor; its sequence stays just before the failing event.
    Halt,
}

/// Receives every error a processor's handler reports.
pub trait ExceptionHandler<E>: Send {
    /// `event` is `None` for errors raised by `on_timeout`.
    fn handle_event_exception(
        &mut self,
        error: &HandlerError,
        sequence: i64,
        event: Option<&E>,
    ) -> ExceptionAction;

    fn handle_on_start_exception(&mut self, error: &HandlerError);

    fn handle_on_shutdown_exception(&mut self, error: &HandlerError);
}

/// Logs the error and halts the processor. The default.
#[derive(Debug, Default, Clone, Copy)]
pub struct FatalExceptionHandler;

impl<E> ExceptionHandler<E> for FatalExceptionHandler {
    fn handle_event_exception(
        &mut self,
        error: &HandlerError,
        sequence: i64,
        _event: Option<&E>,
    ) -> ExceptionAction {
        trace_error!(sequence, %error, "event handler failed, halting processor");
        ExceptionAction::Halt
    }

    fn handle_on_start_exception(&mut self, error: &HandlerError) {
        trace_error!(%error, "on_start failed");
    }

    fn handle_on_shutdown_exception(&mut self, error: &HandlerError) {
        trace_error!(%error, "on_shutdown failed");
    }
}

/// Logs the error and carries on with the next event.
#[derive(Debug, Default, Clone, Copy)]
pub struct IgnoreExceptionHandler;

impl<E> ExceptionHandler<E> for IgnoreExceptionHandler {
    fn handle_event_exception(
        &mut self,
        error: &HandlerError,
        sequence: i64,
        _event: Option<&E>,
    ) -> ExceptionAction {
        trace_warn!(sequence, %error, "event handler failed, skipping event");
        ExceptionAction::Continue
    }

    fn handle_on_start_exception(&mut self, error: &HandlerError) {
        trace_warn!(%error, "on_start failed");
    }

    fn handle_on_shutdown_exception(&mut self, error: &HandlerError) {
        trace_warn!(%error, "on_shutdown failed");
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Lifecycle state of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ProcessorState {
    Idle = 0,
    Running = 1,
    Halting = 2,
    Stopped = 3,
}

impl ProcessorState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ProcessorState::Idle,
            1 => ProcessorState::Running,
            2 => ProcessorState::Halting,
            _ => ProcessorState::Stopped,
        }
    }
}

/// Cloneable handle for stopping a processor from another thread.
#[derive(Clone)]
pub struct ProcessorControl {
    state: Arc<AtomicU8>,
    alert: Arc<dyn Alertable>,
}

impl ProcessorControl {
    /// Ask the processor to stop and wake it if it is waiting. Idempotent;
    /// a no-op once the processor is halting or stopped.
    pub fn halt(&self) {
        let moved = [ProcessorState::Running, ProcessorState::Idle]
            .into_iter()
            .any(|from| {
                self.state
                    .compare_exchange(
                        from as u8,
                        ProcessorState::Halting as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
            });
        if moved {
            trace_debug!("processor halt requested");
        }
        self.alert.alert();
    }

    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessorState::Running
    }
}

impl fmt::Debug for ProcessorControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorControl")
            .field("state", &self.state())
            .finish()
    }
}

/// A consumer that can be driven by a thread.
pub trait EventProcessor: Send {
    /// Progress marker; register it for gating or as a downstream dependency.
    fn sequence(&self) -> Arc<Sequence>;

    fn control(&self) -> ProcessorControl;

    /// Run the loop on the calling thread until halted.
    fn run(&mut self) -> Result<()>;
}

// ============================================================================
// BatchEventProcessor
// ============================================================================

pub struct BatchEventProcessor<E, S: Sequencer, H> {
    ring: Arc<RingBuffer<E, S>>,
    barrier: Arc<SequenceBarrier<S>>,
    handler: H,
    exception_handler: Box<dyn ExceptionHandler<E>>,
    sequence: Arc<Sequence>,
    state: Arc<AtomicU8>,
    max_batch: i64,
    _registration: GatingRegistration<S>,
}

impl<E, S, H> BatchEventProcessor<E, S, H>
where
    E: Send + Sync + 'static,
    S: Sequencer,
    H: EventHandler<E>,
{
    /// The new processor's sequence starts at the cursor and gates
    /// producers until the processor is dropped.
    pub fn new(ring: Arc<RingBuffer<E, S>>, barrier: SequenceBarrier<S>, handler: H) -> Self {
        let sequence = Arc::new(Sequence::new(INITIAL_CURSOR_VALUE));
        let registration = GatingRegistration::new(ring.sequencer(), &sequence);
        Self {
            ring,
            barrier: Arc::new(barrier),
            handler,
            exception_handler: Box::new(FatalExceptionHandler),
            sequence,
            state: Arc::new(AtomicU8::new(ProcessorState::Idle as u8)),
            max_batch: i64::MAX,
            _registration: registration,
        }
    }

    pub fn with_exception_handler<X>(mut self, exception_handler: X) -> Self
    where
        X: ExceptionHandler<E> + 'static,
    {
        self.exception_handler = Box::new(exception_handler);
        self
    }

    /// Deliver at most `max` events per batch. Values below 1 are treated as 1.
    pub fn with_max_batch_size(mut self, max: usize) -> Self {
        self.max_batch = (max.max(1)).min(i64::MAX as usize) as i64;
        self
    }

    pub fn sequence(&self) -> Arc<Sequence> {
        self.sequence.clone()
    }

    pub fn control(&self) -> ProcessorControl {
        ProcessorControl {
            state: self.state.clone(),
            alert: self.barrier.clone(),
        }
    }

    pub fn halt(&self) {
        self.control().halt()
    }

    pub fn state(&self) -> ProcessorState {
        ProcessorState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == ProcessorState::Running
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn into_handler(self) -> H {
        self.handler
    }

    /// Run the event loop on the calling thread until halted.
    ///
    /// Returns `IllegalState` if the processor is already running or has
    /// stopped, and `EventHandler` if the exception handler chose to halt.
    pub fn run(&mut self) -> Result<()> {
        if let Err(current) = self.state.compare_exchange(
            ProcessorState::Idle as u8,
            ProcessorState::Running as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match ProcessorState::from_u8(current) {
                ProcessorState::Halting => {
                    trace_debug!("processor halted before it ran");
                    self.notify_start();
                    self.notify_shutdown();
                    self.state
                        .store(ProcessorState::Stopped as u8, Ordering::Release);
                    Ok(())
                }
                ProcessorState::Running => {
                    Err(KaosError::IllegalState("processor is already running"))
                }
                _ => Err(KaosError::IllegalState(
                    "processor has stopped and cannot be restarted",
                )),
            };
        }

        self.barrier.clear_alert();
        self.notify_start();
        trace_debug!(sequence = self.sequence.get(), "processor running");

        // A halt between the state change and clear_alert is caught here.
        let result = if self.is_running() {
            self.process_events()
        } else {
            Ok(())
        };

        self.notify_shutdown();
        self.state
            .store(ProcessorState::Stopped as u8, Ordering::Release);
        trace_debug!(sequence = self.sequence.get(), "processor stopped");
        result
    }

    fn process_events(&mut self) -> Result<()> {
        let mut next = self.sequence.get() + 1;

        loop {
            match self.barrier.wait_for(next) {
                Ok(available) => {
                    let end = available.min(next.saturating_add(self.max_batch - 1));
                    if end < next {
                        continue;
                    }

                    self.handler.on_batch_start(end - next + 1);
                    insights::record_batch(end - next + 1);

                    while next <= end {
                        // SAFETY: `next` is published, and this processor's
                        // sequence (still below `next`) gates the producer.
                        let event = unsafe { self.ring.get(next) };
                        if let Err(error) = self.handler.on_event(event, next, next == end) {
                            let action = self.exception_handler.handle_event_exception(
                                &error,
                                next,
                                Some(event),
                            );
                            if action == ExceptionAction::Halt {
                                self.sequence.set(next - 1);
                                return Err(KaosError::EventHandler {
                                    sequence: next,
                                    message: error.to_string(),
                                });
                            }
                        }
                        next += 1;
                    }
                    self.sequence.set(end);
                }
                Err(KaosError::Timeout) => {
                    let last = self.sequence.get();
                    if let Err(error) = self.handler.on_timeout(last) {
                        let action = self
                            .exception_handler
                            .handle_event_exception(&error, last, None);
                        if action == ExceptionAction::Halt {
                            return Err(KaosError::EventHandler {
                                sequence: last,
                                message: error.to_string(),
                            });
                        }
                    }
                }
                Err(KaosError::Alerted) => {
                    if !self.is_running() {
                        return Ok(());
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn notify_start(&mut self) {
        if let Err(error) = self.handler.on_start() {
            self.exception_handler.handle_on_start_exception(&error);
        }
    }

    fn notify_shutdown(&mut self) {
        if let Err(error) = self.handler.on_shutdown() {
            self.exception_handler.handle_on_shutdown_exception(&error);
        }
    }
}

impl<E, S, H> EventProcessor for BatchEventProcessor<E, S, H>
where
    E: Send + Sync + 'static,
    S: Sequencer,
    H: EventHandler<E>,
{
    fn sequence(&self) -> Arc<Sequence> {
        BatchEventProcessor::sequence(self)
    }

    fn control(&self) -> ProcessorControl {
        BatchEventProcessor::control(self)
    }

    fn run(&mut self) -> Result<()> {
        BatchEventProcessor::run(self)
    }
}

impl<E, S: Sequencer, H> fmt::Debug for BatchEventProcessor<E, S, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEventProcessor")
            .field("sequence", &self.sequence.get())
            .field("state", &ProcessorState::from_u8(self.state.load(Ordering::Acquire)))
            .finish()
    }
}
