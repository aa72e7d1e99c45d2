//! Wait strategies: how a consumer waits for a sequence to become available.
//!
//! | Strategy                       | Technique                          | CPU     | Latency |
//! |--------------------------------|------------------------------------|---------|---------|
//! | `BusySpinWaitStrategy`         | tight re-read loop                 | highest | lowest  |
//! | `YieldingWaitStrategy`         | spin N times, then yield           | high    | low     |
//! | `SleepingWaitStrategy`         | spin, yield, then short sleeps     | medium  | medium  |
//! | `BlockingWaitStrategy`         | mutex + condvar, signalled on publish | lowest | highest |
//! | `LiteBlockingWaitStrategy`     | blocking, signals only when parked | lowest  | high    |
//! | `TimeoutBlockingWaitStrategy`  | blocking with a deadline           | lowest  | highest |
//! | `PhasedBackoffWaitStrategy<F>` | spin, yield, then fallback `F`     | adaptive| adaptive|
//!
//! Every strategy re-reads the alert flag on each iteration, and parked
//! threads wake at least every [`ALERT_POLL_INTERVAL`] to do the same.

use std::hint;
use std::sync::atomic::{self, AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{KaosError, Result};
use crate::sequence::{Fence, Sequence, SequenceGroup};

/// Longest a parked waiter sleeps before re-checking its alert flag.
pub const ALERT_POLL_INTERVAL: Duration = Duration::from_millis(10);

const DEFAULT_SPIN_TRIES: u32 = 100;
const DEFAULT_SLEEP_RETRIES: u32 = 200;
const DEFAULT_SLEEP: Duration = Duration::from_nanos(100);
const PHASED_SPIN_TRIES: u32 = 10_000;

/// Policy for waiting until `dependents` reach a target sequence.
pub trait WaitStrategy: Send + Sync + 'static {
    /// Wait until `dependents` reach `sequence` and return the highest value
    /// currently available (which may exceed `sequence`).
    ///
    /// `cursor` is the sequencer's published cursor; blocking strategies park
    /// on it. Returns `KaosError::Alerted` once `alerted` is set and
    /// `KaosError::Timeout` for strategies with a deadline.
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64>;

    /// Wake every thread parked in `wait_for`. No-op unless the strategy parks.
    #[inline]
    fn signal_all_when_blocking(&self) {}
}

#[inline]
fn check_alert(alerted: &AtomicBool) -> Result<()> {
    if alerted.load(Ordering::Acquire) {
        Err(KaosError::Alerted)
    } else {
        Ok(())
    }
}

#[derive(Clone, Copy)]
struct Deadline(Option<Instant>);

impl Deadline {
    #[inline]
    fn after(timeout: Option<Duration>) -> Self {
        Deadline(timeout.map(|t| Instant::now() + t))
    }

    #[inline]
    fn check(&self) -> Result<()> {
        match self.0 {
            Some(at) if Instant::now() >= at => Err(KaosError::Timeout),
            _ => Ok(()),
        }
    }
}

/// Spin on `dependents` until they reach `sequence`, calling `idle` between reads.
#[inline]
fn spin_on<F: FnMut()>(
    sequence: i64,
    dependents: &SequenceGroup,
    alerted: &AtomicBool,
    deadline: Deadline,
    mut idle: F,
) -> Result<i64> {
    loop {
        let available = dependents.get();
        if available >= sequence {
            return Ok(available);
        }
        check_alert(alerted)?;
        deadline.check()?;
        idle();
    }
}

// ============================================================================
// Spinning strategies
// ============================================================================

/// Re-reads the dependent sequences in a tight loop. Pins a core.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusySpinWaitStrategy {
    timeout: Option<Duration>,
}

impl BusySpinWaitStrategy {
    pub const fn new() -> Self {
        Self { timeout: None }
    }

    /// Return `KaosError::Timeout` after waiting `timeout`.
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl WaitStrategy for BusySpinWaitStrategy {
    #[inline]
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64> {
        spin_on(
            sequence,
            dependents,
            alerted,
            Deadline::after(self.timeout),
            hint::spin_loop,
        )
    }
}

/// Spins `spin_tries` times, then yields the thread between reads.
#[derive(Debug, Clone, Copy)]
pub struct YieldingWaitStrategy {
    spin_tries: u32,
    timeout: Option<Duration>,
}

impl Default for YieldingWaitStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_SPIN_TRIES)
    }
}

impl YieldingWaitStrategy {
    pub const fn new(spin_tries: u32) -> Self {
        Self {
            spin_tries,
            timeout: None,
        }
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl WaitStrategy for YieldingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut counter = self.spin_tries;
        spin_on(
            sequence,
            dependents,
            alerted,
            Deadline::after(self.timeout),
            || {
                if counter == 0 {
                    thread::yield_now();
                } else {
                    counter -= 1;
                    hint::spin_loop();
                }
            },
        )
    }
}

/// Spins, then yields, then sleeps for `sleep` between reads.
///
/// The first `retries / 2` iterations spin, the rest yield, and once the
/// budget is spent every iteration sleeps.
#[derive(Debug, Clone, Copy)]
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep: Duration,
    timeout: Option<Duration>,
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_SLEEP_RETRIES, DEFAULT_SLEEP)
    }
}

impl SleepingWaitStrategy {
    pub const fn new(retries: u32, sleep: Duration) -> Self {
        Self {
            retries,
            sleep,
            timeout: None,
        }
    }

    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        _cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let spin_until = self.retries / 2;
        let mut counter = self.retries;
        spin_on(
            sequence,
            dependents,
            alerted,
            Deadline::after(self.timeout),
            || {
                if counter > spin_until {
                    counter -= 1;
                    hint::spin_loop();
                } else if counter > 0 {
                    counter -= 1;
                    thread::yield_now();
                } else {
                    thread::sleep(self.sleep);
                }
            },
        )
    }
}

// ============================================================================
// Blocking strategies
// ============================================================================

/// Parks on a condition variable until a publisher signals.
///
/// The mutex is only ever held while parking or signalling, never across a
/// claim or publish.
#[derive(Debug, Default)]
pub struct BlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
}

impl BlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                check_alert(alerted)?;
                self.condvar.wait_for(&mut guard, ALERT_POLL_INTERVAL);
            }
        }
        spin_on(
            sequence,
            dependents,
            alerted,
            Deadline(None),
            hint::spin_loop,
        )
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

/// Blocking strategy that skips the mutex on publish unless a waiter parked.
#[derive(Debug, Default)]
pub struct LiteBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    signal_needed: AtomicBool,
}

impl LiteBlockingWaitStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WaitStrategy for LiteBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64> {
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            loop {
                self.signal_needed.store(true, Ordering::SeqCst);
                if cursor.read(Fence::Full) >= sequence {
                    break;
                }
                check_alert(alerted)?;
                self.condvar.wait_for(&mut guard, ALERT_POLL_INTERVAL);
            }
        }
        spin_on(
            sequence,
            dependents,
            alerted,
            Deadline(None),
            hint::spin_loop,
        )
    }

    fn signal_all_when_blocking(&self) {
        atomic::fence(Ordering::SeqCst);
        if self.signal_needed.swap(false, Ordering::SeqCst) {
            let _guard = self.mutex.lock();
            self.condvar.notify_all();
        }
    }
}

/// Blocking strategy that gives up with `KaosError::Timeout` after `timeout`.
#[derive(Debug)]
pub struct TimeoutBlockingWaitStrategy {
    mutex: Mutex<()>,
    condvar: Condvar,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            mutex: Mutex::new(()),
            condvar: Condvar::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let deadline = Instant::now() + self.timeout;
        if cursor.get() < sequence {
            let mut guard = self.mutex.lock();
            while cursor.get() < sequence {
                check_alert(alerted)?;
                let now = Instant::now();
                if now >= deadline {
                    return Err(KaosError::Timeout);
                }
                let wake_at = deadline.min(now + ALERT_POLL_INTERVAL);
                self.condvar.wait_until(&mut guard, wake_at);
            }
        }
        spin_on(
            sequence,
            dependents,
            alerted,
            Deadline(Some(deadline)),
            hint::spin_loop,
        )
    }

    fn signal_all_when_blocking(&self) {
        let _guard = self.mutex.lock();
        self.condvar.notify_all();
    }
}

// ============================================================================
// Phased backoff
// ============================================================================

/// Spins for `spin_timeout`, yields until `yield_timeout`, then hands the
/// wait to `fallback`.
#[derive(Debug)]
pub struct PhasedBackoffWaitStrategy<F: WaitStrategy> {
    spin_timeout: Duration,
    yield_timeout: Duration,
    fallback: F,
}

impl<F: WaitStrategy> PhasedBackoffWaitStrategy<F> {
    /// `yield_timeout` is measured from the start of the wait and must not be
    /// shorter than `spin_timeout`.
    pub fn new(spin_timeout: Duration, yield_timeout: Duration, fallback: F) -> Self {
        Self {
            spin_timeout,
            yield_timeout: yield_timeout.max(spin_timeout),
            fallback,
        }
    }
}

impl PhasedBackoffWaitStrategy<BlockingWaitStrategy> {
    pub fn with_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, BlockingWaitStrategy::new())
    }
}

impl PhasedBackoffWaitStrategy<LiteBlockingWaitStrategy> {
    pub fn with_lite_lock(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, LiteBlockingWaitStrategy::new())
    }
}

impl PhasedBackoffWaitStrategy<SleepingWaitStrategy> {
    pub fn with_sleep(spin_timeout: Duration, yield_timeout: Duration) -> Self {
        Self::new(spin_timeout, yield_timeout, SleepingWaitStrategy::new(0, DEFAULT_SLEEP))
    }
}

impl<F: WaitStrategy> WaitStrategy for PhasedBackoffWaitStrategy<F> {
    fn wait_for(
        &self,
        sequence: i64,
        cursor: &Sequence,
        dependents: &SequenceGroup,
        alerted: &AtomicBool,
    ) -> Result<i64> {
        let mut start: Option<Instant> = None;
        let mut counter = PHASED_SPIN_TRIES;
        loop {
            let available = dependents.get();
            if available >= sequence {
                return Ok(available);
            }
            check_alert(alerted)?;

            counter -= 1;
            if counter == 0 {
                let now = Instant::now();
                let elapsed = now - *start.get_or_insert(now);
                if elapsed > self.yield_timeout {
                    return self.fallback.wait_for(sequence, cursor, dependents, alerted);
                } else if elapsed > self.spin_timeout {
                    thread::yield_now();
                }
                counter = PHASED_SPIN_TRIES;
            }
        }
    }

    fn signal_all_when_blocking(&self) {
        self.fallback.signal_all_when_blocking();
    }
}
