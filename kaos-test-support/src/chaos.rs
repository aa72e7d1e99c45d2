//! Chaos testing utilities - random delays and stalls.
//!
//! Injected into producers and handlers to shake out ordering assumptions
//! that only hold when every thread runs at the same speed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Duration;

/// Types of chaos events that can be injected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChaosEvent {
    /// Sleep for a random amount
    Delay { min_us: u64, max_us: u64 },
    /// Give up the time slice
    Yield,
    /// No chaos - pass through
    None,
}

/// Chaos monkey for injecting random scheduling noise into tests.
///
/// # Example
///
/// ```
/// use kaos_test_support::chaos::ChaosMonkey;
///
/// let mut monkey = ChaosMonkey::new()
///     .with_delay_probability(0.01)  // 1% chance of delay
///     .with_yield_probability(0.05);
///
/// for _ in 0..100 {
///     monkey.maybe_stall();
/// }
/// ```
pub struct ChaosMonkey {
    delay_probability: f64,
    delay_min_us: u64,
    delay_max_us: u64,
    yield_probability: f64,
    rng: StdRng,
    events_triggered: usize,
}

impl Default for ChaosMonkey {
    fn default() -> Self {
        Self::new()
    }
}

impl ChaosMonkey {
    pub fn new() -> Self {
        Self {
            delay_probability: 0.0,
            delay_min_us: 10,
            delay_max_us: 500,
            yield_probability: 0.0,
            rng: StdRng::from_entropy(),
            events_triggered: 0,
        }
    }

    /// Create an aggressive chaos monkey for stress testing
    pub fn aggressive() -> Self {
        Self::new()
            .with_delay_probability(0.02)
            .with_yield_probability(0.1)
    }

    /// Create a mild chaos monkey for basic testing
    pub fn mild() -> Self {
        Self::new()
            .with_delay_probability(0.002)
            .with_yield_probability(0.01)
    }

    /// Reproducible noise for a failing run.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_delay_probability(mut self, prob: f64) -> Self {
        self.delay_probability = prob.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay_range(mut self, min_us: u64, max_us: u64) -> Self {
        self.delay_min_us = min_us;
        self.delay_max_us = max_us.max(min_us);
        self
    }

    pub fn with_yield_probability(mut self, prob: f64) -> Self {
        self.yield_probability = prob.clamp(0.0, 1.0);
        self
    }

    /// Decide what chaos event to apply (if any)
    pub fn decide(&mut self) -> ChaosEvent {
        let roll = self.rng.gen::<f64>();

        if roll < self.delay_probability {
            self.events_triggered += 1;
            return ChaosEvent::Delay {
                min_us: self.delay_min_us,
                max_us: self.delay_max_us,
            };
        }
        if roll < self.delay_probability + self.yield_probability {
            self.events_triggered += 1;
            return ChaosEvent::Yield;
        }
        ChaosEvent::None
    }

    /// Maybe delay or yield the current thread
    pub fn maybe_stall(&mut self) -> ChaosEvent {
        let event = self.decide();
        apply_chaos(&event, &mut self.rng);
        event
    }

    /// Get number of chaos events triggered
    pub fn events_triggered(&self) -> usize {
        self.events_triggered
    }
}

/// Apply a chaos event to the current thread
pub fn apply_chaos(event: &ChaosEvent, rng: &mut impl Rng) {
    match event {
        ChaosEvent::Delay { min_us, max_us } => {
            let delay = rng.gen_range(*min_us..=*max_us);
            std::thread::sleep(Duration::from_micros(delay));
        }
        ChaosEvent::Yield => std::thread::yield_now(),
        ChaosEvent::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_chaos() {
        let mut monkey = ChaosMonkey::new();
        for _ in 0..1000 {
            assert_eq!(monkey.maybe_stall(), ChaosEvent::None);
        }
        assert_eq!(monkey.events_triggered(), 0);
    }

    #[test]
    fn test_always_yield() {
        let mut monkey = ChaosMonkey::new().with_yield_probability(1.0);
        assert_eq!(monkey.maybe_stall(), ChaosEvent::Yield);
        assert_eq!(monkey.events_triggered(), 1);
    }

    #[test]
    fn test_always_delay() {
        let mut monkey = ChaosMonkey::new()
            .with_delay_probability(1.0)
            .with_delay_range(1, 2);
        assert_eq!(
            monkey.decide(),
            ChaosEvent::Delay {
                min_us: 1,
                max_us: 2
            }
        );
    }

    #[test]
    fn test_seeded_monkeys_agree() {
        let mut a = ChaosMonkey::aggressive().with_seed(7);
        let mut b = ChaosMonkey::aggressive().with_seed(7);
        for _ in 0..100 {
            assert_eq!(a.decide(), b.decide());
        }
    }

    #[test]
    fn test_monkey_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ChaosMonkey>();
    }

    #[test]
    fn test_aggressive_triggers_events() {
        let mut monkey = ChaosMonkey::aggressive().with_delay_range(1, 5);
        for _ in 0..2_000 {
            monkey.maybe_stall();
        }
        assert!(monkey.events_triggered() > 0);
    }
}
