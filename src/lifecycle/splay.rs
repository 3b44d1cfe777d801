//! Randomized launch delay
//!
//! Spreads runs started at the same moment across `[0, max_delay)` seconds.
//! The sleep is cut into short slices so a signal interrupts it promptly.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::signal::SignalState;

/// Granularity at which a splay sleep checks for cancellation.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pick a delay uniformly in `[0, max_delay)` seconds. Non-positive
/// `max_delay` never delays.
pub fn splay_duration<R: Rng + ?Sized>(max_delay: i64, rng: &mut R) -> Duration {
    if max_delay <= 0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rng.gen_range(0.0..max_delay as f64))
}

/// Outcome of an interruptible sleep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepOutcome {
    Completed,
    Interrupted,
}

/// Blocking sleep that may be cut short.
pub trait Sleeper {
    fn sleep(&self, duration: Duration) -> SleepOutcome;
}

/// Sleeps in slices, stopping early once cancellation is requested.
#[derive(Debug, Clone)]
pub struct SignalSleeper<'a> {
    state: &'a SignalState,
    poll: Duration,
}

impl<'a> SignalSleeper<'a> {
    pub fn new(state: &'a SignalState) -> Self {
        Self {
            state,
            poll: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }
}

impl Sleeper for SignalSleeper<'_> {
    fn sleep(&self, duration: Duration) -> SleepOutcome {
        let deadline = Instant::now() + duration;

        loop {
            if self.state.is_cancel_requested() {
                return SleepOutcome::Interrupted;
            }
            let now = Instant::now();
            if now >= deadline {
                return SleepOutcome::Completed;
            }
            std::thread::sleep(self.poll.min(deadline - now));
        }
    }
}

/// Sleeper that returns at once, for tests and `max_delay = 0` callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSleep;

impl Sleeper for NoSleep {
    fn sleep(&self, _duration: Duration) -> SleepOutcome {
        SleepOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_and_negative_never_delay() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(splay_duration(0, &mut rng), Duration::ZERO);
        assert_eq!(splay_duration(-30, &mut rng), Duration::ZERO);
    }

    #[test]
    fn test_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..1000 {
            let d = splay_duration(5, &mut rng);
            assert!(d < Duration::from_secs(5), "{d:?}");
        }
    }

    #[test]
    fn test_roughly_uniform() {
        let mut rng = StdRng::seed_from_u64(1234);
        let mut buckets = [0u32; 4];
        for _ in 0..4000 {
            let secs = splay_duration(4, &mut rng).as_secs_f64();
            buckets[(secs as usize).min(3)] += 1;
        }
        for count in buckets {
            assert!((800..1200).contains(&count), "{buckets:?}");
        }
    }

    #[test]
    fn test_sleeper_completes() {
        let state = SignalState::new();
        let sleeper = SignalSleeper::new(&state).with_poll_interval(Duration::from_millis(5));
        let start = Instant::now();
        assert_eq!(sleeper.sleep(Duration::from_millis(30)), SleepOutcome::Completed);
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_sleeper_interrupted_by_signal() {
        let state = SignalState::new();
        state.handle_signal();
        let sleeper = SignalSleeper::new(&state);
        let start = Instant::now();
        assert_eq!(sleeper.sleep(Duration::from_secs(60)), SleepOutcome::Interrupted);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
