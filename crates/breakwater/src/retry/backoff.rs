//! Backoff and jitter calculations for retry waits
//!
//! The wait before a retry is a pure function of the 1-based attempt number
//! that just failed: `delay_for(1)` is the wait before the second invocation.
//! Jitter is applied on top of the calculated delay to spread out retry
//! storms from concurrent callers.

use std::time::Duration;

use rand::Rng;

/// Strategy for calculating the wait between retry attempts
#[derive(Debug, Clone, Copy)]
pub enum BackoffStrategy {
    /// Same wait for every retry
    Fixed(Duration),
    /// Wait grows by a fixed increment per attempt
    Linear { initial_delay: Duration, increment: Duration },
    /// Wait grows exponentially, capped at a maximum
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
    /// Caller-supplied function of the attempt number
    Custom(fn(u32) -> Duration),
}

impl BackoffStrategy {
    /// Calculate the wait after the given failed attempt (1-based)
    ///
    /// An attempt number of 0 behaves like 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let index = attempt.saturating_sub(1);
        match *self {
            Self::Fixed(delay) => delay,
            Self::Linear { initial_delay, increment } => increment
                .checked_mul(index)
                .map_or(Duration::MAX, |growth| initial_delay.saturating_add(growth)),
            Self::Exponential { initial_delay, base, max_delay } => {
                let delay = initial_delay.as_secs_f64() * base.powf(f64::from(index));
                if delay.is_finite() {
                    Duration::from_secs_f64(delay.min(max_delay.as_secs_f64()))
                } else {
                    max_delay
                }
            }
            Self::Custom(calculate) => calculate(attempt.max(1)),
        }
    }
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Fixed(Duration::from_millis(500))
    }
}

/// Jitter applied on top of a calculated backoff delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Use the calculated delay as-is
    #[default]
    None,
    /// Uniform random delay in `[0, delay]`
    Full,
    /// Half the delay guaranteed, the other half randomized
    Equal,
    /// Decorrelated jitter: uniform in `[base, 3 * delay]`
    Decorrelated { base: Duration },
}

impl Jitter {
    /// Apply jitter to a calculated delay
    pub fn apply(&self, delay: Duration) -> Duration {
        let mut rng = rand::thread_rng();
        match *self {
            Self::None => delay,
            Self::Full => {
                Duration::from_nanos(rng.gen_range(0..=saturating_nanos(delay)))
            }
            Self::Equal => {
                let half = delay / 2;
                half + Duration::from_nanos(rng.gen_range(0..=saturating_nanos(half)))
            }
            Self::Decorrelated { base } => {
                let floor = saturating_nanos(base);
                let ceiling = saturating_nanos(delay.saturating_mul(3)).max(floor);
                Duration::from_nanos(rng.gen_range(floor..=ceiling))
            }
        }
    }
}

fn saturating_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
