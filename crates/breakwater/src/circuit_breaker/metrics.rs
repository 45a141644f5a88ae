//! Circuit breaker metrics for monitoring

use serde::Serialize;

use super::CircuitState;

/// Point-in-time snapshot of a circuit breaker's health
///
/// `successful_calls`, `failed_calls` and `not_permitted_calls` are lifetime
/// totals, cleared only by `reset()`. `buffered_calls` and the two rates
/// reflect the current window and shrink on eviction or state change;
/// `max_buffered_calls` is the highest buffered count ever observed. Rates
/// are `-1.0` while fewer than the configured minimum number of calls are
/// buffered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CircuitBreakerMetrics {
    /// Breaker state at the time of the snapshot
    pub state: CircuitState,
    /// Outcomes currently buffered in the active window
    pub buffered_calls: u32,
    /// Highest buffered count ever observed
    pub max_buffered_calls: u32,
    /// Lifetime count of outcomes recorded as successes
    pub successful_calls: u64,
    /// Lifetime count of outcomes recorded as failures
    pub failed_calls: u64,
    /// Lifetime count of calls rejected without execution
    pub not_permitted_calls: u64,
    /// Failure rate (%) over the active window, or `-1.0`
    pub failure_rate: f32,
    /// Slow-call rate (%) over the active window, or `-1.0`
    pub slow_call_rate: f32,
}
