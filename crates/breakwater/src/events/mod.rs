//! Structured event stream for resilience entities
//!
//! Every recorded outcome and state transition publishes exactly one
//! immutable event record carrying the entity name, a wall-clock timestamp
//! from the entity clock, and kind-specific detail. Events feed the bounded
//! per-entity logs and the registry-level merged views (see
//! [`EventPublisher`]); read-only endpoints serialize them as-is.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::circuit_breaker::CircuitState;

mod publisher;

pub use publisher::EventPublisher;

/// Event emitted by a retry entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryEvent {
    /// Name of the emitting entity
    pub name: String,
    /// Wall-clock time at which the event was recorded
    pub timestamp: DateTime<Utc>,
    /// What happened, with kind-specific detail
    pub kind: RetryEventKind,
}

/// Kinds of retry events
///
/// `error` detail is absent when the attempt was driven by a retryable
/// result value rather than a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RetryEventKind {
    /// A failed attempt will be retried after the given wait
    Retry { attempt: u32, wait: Duration, error: Option<String> },
    /// The call succeeded after at least one retry
    Success { attempts: u32 },
    /// The call reached a terminal failure
    Error { attempts: u32, error: Option<String> },
    /// The error matched the ignore predicate and bypassed retrying
    IgnoredError { error: String },
}

impl RetryEventKind {
    /// Stable label for filtering and display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Retry { .. } => "RETRY",
            Self::Success { .. } => "SUCCESS",
            Self::Error { .. } => "ERROR",
            Self::IgnoredError { .. } => "IGNORED_ERROR",
        }
    }
}

impl fmt::Display for RetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Event emitted by a circuit breaker entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CircuitBreakerEvent {
    /// Name of the emitting entity
    pub name: String,
    /// Wall-clock time at which the event was recorded
    pub timestamp: DateTime<Utc>,
    /// What happened, with kind-specific detail
    pub kind: CircuitBreakerEventKind,
}

/// Kinds of circuit breaker events
///
/// A slow outcome emits `SlowCall` instead of `Success`/`Error`, keeping the
/// one-event-per-recorded-outcome accounting exact; the `error` field tells
/// slow failures apart from slow successes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CircuitBreakerEventKind {
    /// A permitted call completed successfully within the slow threshold
    Success { duration: Duration },
    /// A permitted call failed within the slow threshold
    Error { duration: Duration, error: String },
    /// A permitted call exceeded the slow-call duration threshold
    SlowCall { duration: Duration, error: Option<String> },
    /// A call was rejected without execution
    NotPermitted,
    /// The breaker moved between states
    StateTransition { from: CircuitState, to: CircuitState },
}

impl CircuitBreakerEventKind {
    /// Stable label for filtering and display
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "SUCCESS",
            Self::Error { .. } => "ERROR",
            Self::SlowCall { .. } => "SLOW_CALL",
            Self::NotPermitted => "NOT_PERMITTED",
            Self::StateTransition { .. } => "STATE_TRANSITION",
        }
    }
}

impl fmt::Display for CircuitBreakerEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
