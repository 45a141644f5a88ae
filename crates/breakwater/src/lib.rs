//! Fault-tolerance building blocks for unreliable operations.
//!
//! Breakwater provides **generic, reusable** resilience patterns:
//! - **Retry**: bounded re-execution with configurable backoff and jitter,
//!   for synchronous closures, futures, and background scheduling
//! - **Circuit Breaker**: call-outcome tracking over a sliding window that
//!   short-circuits callers while a downstream dependency is unhealthy
//! - **Registries**: named, get-or-create instance management with a merged
//!   event view across all instances
//!
//! Every entity records metrics, publishes a bounded event log, and supports
//! live event subscriptions. Time is abstracted behind the [`Clock`] trait so
//! tests can drive waiting periods deterministically with [`MockClock`].
//!
//! # Example
//!
//! ```
//! use breakwater::{BackoffStrategy, Retry, RetryConfig};
//! use std::time::Duration;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("connection refused")]
//! struct ConnectionRefused;
//!
//! let config = RetryConfig::builder()
//!     .max_attempts(3)
//!     .backoff(BackoffStrategy::Fixed(Duration::from_millis(0)))
//!     .build()
//!     .unwrap();
//! let retry = Retry::new("example", config).unwrap();
//!
//! let mut calls = 0;
//! let result: Result<u32, _> = retry.execute(|| {
//!     calls += 1;
//!     if calls < 2 { Err(ConnectionRefused) } else { Ok(42) }
//! });
//! assert_eq!(result.unwrap(), 42);
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod circuit_breaker;
pub mod classify;
pub mod clock;
pub mod error;
pub mod events;
pub mod registry;
pub mod retry;

// Re-export circuit breaker types
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerBuilder, CircuitBreakerConfig, CircuitBreakerConfigBuilder,
    CircuitBreakerMetrics, CircuitState,
};
// Re-export classification types
pub use classify::{Classification, Classifier, ErrorPredicate, ResultPredicate};
// Re-export clock abstraction
pub use clock::{Clock, MockClock, SystemClock};
// Re-export error types
pub use error::{CallRejected, ConfigError, ConfigResult, ResilienceError, ResilienceResult};
// Re-export event types
pub use events::{
    CircuitBreakerEvent, CircuitBreakerEventKind, EventPublisher, RetryEvent, RetryEventKind,
};
// Re-export registry types
pub use registry::{CircuitBreakerRegistry, RetryRegistry};
// Re-export retry types
pub use retry::{
    BackoffStrategy, Jitter, Retry, RetryBuilder, RetryConfig, RetryConfigBuilder, RetryMetrics,
    ScheduledRetry,
};
