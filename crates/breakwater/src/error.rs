//! Error types shared across the toolkit
//!
//! Three concerns live here: configuration validation failures, call
//! rejections issued by a circuit breaker, and the generic wrapper returned
//! by call decorators. Retry execution itself surfaces the caller's own error
//! type unchanged; only decorated calls and scheduled retries need a wrapper
//! to express rejection and cancellation outcomes.

use thiserror::Error;

use crate::circuit_breaker::CircuitState;

/// Configuration error for builder validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// A call rejected by a circuit breaker without being executed
///
/// Issued while the breaker is OPEN or FORCED_OPEN, or once the HALF_OPEN
/// trial quota is exhausted. Rejected calls are never retried by the core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circuit breaker '{name}' rejected the call while {state}")]
pub struct CallRejected {
    /// Name of the rejecting entity
    pub name: String,
    /// Breaker state at the time of rejection
    pub state: CircuitState,
}

/// Errors that can occur in decorated resilience operations
///
/// Generic over the underlying operation error type `E` so the original
/// failure is preserved instead of being flattened into a string.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The circuit breaker rejected the call without executing it
    #[error(transparent)]
    Rejected(#[from] CallRejected),

    /// A scheduled retry was cancelled before reaching a terminal outcome
    #[error("scheduled retry was cancelled before completion")]
    Cancelled,

    /// The underlying operation failed
    #[error("operation failed")]
    Operation {
        #[source]
        source: E,
    },
}

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Returns `true` for a rejection issued by a circuit breaker
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    /// Returns `true` when a scheduled retry was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Consume the error, returning the underlying operation error if any
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Operation { source } => Some(source),
            Self::Rejected(_) | Self::Cancelled => None,
        }
    }
}

/// Result type for decorated resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;
