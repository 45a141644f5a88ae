//! Outcome classification for retry and circuit-breaker accounting
//!
//! Both entity kinds answer the same question on every failure: ignore it,
//! act on it, or pass it through. The answer comes from one configurable
//! [`Classifier`] holding two type-erased predicates over `&dyn Error`, so
//! entities stay non-generic and a registry can hold them uniformly. What the
//! answer *means* differs per engine: a matched error is retried by the retry
//! engine and recorded as a window failure by the circuit breaker; an
//! unmatched error is terminal for retry and success-equivalent for the
//! breaker.

use std::any::Any;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

/// Predicate over a borrowed error trait object
///
/// The `'static` bound keeps `Error::is::<T>()` and `downcast_ref` available
/// inside predicates for type-based matching.
pub type ErrorPredicate = Arc<dyn Fn(&(dyn Error + 'static)) -> bool + Send + Sync>;

/// Type-erased predicate over a successful result value
pub type ResultPredicate = Arc<dyn Fn(&dyn Any) -> bool + Send + Sync>;

/// How an error should be treated by the entity that observed it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The ignore predicate matched: propagate the error unchanged and
    /// bypass failure accounting entirely.
    Ignore,
    /// The error counts as a failure the entity acts on (retryable for the
    /// retry engine, recorded for the circuit breaker).
    Matched,
    /// No predicate claimed the error: terminal for the retry engine,
    /// success-equivalent for the circuit breaker.
    Unmatched,
}

/// Configurable matcher deciding how failures are classified
///
/// The ignore predicate always takes precedence. With no match predicate
/// configured, every non-ignored error is [`Classification::Matched`], which
/// is the retry-everything / record-everything default of both entity kinds.
#[derive(Clone, Default)]
pub struct Classifier {
    pub(crate) matches: Option<ErrorPredicate>,
    pub(crate) ignores: Option<ErrorPredicate>,
}

impl Classifier {
    /// Create a classifier that matches every error and ignores none
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict matching to errors satisfying the predicate
    pub fn matches_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.matches = Some(Arc::new(predicate));
        self
    }

    /// Ignore errors satisfying the predicate (takes precedence over
    /// matching)
    pub fn ignores_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.ignores = Some(Arc::new(predicate));
        self
    }

    /// Classify an error against the configured predicates
    pub fn classify(&self, error: &(dyn Error + 'static)) -> Classification {
        if self.ignores.as_ref().is_some_and(|ignores| ignores(error)) {
            return Classification::Ignore;
        }
        if self.matches.as_ref().map_or(true, |matches| matches(error)) {
            Classification::Matched
        } else {
            Classification::Unmatched
        }
    }
}

impl fmt::Debug for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Classifier")
            .field("matches", &self.matches.as_ref().map(|_| "<predicate>"))
            .field("ignores", &self.ignores.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

/// Build an error predicate matching a concrete error type
pub(crate) fn type_matcher<T: Error + 'static>() -> ErrorPredicate {
    Arc::new(|error| error.is::<T>())
}

/// Erase a typed result predicate into the `dyn Any` form stored in config
///
/// Values of any other type never match, so a predicate installed for one
/// result type is inert when the entity wraps calls returning another.
pub(crate) fn erase_result_predicate<T, P>(predicate: P) -> ResultPredicate
where
    T: 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    Arc::new(move |value: &dyn Any| value.downcast_ref::<T>().is_some_and(&predicate))
}
