//! Retry engine with sync, async and scheduled execution
//!
//! A [`Retry`] entity wraps fallible operations and re-invokes them until
//! they succeed, the configured attempt budget runs out, or the failure is
//! classified as not retryable. One entity carries one configuration, one
//! set of outcome counters and one event log, shared by all three execution
//! surfaces: blocking [`Retry::execute`], async [`Retry::execute_async`] and
//! fire-and-forget [`Retry::schedule`].

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::classify::Classification;
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigResult;
use crate::events::{EventPublisher, RetryEvent, RetryEventKind};

mod backoff;
mod config;
mod metrics;
mod schedule;

pub use backoff::{BackoffStrategy, Jitter};
pub use config::{RetryConfig, RetryConfigBuilder};
pub use metrics::RetryMetrics;
pub use schedule::ScheduledRetry;

/// What the engine does next after evaluating one attempt
enum AttemptOutcome<T, E> {
    /// Return this result to the caller
    Terminal(Result<T, E>),
    /// Wait the given duration, then invoke the operation again
    Retry(Duration),
}

/// Named retry entity protecting repeated invocations of an operation
///
/// Supports both async and sync operations, with configurable Clock for
/// testing. Clones share counters, event log and clock, so a clone handed to
/// a spawned task reports into the same entity.
pub struct Retry<C: Clock = SystemClock> {
    name: String,
    config: RetryConfig,
    successful_without_retry: Arc<AtomicU64>,
    successful_with_retry: Arc<AtomicU64>,
    failed_without_retry: Arc<AtomicU64>,
    failed_with_retry: Arc<AtomicU64>,
    events: Arc<EventPublisher<RetryEvent>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for Retry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retry")
            .field("name", &self.name)
            .field("config", &self.config)
            .field(
                "successful_without_retry",
                &self.successful_without_retry.load(Ordering::Acquire),
            )
            .field("successful_with_retry", &self.successful_with_retry.load(Ordering::Acquire))
            .field("failed_without_retry", &self.failed_without_retry.load(Ordering::Acquire))
            .field("failed_with_retry", &self.failed_with_retry.load(Ordering::Acquire))
            .finish()
    }
}

impl<C: Clock> Clone for Retry<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            successful_without_retry: Arc::clone(&self.successful_without_retry),
            successful_with_retry: Arc::clone(&self.successful_with_retry),
            failed_without_retry: Arc::clone(&self.failed_without_retry),
            failed_with_retry: Arc::clone(&self.failed_with_retry),
            events: Arc::clone(&self.events),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl Retry<SystemClock> {
    /// Create a new retry entity with the given configuration using system
    /// clock
    pub fn new(name: impl Into<String>, config: RetryConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }

    /// Create a retry entity with default configuration (convenience method)
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, RetryConfig::default()).expect("Default config should be valid")
    }

    /// Create a retry entity using the builder pattern
    pub fn builder(name: impl Into<String>) -> RetryBuilder<SystemClock> {
        RetryBuilder::new(name)
    }
}

impl<C: Clock> Retry<C> {
    /// Create a new retry entity with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: RetryConfig,
        clock: C,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let events = EventPublisher::new(config.event_buffer_size);
        Ok(Self::assemble(name.into(), config, Arc::new(clock), events))
    }

    /// Registry constructor wiring the event log into a merged upstream view
    ///
    /// The caller has already validated the configuration.
    pub(crate) fn with_upstream_events(
        name: String,
        config: RetryConfig,
        clock: Arc<C>,
        upstream: Arc<EventPublisher<RetryEvent>>,
    ) -> Self {
        let events = EventPublisher::with_upstream(config.event_buffer_size, upstream);
        Self::assemble(name, config, clock, events)
    }

    fn assemble(
        name: String,
        config: RetryConfig,
        clock: Arc<C>,
        events: EventPublisher<RetryEvent>,
    ) -> Self {
        Self {
            name,
            config,
            successful_without_retry: Arc::new(AtomicU64::new(0)),
            successful_with_retry: Arc::new(AtomicU64::new(0)),
            failed_without_retry: Arc::new(AtomicU64::new(0)),
            failed_with_retry: Arc::new(AtomicU64::new(0)),
            events: Arc::new(events),
            clock,
        }
    }

    /// Name of this entity
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this entity was built with
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Event log and live subscription feed of this entity
    pub fn events(&self) -> &EventPublisher<RetryEvent> {
        &self.events
    }

    /// Get a snapshot of the outcome counters
    pub fn metrics(&self) -> RetryMetrics {
        RetryMetrics {
            successful_calls_without_retry: self.successful_without_retry.load(Ordering::Acquire),
            successful_calls_with_retry: self.successful_with_retry.load(Ordering::Acquire),
            failed_calls_without_retry: self.failed_without_retry.load(Ordering::Acquire),
            failed_calls_with_retry: self.failed_with_retry.load(Ordering::Acquire),
        }
    }

    /// Execute a synchronous operation with retry protection
    ///
    /// Blocks the calling thread during backoff waits. The terminal error is
    /// the caller's own error type, unchanged.
    #[instrument(skip(self, operation), fields(name = %self.name, max_attempts = self.config.max_attempts))]
    pub fn execute<T, E, F>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        T: 'static,
        E: Error + 'static,
    {
        let mut attempt = 1;
        loop {
            match self.evaluate(operation(), attempt) {
                AttemptOutcome::Terminal(result) => return result,
                AttemptOutcome::Retry(wait) => {
                    std::thread::sleep(wait);
                    attempt += 1;
                }
            }
        }
    }

    /// Execute an async operation with retry protection
    ///
    /// Backoff waits suspend the task instead of blocking a thread.
    #[instrument(skip(self, operation), fields(name = %self.name, max_attempts = self.config.max_attempts))]
    pub async fn execute_async<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: 'static,
        E: Error + 'static,
    {
        let mut attempt = 1;
        loop {
            match self.evaluate(operation().await, attempt) {
                AttemptOutcome::Terminal(result) => return result,
                AttemptOutcome::Retry(wait) => {
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Run an async operation with retry protection on a background task
    ///
    /// The returned handle resolves to the terminal outcome via
    /// [`ScheduledRetry::join`] and cancels outstanding attempts when
    /// cancelled or dropped. Cancellation never interrupts an attempt that
    /// is already running; it prevents the next one from being scheduled.
    #[instrument(skip(self, operation), fields(name = %self.name, max_attempts = self.config.max_attempts))]
    pub fn schedule<T, E, F, Fut>(&self, mut operation: F) -> ScheduledRetry<T, E>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let retry = self.clone();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let (sender, receiver) = oneshot::channel();

        tokio::spawn(async move {
            if let Some(result) = retry.run_scheduled(&mut operation, &task_token).await {
                // The caller may have dropped the handle without joining.
                let _ = sender.send(result);
            }
        });

        ScheduledRetry::new(token, receiver)
    }

    /// Wrap a synchronous operation so every invocation is retried
    pub fn decorate<T, E, F>(&self, mut operation: F) -> impl FnMut() -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        T: 'static,
        E: Error + 'static,
    {
        let retry = self.clone();
        move || retry.execute(&mut operation)
    }

    /// Wrap an async operation so every invocation is retried
    pub fn decorate_async<T, E, F, Fut>(
        &self,
        operation: F,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, E>>
    where
        F: Fn() -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let retry = self.clone();
        move || {
            let retry = retry.clone();
            let operation = operation.clone();
            async move { retry.execute_async(operation).await }.boxed()
        }
    }

    /// Drive one scheduled execution to its terminal outcome
    ///
    /// Returns `None` when cancellation preempted the terminal outcome.
    async fn run_scheduled<T, E, F, Fut>(
        &self,
        operation: &mut F,
        token: &CancellationToken,
    ) -> Option<Result<T, E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: 'static,
        E: Error + 'static,
    {
        let mut attempt = 1;
        loop {
            if token.is_cancelled() {
                debug!("Scheduled retry cancelled before attempt {}", attempt);
                return None;
            }
            match self.evaluate(operation().await, attempt) {
                AttemptOutcome::Terminal(result) => return Some(result),
                AttemptOutcome::Retry(wait) => {
                    tokio::select! {
                        () = token.cancelled() => {
                            debug!("Scheduled retry cancelled during backoff wait");
                            return None;
                        }
                        () = tokio::time::sleep(wait) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    /// Classify one attempt's result and record its metrics and events
    fn evaluate<T, E>(&self, result: Result<T, E>, attempt: u32) -> AttemptOutcome<T, E>
    where
        T: 'static,
        E: Error + 'static,
    {
        match result {
            Ok(value) => {
                let retryable =
                    self.config.retry_on_result.as_ref().is_some_and(|predicate| predicate(&value));
                if retryable {
                    if attempt < self.config.max_attempts {
                        let wait = self.next_wait(attempt);
                        debug!(
                            "Result is retryable (attempt {}/{}), retrying after {:?}",
                            attempt, self.config.max_attempts, wait
                        );
                        self.record_retry(attempt, wait, None);
                        return AttemptOutcome::Retry(wait);
                    }
                    // Still a retryable value once attempts run out: the call
                    // counts as a failure, the value is returned as-is.
                    warn!("All retry attempts exhausted after {} tries; returning result", attempt);
                    self.record_failure(attempt, None);
                    return AttemptOutcome::Terminal(Ok(value));
                }
                self.record_success(attempt);
                AttemptOutcome::Terminal(Ok(value))
            }
            Err(error) => match self.config.classifier.classify(&error) {
                Classification::Ignore => {
                    debug!("Ignoring error, propagating without retry: {}", error);
                    self.record_ignored(&error);
                    AttemptOutcome::Terminal(Err(error))
                }
                Classification::Matched if attempt < self.config.max_attempts => {
                    let wait = self.next_wait(attempt);
                    warn!(
                        "Operation failed (attempt {}/{}), retrying after {:?}: {}",
                        attempt, self.config.max_attempts, wait, error
                    );
                    self.record_retry(attempt, wait, Some(error.to_string()));
                    AttemptOutcome::Retry(wait)
                }
                Classification::Matched => {
                    warn!("All retry attempts exhausted after {} tries: {}", attempt, error);
                    self.record_failure(attempt, Some(error.to_string()));
                    AttemptOutcome::Terminal(Err(error))
                }
                Classification::Unmatched => {
                    debug!("Error is not retryable, propagating: {}", error);
                    self.record_failure(attempt, Some(error.to_string()));
                    AttemptOutcome::Terminal(Err(error))
                }
            },
        }
    }

    fn next_wait(&self, attempt: u32) -> Duration {
        self.config.jitter.apply(self.config.backoff.delay_for(attempt))
    }

    /// First-attempt successes bump their counter without emitting an event.
    fn record_success(&self, attempt: u32) {
        if attempt == 1 {
            self.successful_without_retry.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.successful_with_retry.fetch_add(1, Ordering::Relaxed);
        debug!("Operation succeeded after {} attempts", attempt);
        self.publish(RetryEventKind::Success { attempts: attempt });
    }

    fn record_retry(&self, attempt: u32, wait: Duration, error: Option<String>) {
        self.publish(RetryEventKind::Retry { attempt, wait, error });
    }

    fn record_failure(&self, attempt: u32, error: Option<String>) {
        if attempt == 1 {
            self.failed_without_retry.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_with_retry.fetch_add(1, Ordering::Relaxed);
        }
        self.publish(RetryEventKind::Error { attempts: attempt, error });
    }

    fn record_ignored<E: Error>(&self, error: &E) {
        self.failed_without_retry.fetch_add(1, Ordering::Relaxed);
        self.publish(RetryEventKind::IgnoredError { error: error.to_string() });
    }

    fn publish(&self, kind: RetryEventKind) {
        self.events.publish(RetryEvent {
            name: self.name.clone(),
            timestamp: DateTime::<Utc>::from(self.clock.system_time()),
            kind,
        });
    }
}

/// Builder assembling a [`Retry`] entity
///
/// Swapping in a custom clock with [`RetryBuilder::clock`] changes the
/// entity's clock type; every other setter delegates to the configuration
/// builder.
#[derive(Debug)]
pub struct RetryBuilder<C: Clock = SystemClock> {
    name: String,
    config: RetryConfigBuilder,
    clock: C,
}

impl RetryBuilder<SystemClock> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), config: RetryConfigBuilder::new(), clock: SystemClock }
    }
}

impl<C: Clock> RetryBuilder<C> {
    /// Set a custom clock for the retry entity (useful for testing)
    pub fn clock<C2: Clock>(self, clock: C2) -> RetryBuilder<C2> {
        RetryBuilder { name: self.name, config: self.config, clock }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config = self.config.max_attempts(max_attempts);
        self
    }

    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config = self.config.backoff(backoff);
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config = self.config.jitter(jitter);
        self
    }

    pub fn classifier(mut self, classifier: crate::classify::Classifier) -> Self {
        self.config = self.config.classifier(classifier);
        self
    }

    pub fn retry_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.config = self.config.retry_on(predicate);
        self
    }

    pub fn retry_on_type<T: Error + 'static>(mut self) -> Self {
        self.config = self.config.retry_on_type::<T>();
        self
    }

    pub fn ignore<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.config = self.config.ignore(predicate);
        self
    }

    pub fn ignore_type<T: Error + 'static>(mut self) -> Self {
        self.config = self.config.ignore_type::<T>();
        self
    }

    pub fn retry_on_result<T, P>(mut self, predicate: P) -> Self
    where
        T: 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.config = self.config.retry_on_result::<T, P>(predicate);
        self
    }

    pub fn event_buffer_size(mut self, capacity: usize) -> Self {
        self.config = self.config.event_buffer_size(capacity);
        self
    }

    pub fn build(self) -> ConfigResult<Retry<C>> {
        Retry::with_clock(self.name, self.config.build()?, self.clock)
    }
}
