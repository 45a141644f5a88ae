//! Circuit breaker state machine guarding calls to a protected backend
//!
//! The circuit breaker prevents cascading failures by watching recent call
//! outcomes in a sliding window and failing fast once failure or slow-call
//! rates cross their thresholds. Recovery is probed with a limited number of
//! trial calls instead of a thundering herd. Two manual states exist for
//! operations work: DISABLED always permits and records nothing, FORCED_OPEN
//! always rejects until explicitly cleared.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::classify::Classification;
use crate::clock::{Clock, SystemClock};
use crate::error::{CallRejected, ConfigResult, ResilienceError, ResilienceResult};
use crate::events::{CircuitBreakerEvent, CircuitBreakerEventKind, EventPublisher};

mod config;
mod metrics;
mod window;

pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use metrics::CircuitBreakerMetrics;

use window::SlidingWindow;

/// Circuit breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation: calls permitted, outcomes recorded
    Closed,
    /// Failing fast: calls rejected until the open wait elapses
    Open,
    /// Trial mode: a limited number of probe calls decides what follows
    HalfOpen,
    /// Operational pass-through: calls permitted, nothing recorded
    Disabled,
    /// Manual open: calls rejected until explicitly transitioned away
    ForcedOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
            Self::Disabled => "DISABLED",
            Self::ForcedOpen => "FORCED_OPEN",
        };
        f.write_str(label)
    }
}

/// Full state the breaker acts on, kept behind one lock
///
/// The window lives inside the state variant so a state change atomically
/// swaps in the right window: entering CLOSED or HALF_OPEN always starts a
/// fresh one.
#[derive(Debug)]
enum StateInner {
    Closed { window: SlidingWindow },
    Open { opened_at: Instant },
    HalfOpen { window: SlidingWindow, permits_issued: u32 },
    Disabled,
    ForcedOpen,
}

impl StateInner {
    fn kind(&self) -> CircuitState {
        match self {
            Self::Closed { .. } => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
            Self::Disabled => CircuitState::Disabled,
            Self::ForcedOpen => CircuitState::ForcedOpen,
        }
    }

    fn window(&self) -> Option<&SlidingWindow> {
        match self {
            Self::Closed { window } | Self::HalfOpen { window, .. } => Some(window),
            Self::Open { .. } | Self::Disabled | Self::ForcedOpen => None,
        }
    }
}

/// Named circuit breaker entity
///
/// Supports both async and sync operations, with configurable Clock for
/// testing. Clones share state, counters, event log and clock.
pub struct CircuitBreaker<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfig,
    state: Arc<Mutex<StateInner>>,
    total_successful: Arc<AtomicU64>,
    total_failed: Arc<AtomicU64>,
    not_permitted: Arc<AtomicU64>,
    max_buffered: Arc<AtomicU32>,
    events: Arc<EventPublisher<CircuitBreakerEvent>>,
    clock: Arc<C>,
}

impl<C: Clock> fmt::Debug for CircuitBreaker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .field("total_successful", &self.total_successful.load(Ordering::Acquire))
            .field("total_failed", &self.total_failed.load(Ordering::Acquire))
            .field("not_permitted", &self.not_permitted.load(Ordering::Acquire))
            .finish()
    }
}

impl<C: Clock> Clone for CircuitBreaker<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            config: self.config.clone(),
            state: Arc::clone(&self.state),
            total_successful: Arc::clone(&self.total_successful),
            total_failed: Arc::clone(&self.total_failed),
            not_permitted: Arc::clone(&self.not_permitted),
            max_buffered: Arc::clone(&self.max_buffered),
            events: Arc::clone(&self.events),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl CircuitBreaker<SystemClock> {
    /// Create a new circuit breaker with the given configuration using
    /// system clock
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(name, config, SystemClock)
    }

    /// Create a circuit breaker with default configuration (convenience
    /// method)
    pub fn with_defaults(name: impl Into<String>) -> Self {
        Self::new(name, CircuitBreakerConfig::default()).expect("Default config should be valid")
    }

    /// Create a circuit breaker using the builder pattern
    pub fn builder(name: impl Into<String>) -> CircuitBreakerBuilder<SystemClock> {
        CircuitBreakerBuilder::new(name)
    }
}

impl<C: Clock> CircuitBreaker<C> {
    /// Create a new circuit breaker with a custom clock (useful for testing)
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
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
        config: CircuitBreakerConfig,
        clock: Arc<C>,
        upstream: Arc<EventPublisher<CircuitBreakerEvent>>,
    ) -> Self {
        let events = EventPublisher::with_upstream(config.event_buffer_size, upstream);
        Self::assemble(name, config, clock, events)
    }

    fn assemble(
        name: String,
        config: CircuitBreakerConfig,
        clock: Arc<C>,
        events: EventPublisher<CircuitBreakerEvent>,
    ) -> Self {
        let window = SlidingWindow::new(config.sliding_window_size);
        Self {
            name,
            config,
            state: Arc::new(Mutex::new(StateInner::Closed { window })),
            total_successful: Arc::new(AtomicU64::new(0)),
            total_failed: Arc::new(AtomicU64::new(0)),
            not_permitted: Arc::new(AtomicU64::new(0)),
            max_buffered: Arc::new(AtomicU32::new(0)),
            events: Arc::new(events),
            clock,
        }
    }

    /// Name of this entity
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration this entity was built with
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Event log and live subscription feed of this entity
    pub fn events(&self) -> &EventPublisher<CircuitBreakerEvent> {
        &self.events
    }

    /// Get the current state of the circuit breaker
    pub fn state(&self) -> CircuitState {
        self.state.lock().kind()
    }

    /// Ask the breaker for permission to run one call
    ///
    /// Grants pass through CLOSED and DISABLED unconditionally. While OPEN,
    /// the first request after the open wait elapses moves the breaker to
    /// HALF_OPEN and takes the first trial permit. Rejections increment the
    /// not-permitted counter and emit a NOT_PERMITTED event.
    pub fn try_acquire_permission(&self) -> Result<(), CallRejected> {
        let mut state = self.state.lock();
        match &mut *state {
            StateInner::Closed { .. } | StateInner::Disabled => Ok(()),
            StateInner::Open { opened_at } => {
                let elapsed = self.clock.now().duration_since(*opened_at);
                if elapsed >= self.config.wait_duration_in_open_state {
                    let trial = self.config.permitted_calls_in_half_open as usize;
                    *state = StateInner::HalfOpen {
                        window: SlidingWindow::new(trial),
                        permits_issued: 1,
                    };
                    info!("Circuit breaker '{}' half-opened after {:?}", self.name, elapsed);
                    self.transition_event(CircuitState::Open, CircuitState::HalfOpen);
                    Ok(())
                } else {
                    self.reject(CircuitState::Open)
                }
            }
            StateInner::HalfOpen { permits_issued, .. } => {
                if *permits_issued < self.config.permitted_calls_in_half_open {
                    *permits_issued += 1;
                    Ok(())
                } else {
                    self.reject(CircuitState::HalfOpen)
                }
            }
            StateInner::ForcedOpen => self.reject(CircuitState::ForcedOpen),
        }
    }

    fn reject(&self, state: CircuitState) -> Result<(), CallRejected> {
        self.not_permitted.fetch_add(1, Ordering::Relaxed);
        debug!("Circuit breaker '{}' rejecting call - state: {}", self.name, state);
        self.publish(CircuitBreakerEventKind::NotPermitted);
        Err(CallRejected { name: self.name.clone(), state })
    }

    /// Record a successful call outcome
    ///
    /// The duration decides whether the call additionally counts as slow.
    pub fn on_success(&self, duration: Duration) {
        self.record_outcome(false, duration, None);
    }

    /// Record a failed call outcome
    ///
    /// The error is classified first: ignored errors bypass the breaker
    /// entirely, unmatched errors record as successes.
    pub fn on_error<E>(&self, duration: Duration, error: &E)
    where
        E: Error + 'static,
    {
        match self.config.classifier.classify(error) {
            Classification::Ignore => {
                debug!("Circuit breaker '{}' ignoring error: {}", self.name, error);
            }
            Classification::Matched => {
                self.record_outcome(true, duration, Some(error.to_string()));
            }
            Classification::Unmatched => self.record_outcome(false, duration, None),
        }
    }

    /// Execute a synchronous operation with circuit breaker protection
    ///
    /// Acquires permission, times the call via the entity clock and records
    /// its outcome. Rejected calls return without invoking the operation.
    #[instrument(skip(self, operation), fields(name = %self.name, state = %self.state()))]
    pub fn call<T, E, F>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: Error + Send + Sync + 'static,
    {
        self.try_acquire_permission()?;
        let started = self.clock.now();
        match operation() {
            Ok(value) => {
                self.on_success(self.clock.now().duration_since(started));
                Ok(value)
            }
            Err(error) => {
                self.on_error(self.clock.now().duration_since(started), &error);
                Err(ResilienceError::Operation { source: error })
            }
        }
    }

    /// Execute an async operation with circuit breaker protection
    #[instrument(skip(self, operation), fields(name = %self.name, state = %self.state()))]
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        self.try_acquire_permission()?;
        let started = self.clock.now();
        match operation().await {
            Ok(value) => {
                self.on_success(self.clock.now().duration_since(started));
                Ok(value)
            }
            Err(error) => {
                self.on_error(self.clock.now().duration_since(started), &error);
                Err(ResilienceError::Operation { source: error })
            }
        }
    }

    /// Manually move to CLOSED with a fresh window
    ///
    /// No-op when already closed.
    pub fn transition_to_closed(&self) {
        self.force_transition(StateInner::Closed {
            window: SlidingWindow::new(self.config.sliding_window_size),
        });
    }

    /// Manually move to OPEN, starting the open wait from now
    pub fn transition_to_open(&self) {
        self.force_transition(StateInner::Open { opened_at: self.clock.now() });
    }

    /// Manually move to DISABLED: always permit, record nothing
    pub fn transition_to_disabled(&self) {
        self.force_transition(StateInner::Disabled);
    }

    /// Manually move to FORCED_OPEN: always reject until cleared
    pub fn transition_to_forced_open(&self) {
        self.force_transition(StateInner::ForcedOpen);
    }

    /// Restore a pristine CLOSED breaker
    ///
    /// Clears the window and the lifetime counters. The event log is kept.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let from = state.kind();
        *state = StateInner::Closed {
            window: SlidingWindow::new(self.config.sliding_window_size),
        };
        self.total_successful.store(0, Ordering::Relaxed);
        self.total_failed.store(0, Ordering::Relaxed);
        self.not_permitted.store(0, Ordering::Relaxed);
        self.max_buffered.store(0, Ordering::Relaxed);
        info!("Circuit breaker '{}' reset", self.name);
        if from != CircuitState::Closed {
            self.transition_event(from, CircuitState::Closed);
        }
    }

    /// Get a snapshot of the breaker's health
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let state = self.state.lock();
        let mut snapshot = CircuitBreakerMetrics {
            state: state.kind(),
            buffered_calls: 0,
            max_buffered_calls: self.max_buffered.load(Ordering::Acquire),
            successful_calls: self.total_successful.load(Ordering::Acquire),
            failed_calls: self.total_failed.load(Ordering::Acquire),
            not_permitted_calls: self.not_permitted.load(Ordering::Acquire),
            failure_rate: -1.0,
            slow_call_rate: -1.0,
        };
        if let Some(window) = state.window() {
            snapshot.buffered_calls = window.len();
            let minimum = match state.kind() {
                CircuitState::HalfOpen => self.config.permitted_calls_in_half_open,
                _ => self.config.minimum_number_of_calls,
            };
            if window.len() >= minimum {
                snapshot.failure_rate = window.failure_rate();
                snapshot.slow_call_rate = window.slow_rate();
            }
        }
        snapshot
    }

    /// Record one outcome into the active window and evaluate transitions
    ///
    /// Outcomes arriving while OPEN, DISABLED or FORCED_OPEN are late
    /// completions of calls permitted under an earlier state; they are
    /// dropped without counters or events. The call event is published
    /// before any transition event produced by the same call.
    fn record_outcome(&self, failed: bool, duration: Duration, error: Option<String>) {
        let slow = duration > self.config.slow_call_duration_threshold;
        let mut state = self.state.lock();
        match &mut *state {
            StateInner::Closed { window } => {
                window.record(failed, slow);
                let buffered = window.len();
                let open = buffered >= self.config.minimum_number_of_calls
                    && self.rates_exceeded(window);
                self.max_buffered.fetch_max(buffered, Ordering::Relaxed);
                self.bump_totals(failed);
                self.call_event(failed, slow, duration, error);
                if open {
                    *state = StateInner::Open { opened_at: self.clock.now() };
                    warn!("Circuit breaker '{}' opened", self.name);
                    self.transition_event(CircuitState::Closed, CircuitState::Open);
                }
            }
            StateInner::HalfOpen { window, .. } => {
                window.record(failed, slow);
                let buffered = window.len();
                let decided = buffered == self.config.permitted_calls_in_half_open;
                let reopen = decided && self.rates_exceeded(window);
                self.max_buffered.fetch_max(buffered, Ordering::Relaxed);
                self.bump_totals(failed);
                self.call_event(failed, slow, duration, error);
                if decided {
                    if reopen {
                        *state = StateInner::Open { opened_at: self.clock.now() };
                        warn!("Circuit breaker '{}' reopened after failed trial", self.name);
                        self.transition_event(CircuitState::HalfOpen, CircuitState::Open);
                    } else {
                        *state = StateInner::Closed {
                            window: SlidingWindow::new(self.config.sliding_window_size),
                        };
                        info!("Circuit breaker '{}' closed after successful trial", self.name);
                        self.transition_event(CircuitState::HalfOpen, CircuitState::Closed);
                    }
                }
            }
            StateInner::Open { .. } | StateInner::Disabled | StateInner::ForcedOpen => {}
        }
    }

    fn rates_exceeded(&self, window: &SlidingWindow) -> bool {
        window.failure_rate() >= self.config.failure_rate_threshold
            || window.slow_rate() >= self.config.slow_call_rate_threshold
    }

    fn bump_totals(&self, failed: bool) {
        if failed {
            self.total_failed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_successful.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn force_transition(&self, target: StateInner) {
        let mut state = self.state.lock();
        let from = state.kind();
        let to = target.kind();
        if from == to {
            return;
        }
        *state = target;
        info!("Circuit breaker '{}' transitioned from {} to {}", self.name, from, to);
        self.transition_event(from, to);
    }

    fn call_event(&self, failed: bool, slow: bool, duration: Duration, error: Option<String>) {
        let kind = if slow {
            CircuitBreakerEventKind::SlowCall { duration, error }
        } else if failed {
            CircuitBreakerEventKind::Error { duration, error: error.unwrap_or_default() }
        } else {
            CircuitBreakerEventKind::Success { duration }
        };
        self.publish(kind);
    }

    fn transition_event(&self, from: CircuitState, to: CircuitState) {
        self.publish(CircuitBreakerEventKind::StateTransition { from, to });
    }

    fn publish(&self, kind: CircuitBreakerEventKind) {
        self.events.publish(CircuitBreakerEvent {
            name: self.name.clone(),
            timestamp: DateTime::<Utc>::from(self.clock.system_time()),
            kind,
        });
    }
}

/// Builder assembling a [`CircuitBreaker`] entity
///
/// Swapping in a custom clock with [`CircuitBreakerBuilder::clock`] changes
/// the entity's clock type; every other setter delegates to the
/// configuration builder.
#[derive(Debug)]
pub struct CircuitBreakerBuilder<C: Clock = SystemClock> {
    name: String,
    config: CircuitBreakerConfigBuilder,
    clock: C,
}

impl CircuitBreakerBuilder<SystemClock> {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), config: CircuitBreakerConfigBuilder::new(), clock: SystemClock }
    }
}

impl<C: Clock> CircuitBreakerBuilder<C> {
    /// Set a custom clock for the circuit breaker (useful for testing)
    pub fn clock<C2: Clock>(self, clock: C2) -> CircuitBreakerBuilder<C2> {
        CircuitBreakerBuilder { name: self.name, config: self.config, clock }
    }

    pub fn failure_rate_threshold(mut self, threshold: f32) -> Self {
        self.config = self.config.failure_rate_threshold(threshold);
        self
    }

    pub fn slow_call_rate_threshold(mut self, threshold: f32) -> Self {
        self.config = self.config.slow_call_rate_threshold(threshold);
        self
    }

    pub fn slow_call_duration_threshold(mut self, threshold: Duration) -> Self {
        self.config = self.config.slow_call_duration_threshold(threshold);
        self
    }

    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.config = self.config.sliding_window_size(size);
        self
    }

    pub fn minimum_number_of_calls(mut self, minimum: u32) -> Self {
        self.config = self.config.minimum_number_of_calls(minimum);
        self
    }

    pub fn wait_duration_in_open_state(mut self, wait: Duration) -> Self {
        self.config = self.config.wait_duration_in_open_state(wait);
        self
    }

    pub fn permitted_calls_in_half_open(mut self, permitted: u32) -> Self {
        self.config = self.config.permitted_calls_in_half_open(permitted);
        self
    }

    pub fn classifier(mut self, classifier: crate::classify::Classifier) -> Self {
        self.config = self.config.classifier(classifier);
        self
    }

    pub fn record_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.config = self.config.record_on(predicate);
        self
    }

    pub fn record_on_type<T: Error + 'static>(mut self) -> Self {
        self.config = self.config.record_on_type::<T>();
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

    pub fn event_buffer_size(mut self, capacity: usize) -> Self {
        self.config = self.config.event_buffer_size(capacity);
        self
    }

    pub fn build(self) -> ConfigResult<CircuitBreaker<C>> {
        CircuitBreaker::with_clock(self.name, self.config.build()?, self.clock)
    }
}
