//! Circuit breaker configuration and builder

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use crate::classify::{type_matcher, Classifier};
use crate::error::{ConfigError, ConfigResult};

/// Configuration for circuit breaker behavior
///
/// Rates are percentages in `(0, 100]`. A call counts as slow when its
/// duration strictly exceeds `slow_call_duration_threshold`; slow successes
/// count toward the slow-call rate but not the failure rate. Errors are
/// classified through `classifier`: ignored errors bypass the breaker
/// entirely, unmatched errors record as successes.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failure rate (%) at or above which the breaker opens
    pub failure_rate_threshold: f32,
    /// Slow-call rate (%) at or above which the breaker opens
    pub slow_call_rate_threshold: f32,
    /// Duration above which a call counts as slow
    pub slow_call_duration_threshold: Duration,
    /// Number of recent call outcomes kept in the closed-state window
    pub sliding_window_size: usize,
    /// Buffered outcomes required before rates are evaluated
    pub minimum_number_of_calls: u32,
    /// How long the breaker stays open before probing again
    pub wait_duration_in_open_state: Duration,
    /// Trial calls permitted while half-open
    pub permitted_calls_in_half_open: u32,
    /// Decides which errors are recorded, ignored or success-equivalent
    pub classifier: Classifier,
    /// Capacity of the entity's buffered event log
    pub event_buffer_size: usize,
}

impl CircuitBreakerConfig {
    /// Create a builder starting from the defaults
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err(ConfigError::Invalid {
                message: "failure_rate_threshold must be between 0 and 100".to_string(),
            });
        }
        if !(self.slow_call_rate_threshold > 0.0 && self.slow_call_rate_threshold <= 100.0) {
            return Err(ConfigError::Invalid {
                message: "slow_call_rate_threshold must be between 0 and 100".to_string(),
            });
        }
        if self.sliding_window_size == 0 {
            return Err(ConfigError::Invalid {
                message: "sliding_window_size must be at least 1".to_string(),
            });
        }
        if self.minimum_number_of_calls == 0 {
            return Err(ConfigError::Invalid {
                message: "minimum_number_of_calls must be at least 1".to_string(),
            });
        }
        if self.minimum_number_of_calls as usize > self.sliding_window_size {
            return Err(ConfigError::Invalid {
                message: "minimum_number_of_calls must not exceed sliding_window_size".to_string(),
            });
        }
        if self.wait_duration_in_open_state.is_zero() {
            return Err(ConfigError::Invalid {
                message: "wait_duration_in_open_state must be positive".to_string(),
            });
        }
        if self.permitted_calls_in_half_open == 0 {
            return Err(ConfigError::Invalid {
                message: "permitted_calls_in_half_open must be at least 1".to_string(),
            });
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                message: "event_buffer_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            slow_call_rate_threshold: 100.0,
            slow_call_duration_threshold: Duration::from_secs(60),
            sliding_window_size: 100,
            minimum_number_of_calls: 100,
            wait_duration_in_open_state: Duration::from_secs(60),
            permitted_calls_in_half_open: 10,
            classifier: Classifier::new(),
            event_buffer_size: 100,
        }
    }
}

/// Fluent builder for [`CircuitBreakerConfig`]
#[derive(Debug, Default)]
pub struct CircuitBreakerConfigBuilder {
    config: CircuitBreakerConfig,
}

impl CircuitBreakerConfigBuilder {
    /// Create a builder starting from the defaults
    pub fn new() -> Self {
        Self { config: CircuitBreakerConfig::default() }
    }

    /// Set the failure rate (%) at or above which the breaker opens
    pub fn failure_rate_threshold(mut self, threshold: f32) -> Self {
        self.config.failure_rate_threshold = threshold;
        self
    }

    /// Set the slow-call rate (%) at or above which the breaker opens
    pub fn slow_call_rate_threshold(mut self, threshold: f32) -> Self {
        self.config.slow_call_rate_threshold = threshold;
        self
    }

    /// Set the duration above which a call counts as slow
    pub fn slow_call_duration_threshold(mut self, threshold: Duration) -> Self {
        self.config.slow_call_duration_threshold = threshold;
        self
    }

    /// Set the closed-state sliding window size
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.config.sliding_window_size = size;
        self
    }

    /// Set the buffered outcomes required before rates are evaluated
    pub fn minimum_number_of_calls(mut self, minimum: u32) -> Self {
        self.config.minimum_number_of_calls = minimum;
        self
    }

    /// Set how long the breaker stays open before probing again
    pub fn wait_duration_in_open_state(mut self, wait: Duration) -> Self {
        self.config.wait_duration_in_open_state = wait;
        self
    }

    /// Set the trial calls permitted while half-open
    pub fn permitted_calls_in_half_open(mut self, permitted: u32) -> Self {
        self.config.permitted_calls_in_half_open = permitted;
        self
    }

    /// Replace the classifier wholesale
    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.config.classifier = classifier;
        self
    }

    /// Record only errors satisfying the predicate as failures
    pub fn record_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.config.classifier.matches = Some(Arc::new(predicate));
        self
    }

    /// Record only errors of the given concrete type as failures
    pub fn record_on_type<T: Error + 'static>(mut self) -> Self {
        self.config.classifier.matches = Some(type_matcher::<T>());
        self
    }

    /// Exclude errors satisfying the predicate from breaker accounting
    pub fn ignore<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.config.classifier.ignores = Some(Arc::new(predicate));
        self
    }

    /// Exclude errors of the given concrete type from breaker accounting
    pub fn ignore_type<T: Error + 'static>(mut self) -> Self {
        self.config.classifier.ignores = Some(type_matcher::<T>());
        self
    }

    /// Set the capacity of the buffered event log
    pub fn event_buffer_size(mut self, capacity: usize) -> Self {
        self.config.event_buffer_size = capacity;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> ConfigResult<CircuitBreakerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
