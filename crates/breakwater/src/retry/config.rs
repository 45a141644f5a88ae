//! Retry configuration and builder

use std::error::Error;
use std::fmt;
use std::sync::Arc;

use crate::classify::{erase_result_predicate, type_matcher, Classifier, ResultPredicate};
use crate::error::{ConfigError, ConfigResult};

use super::backoff::{BackoffStrategy, Jitter};

/// Configuration for retry behavior
///
/// `max_attempts` counts every invocation including the first, so a value of
/// 3 allows at most two retries. Failures are classified through
/// `classifier`; an optional `retry_on_result` predicate additionally treats
/// matching success values as retryable outcomes.
#[derive(Clone)]
pub struct RetryConfig {
    /// Maximum number of invocations including the initial attempt
    pub max_attempts: u32,
    /// Strategy producing the wait before each retry
    pub backoff: BackoffStrategy,
    /// Jitter applied on top of the calculated wait
    pub jitter: Jitter,
    /// Decides which errors are retried, ignored or terminal
    pub classifier: Classifier,
    /// Treats matching success values as retryable outcomes
    pub retry_on_result: Option<ResultPredicate>,
    /// Capacity of the entity's buffered event log
    pub event_buffer_size: usize,
}

impl RetryConfig {
    /// Create a builder starting from the defaults
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                message: "max_attempts must be at least 1".to_string(),
            });
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                message: "event_buffer_size must be at least 1".to_string(),
            });
        }
        if let BackoffStrategy::Exponential { initial_delay, base, max_delay } = self.backoff {
            if base < 1.0 {
                return Err(ConfigError::Invalid {
                    message: "exponential backoff base must be at least 1.0".to_string(),
                });
            }
            if initial_delay > max_delay {
                return Err(ConfigError::Invalid {
                    message: "exponential backoff initial_delay must not exceed max_delay"
                        .to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::default(),
            jitter: Jitter::None,
            classifier: Classifier::new(),
            retry_on_result: None,
            event_buffer_size: 100,
        }
    }
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("classifier", &self.classifier)
            .field("retry_on_result", &self.retry_on_result.as_ref().map(|_| "<predicate>"))
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

/// Fluent builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    /// Create a builder starting from the defaults
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    /// Set the maximum number of invocations including the initial attempt
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    /// Set the backoff strategy
    pub fn backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set the jitter applied to calculated waits
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Replace the classifier wholesale
    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.config.classifier = classifier;
        self
    }

    /// Retry only errors satisfying the predicate
    pub fn retry_on<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.config.classifier.matches = Some(Arc::new(predicate));
        self
    }

    /// Retry only errors of the given concrete type
    pub fn retry_on_type<T: Error + 'static>(mut self) -> Self {
        self.config.classifier.matches = Some(type_matcher::<T>());
        self
    }

    /// Propagate errors satisfying the predicate without retrying
    pub fn ignore<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&(dyn Error + 'static)) -> bool + Send + Sync + 'static,
    {
        self.config.classifier.ignores = Some(Arc::new(predicate));
        self
    }

    /// Propagate errors of the given concrete type without retrying
    pub fn ignore_type<T: Error + 'static>(mut self) -> Self {
        self.config.classifier.ignores = Some(type_matcher::<T>());
        self
    }

    /// Retry success values of type `T` satisfying the predicate
    ///
    /// Values of any other type never match, so the predicate is inert when
    /// the entity wraps calls returning a different result type.
    pub fn retry_on_result<T, P>(mut self, predicate: P) -> Self
    where
        T: 'static,
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.config.retry_on_result = Some(erase_result_predicate::<T, P>(predicate));
        self
    }

    /// Set the capacity of the buffered event log
    pub fn event_buffer_size(mut self, capacity: usize) -> Self {
        self.config.event_buffer_size = capacity;
        self
    }

    /// Validate and build the configuration
    pub fn build(self) -> ConfigResult<RetryConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::classify::Classification;

    #[derive(Debug, thiserror::Error)]
    #[error("transient")]
    struct TransientError;

    #[derive(Debug, thiserror::Error)]
    #[error("fatal")]
    struct FatalError;

    /// Validates `RetryConfig::default` behavior for the baseline scenario.
    ///
    /// Assertions:
    /// - Confirms the defaults pass validation.
    /// - Confirms three attempts and a 100-event buffer are the defaults.
    #[test]
    fn test_default_config_is_valid() {
        let config = RetryConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.event_buffer_size, 100);
        assert!(config.retry_on_result.is_none());
    }

    /// Validates `RetryConfig::validate` behavior for the zero attempts
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a zero `max_attempts` is rejected with a pointed message.
    #[test]
    fn test_zero_max_attempts_rejected() {
        let result = RetryConfig::builder().max_attempts(0).build();

        let message = result.unwrap_err().to_string();
        assert!(message.contains("max_attempts must be at least 1"));
    }

    /// Validates `RetryConfig::validate` behavior for the degenerate
    /// exponential backoff scenario.
    ///
    /// Assertions:
    /// - Confirms a base below 1.0 is rejected.
    /// - Confirms an initial delay above the cap is rejected.
    #[test]
    fn test_invalid_exponential_backoff_rejected() {
        let shrinking = RetryConfig::builder()
            .backoff(BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 0.5,
                max_delay: Duration::from_secs(10),
            })
            .build();
        assert!(shrinking.is_err());

        let inverted = RetryConfig::builder()
            .backoff(BackoffStrategy::Exponential {
                initial_delay: Duration::from_secs(20),
                base: 2.0,
                max_delay: Duration::from_secs(10),
            })
            .build();
        assert!(inverted.is_err());
    }

    /// Validates `RetryConfig::validate` behavior for the zero buffer
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms a zero `event_buffer_size` is rejected.
    #[test]
    fn test_zero_event_buffer_rejected() {
        let result = RetryConfig::builder().event_buffer_size(0).build();

        assert!(result.is_err());
    }

    /// Validates `RetryConfigBuilder` behavior for the full assembly
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms every builder setter lands in the built configuration.
    #[test]
    fn test_builder_assembles_config() {
        let config = RetryConfig::builder()
            .max_attempts(5)
            .backoff(BackoffStrategy::Linear {
                initial_delay: Duration::from_millis(50),
                increment: Duration::from_millis(25),
            })
            .jitter(Jitter::Full)
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.jitter, Jitter::Full);
        assert_eq!(config.event_buffer_size, 16);
        assert!(matches!(config.backoff, BackoffStrategy::Linear { .. }));
    }

    /// Validates `RetryConfigBuilder` behavior for the type-based predicate
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms `retry_on_type` restricts matching to the named type.
    /// - Confirms `ignore_type` takes precedence over matching.
    #[test]
    fn test_builder_type_predicates() {
        let config = RetryConfig::builder()
            .retry_on_type::<TransientError>()
            .ignore_type::<FatalError>()
            .build()
            .unwrap();

        assert_eq!(config.classifier.classify(&TransientError), Classification::Matched);
        assert_eq!(config.classifier.classify(&FatalError), Classification::Ignore);
        assert_eq!(
            config.classifier.classify(&std::io::Error::other("other")),
            Classification::Unmatched
        );
    }

    /// Validates `RetryConfigBuilder::retry_on_result` behavior for the
    /// typed predicate scenario.
    ///
    /// Assertions:
    /// - Confirms the installed predicate matches values of its type only.
    #[test]
    fn test_builder_result_predicate() {
        let config = RetryConfig::builder()
            .retry_on_result::<u32, _>(|status| *status == 503)
            .build()
            .unwrap();

        let predicate = config.retry_on_result.unwrap();
        assert!(predicate(&503u32));
        assert!(!predicate(&200u32));
        assert!(!predicate(&"503"));
    }
}
