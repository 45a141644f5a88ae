//! Named entity registries with a merged event view.
//!
//! A registry maps a name to a singleton resilience entity, creating the
//! entity on first lookup from a registry-wide default configuration. All
//! entities created through a registry forward their events into one merged
//! publisher, so a single snapshot or subscription covers every instance.
//!
//! Entities are cheap clones sharing their internal state: two lookups under
//! the same name observe the same metrics, event log and (for circuit
//! breakers) state machine.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::info;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::clock::{Clock, SystemClock};
use crate::error::ConfigResult;
use crate::events::{CircuitBreakerEvent, EventPublisher, RetryEvent};
use crate::retry::{Retry, RetryConfig};

/// Get-or-create cache of named [`Retry`] instances.
pub struct RetryRegistry<C: Clock = SystemClock> {
    default_config: RetryConfig,
    entries: RwLock<HashMap<String, Retry<C>>>,
    merged: Arc<EventPublisher<RetryEvent>>,
    clock: Arc<C>,
}

impl RetryRegistry<SystemClock> {
    /// Create a registry whose entities are built from the given default
    /// configuration
    pub fn new(default_config: RetryConfig) -> ConfigResult<Self> {
        Self::with_clock(default_config, SystemClock)
    }

    /// Create a registry with default configuration (convenience method)
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default()).expect("Default config should be valid")
    }
}

impl Default for RetryRegistry<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> RetryRegistry<C> {
    /// Create a registry with a custom clock shared by all of its entities
    /// (useful for testing)
    pub fn with_clock(default_config: RetryConfig, clock: C) -> ConfigResult<Self> {
        default_config.validate()?;
        let merged = Arc::new(EventPublisher::new(default_config.event_buffer_size));
        Ok(Self {
            default_config,
            entries: RwLock::new(HashMap::new()),
            merged,
            clock: Arc::new(clock),
        })
    }

    /// Look up a retry by name, creating it from the registry default
    /// configuration on first access
    pub fn get_or_create(&self, name: &str) -> Retry<C> {
        if let Some(existing) = self.entries.read().get(name) {
            return existing.clone();
        }
        self.create_if_absent(name, self.default_config.clone())
    }

    /// Look up a retry by name, creating it from the given configuration
    ///
    /// The configuration applies only when the name is not yet registered;
    /// later callers receive the instance created first.
    pub fn get_or_create_with(&self, name: &str, config: RetryConfig) -> ConfigResult<Retry<C>> {
        config.validate()?;
        if let Some(existing) = self.entries.read().get(name) {
            return Ok(existing.clone());
        }
        Ok(self.create_if_absent(name, config))
    }

    fn create_if_absent(&self, name: &str, config: RetryConfig) -> Retry<C> {
        let mut entries = self.entries.write();
        entries
            .entry(name.to_string())
            .or_insert_with_key(|key| {
                info!("Registering retry '{}'", key);
                Retry::with_upstream_events(
                    key.clone(),
                    config,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.merged),
                )
            })
            .clone()
    }

    /// Look up a retry without creating it
    pub fn get(&self, name: &str) -> Option<Retry<C>> {
        self.entries.read().get(name).cloned()
    }

    /// Remove a retry from the registry, returning it if present
    ///
    /// Outstanding clones keep working; the next lookup under the same name
    /// creates a fresh instance.
    pub fn remove(&self, name: &str) -> Option<Retry<C>> {
        let removed = self.entries.write().remove(name);
        if removed.is_some() {
            info!("Removed retry '{}' from registry", name);
        }
        removed
    }

    /// Snapshot of every registered retry
    pub fn entities(&self) -> Vec<Retry<C>> {
        self.entries.read().values().cloned().collect()
    }

    /// Snapshot of the merged event log across all registered retries
    pub fn events(&self) -> Vec<RetryEvent> {
        self.merged.events()
    }

    /// Subscribe to live events from every registered retry
    pub fn subscribe(&self) -> broadcast::Receiver<RetryEvent> {
        self.merged.subscribe()
    }

    /// Number of registered retries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry holds no entities
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Get-or-create cache of named [`CircuitBreaker`] instances.
pub struct CircuitBreakerRegistry<C: Clock = SystemClock> {
    default_config: CircuitBreakerConfig,
    entries: RwLock<HashMap<String, CircuitBreaker<C>>>,
    merged: Arc<EventPublisher<CircuitBreakerEvent>>,
    clock: Arc<C>,
}

impl CircuitBreakerRegistry<SystemClock> {
    /// Create a registry whose entities are built from the given default
    /// configuration
    pub fn new(default_config: CircuitBreakerConfig) -> ConfigResult<Self> {
        Self::with_clock(default_config, SystemClock)
    }

    /// Create a registry with default configuration (convenience method)
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default()).expect("Default config should be valid")
    }
}

impl Default for CircuitBreakerRegistry<SystemClock> {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl<C: Clock> CircuitBreakerRegistry<C> {
    /// Create a registry with a custom clock shared by all of its entities
    /// (useful for testing)
    pub fn with_clock(default_config: CircuitBreakerConfig, clock: C) -> ConfigResult<Self> {
        default_config.validate()?;
        let merged = Arc::new(EventPublisher::new(default_config.event_buffer_size));
        Ok(Self {
            default_config,
            entries: RwLock::new(HashMap::new()),
            merged,
            clock: Arc::new(clock),
        })
    }

    /// Look up a circuit breaker by name, creating it from the registry
    /// default configuration on first access
    pub fn get_or_create(&self, name: &str) -> CircuitBreaker<C> {
        if let Some(existing) = self.entries.read().get(name) {
            return existing.clone();
        }
        self.create_if_absent(name, self.default_config.clone())
    }

    /// Look up a circuit breaker by name, creating it from the given
    /// configuration
    ///
    /// The configuration applies only when the name is not yet registered;
    /// later callers receive the instance created first.
    pub fn get_or_create_with(
        &self,
        name: &str,
        config: CircuitBreakerConfig,
    ) -> ConfigResult<CircuitBreaker<C>> {
        config.validate()?;
        if let Some(existing) = self.entries.read().get(name) {
            return Ok(existing.clone());
        }
        Ok(self.create_if_absent(name, config))
    }

    fn create_if_absent(&self, name: &str, config: CircuitBreakerConfig) -> CircuitBreaker<C> {
        let mut entries = self.entries.write();
        entries
            .entry(name.to_string())
            .or_insert_with_key(|key| {
                info!("Registering circuit breaker '{}'", key);
                CircuitBreaker::with_upstream_events(
                    key.clone(),
                    config,
                    Arc::clone(&self.clock),
                    Arc::clone(&self.merged),
                )
            })
            .clone()
    }

    /// Look up a circuit breaker without creating it
    pub fn get(&self, name: &str) -> Option<CircuitBreaker<C>> {
        self.entries.read().get(name).cloned()
    }

    /// Remove a circuit breaker from the registry, returning it if present
    ///
    /// Outstanding clones keep working; the next lookup under the same name
    /// creates a fresh instance.
    pub fn remove(&self, name: &str) -> Option<CircuitBreaker<C>> {
        let removed = self.entries.write().remove(name);
        if removed.is_some() {
            info!("Removed circuit breaker '{}' from registry", name);
        }
        removed
    }

    /// Snapshot of every registered circuit breaker
    pub fn entities(&self) -> Vec<CircuitBreaker<C>> {
        self.entries.read().values().cloned().collect()
    }

    /// Snapshot of the merged event log across all registered circuit
    /// breakers
    pub fn events(&self) -> Vec<CircuitBreakerEvent> {
        self.merged.events()
    }

    /// Subscribe to live events from every registered circuit breaker
    pub fn subscribe(&self) -> broadcast::Receiver<CircuitBreakerEvent> {
        self.merged.subscribe()
    }

    /// Number of registered circuit breakers
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the registry holds no entities
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
