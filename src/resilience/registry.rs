//! Circuit registry.
//!
//! One breaker per command, created on first use with the process-wide
//! configuration and kept for the life of the registry. The registry is an
//! owned value handed to the dispatcher, not a global.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::CircuitBreakerConfig;
use crate::resilience::circuit_breaker::{BreakerConfigError, CircuitBreaker};

#[derive(Debug)]
pub struct CircuitRegistry {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitRegistry {
    /// Fails if the shared configuration is structurally invalid.
    pub fn new(config: CircuitBreakerConfig) -> Result<Self, BreakerConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            breakers: DashMap::new(),
        })
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Breaker for `command`, creating it on first lookup.
    ///
    /// Concurrent first lookups all receive the same instance: the fast path
    /// is a shared read, the slow path creates under the shard's write lock.
    pub fn get_or_create(&self, command: &str) -> Result<Arc<CircuitBreaker>, BreakerConfigError> {
        if let Some(breaker) = self.breakers.get(command) {
            return Ok(breaker.clone());
        }

        let entry = self
            .breakers
            .entry(command.to_owned())
            .or_try_insert_with(|| {
                CircuitBreaker::new(command, self.config.clone()).map(Arc::new)
            })?;
        Ok(entry.clone())
    }

    pub fn get(&self, command: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(command).map(|b| b.clone())
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}
