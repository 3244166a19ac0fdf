use crate::{CircuitBreaker, CircuitBreakerConfig};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Process-wide map from resource key to its circuit.
///
/// The map lock is held only to look up or insert an entry; state changes
/// happen under each circuit's own lock.
pub struct CircuitBreakerRegistry {
    config: Arc<CircuitBreakerConfig>,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry whose circuits share `config`.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config: Arc::new(config),
            breakers: RwLock::new(HashMap::new()),
        }
    }

    /// The configuration every circuit in this registry uses.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the circuit for `resource`, creating a closed one on first use.
    pub fn get_or_create(&self, resource: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(resource) {
            return existing;
        }

        let mut breakers = self.breakers.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(breakers.entry(resource.to_string()).or_insert_with(|| {
            tracing::debug!(resource, "creating circuit");
            Arc::new(CircuitBreaker::new(resource, Arc::clone(&self.config)))
        }))
    }

    /// Returns the circuit for `resource` if one has been created.
    pub fn get(&self, resource: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }

    /// Keys of every circuit created so far.
    pub fn resource_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("config", &self.config)
            .field("resources", &self.resource_keys())
            .finish()
    }
}
