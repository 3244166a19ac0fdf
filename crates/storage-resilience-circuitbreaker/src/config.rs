use crate::circuit::CircuitState;
use crate::events::CircuitBreakerEvent;
use std::sync::Arc;
use std::time::Duration;
use storage_resilience_core::{EventListener, EventListeners, FnListener, SharedClock, TokioClock};

/// Configuration shared by every circuit in a registry.
pub struct CircuitBreakerConfig {
    pub(crate) failure_threshold: u32,
    pub(crate) reset_timeout: Duration,
    pub(crate) count_unknown_failures: bool,
    pub(crate) clock: SharedClock,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Consecutive failures that trip a CLOSED circuit.
    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// How long an OPEN circuit waits before admitting a probe.
    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }

    /// Whether unclassifiable failures count toward the threshold.
    pub fn count_unknown_failures(&self) -> bool {
        self.count_unknown_failures
    }

    /// Attaches another listener to an already built configuration.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<CircuitBreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        CircuitBreakerConfigBuilder::new().build()
    }
}

impl std::fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("count_unknown_failures", &self.count_unknown_failures)
            .field("listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    failure_threshold: u32,
    reset_timeout: Duration,
    count_unknown_failures: bool,
    clock: SharedClock,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreakerConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(30),
            count_unknown_failures: false,
            clock: Arc::new(TokioClock),
            event_listeners: EventListeners::new(),
        }
    }

    /// Sets how many consecutive failures open the circuit.
    ///
    /// A threshold of zero is treated as one.
    ///
    /// Default: 5
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    /// Sets how long the circuit stays OPEN before a probe call is allowed.
    ///
    /// Default: 30 seconds
    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Counts `Unknown`-category failures toward the threshold.
    ///
    /// Default: false
    pub fn count_unknown_failures(mut self, enabled: bool) -> Self {
        self.count_unknown_failures = enabled;
        self
    }

    /// Replaces the time source.
    ///
    /// Default: [`TokioClock`]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an arbitrary listener for every circuit event.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<CircuitBreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback for state transitions.
    ///
    /// Called with the resource key, the previous state and the new state.
    ///
    /// ```rust
    /// use storage_resilience_circuitbreaker::{CircuitBreakerConfig, CircuitState};
    ///
    /// let config = CircuitBreakerConfig::builder()
    ///     .on_state_transition(|resource, from, to| {
    ///         if to == CircuitState::Open {
    ///             eprintln!("{resource}: circuit opened (was {from})");
    ///         }
    ///     })
    ///     .build();
    /// # let _ = config;
    /// ```
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    resource,
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(resource, *from_state, *to_state);
                }
            }));
        self
    }

    /// Registers a callback for calls rejected by an open circuit.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::CallRejected { resource, .. } = event {
                    f(resource);
                }
            }));
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            reset_timeout: self.reset_timeout,
            count_unknown_failures: self.count_unknown_failures,
            clock: self.clock,
            event_listeners: self.event_listeners,
        }
    }
}
