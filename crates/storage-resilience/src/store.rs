//! The single entry point for resilient storage calls.

use crate::response::{CallerResult, OperationKind, ResponseMapper};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use storage_resilience_circuitbreaker::{
    CircuitBreakerConfig, CircuitBreakerEvent, CircuitBreakerRegistry, CircuitMetrics,
    CircuitState,
};
use storage_resilience_core::{
    EventListener, EventListeners, FnListener, Notification, Outcome,
};
use storage_resilience_degraded::{DegradedConfig, DegradedModeMonitor, RecoveryProbe};
use storage_resilience_fallback::{Fallback, FallbackCoordinator, FallbackEvent};
use storage_resilience_retry::{Operation, RetryEvent, RetryExecutor, RetryPolicy};
use tokio_util::sync::CancellationToken;

/// Per-call options for [`ResilientStore::execute`].
pub struct ExecuteOptions<T> {
    policy: Option<RetryPolicy>,
    fallback: Fallback<T>,
    cancel: Option<CancellationToken>,
}

impl<T> ExecuteOptions<T> {
    /// Store defaults: default policy, no fallback, no cancellation.
    pub fn new() -> Self {
        Self {
            policy: None,
            fallback: Fallback::None,
            cancel: None,
        }
    }

    /// Overrides the store's default retry policy for this call.
    pub fn policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets the fallback source for this call.
    pub fn fallback(mut self, fallback: Fallback<T>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Ties the call to a cancellation token.
    pub fn cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl<T> Default for ExecuteOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ExecuteOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecuteOptions")
            .field("policy", &self.policy)
            .field("fallback", &self.fallback)
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Resilient access to any number of storage resources.
///
/// Holds the process-wide circuit and degraded-mode state, keyed by
/// resource. Share one store per process, typically behind an `Arc`.
///
/// ```rust
/// use storage_resilience::{ExecuteOptions, Operation, ResilientStore};
///
/// # async fn example() {
/// let store = ResilientStore::builder().build();
/// let outcome = store
///     .execute(
///         "primary-db",
///         Operation::idempotent(|| async { Ok::<_, std::io::Error>(1) }),
///         ExecuteOptions::new(),
///     )
///     .await;
/// assert!(outcome.is_success());
/// # }
/// ```
pub struct ResilientStore {
    registry: CircuitBreakerRegistry,
    monitor: Arc<DegradedModeMonitor>,
    executor: RetryExecutor,
    coordinator: FallbackCoordinator,
    default_policy: RetryPolicy,
    mapper: ResponseMapper,
}

impl ResilientStore {
    /// Creates a builder with the documented defaults.
    pub fn builder() -> ResilientStoreBuilder {
        ResilientStoreBuilder::new()
    }

    /// Runs `operation` against `resource` with retries, circuit breaking
    /// and the configured fallback.
    pub async fn execute<F, Fut, T, E>(
        &self,
        resource: &str,
        operation: Operation<F>,
        options: ExecuteOptions<T>,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        T: Clone + Send + 'static,
    {
        let ExecuteOptions {
            policy,
            fallback,
            cancel,
        } = options;
        let policy = policy.as_ref().unwrap_or(&self.default_policy);
        let cancel = cancel.unwrap_or_default();
        let breaker = self.registry.get_or_create(resource);

        let primary = self.executor.execute(operation, policy, &breaker, &cancel);
        self.coordinator
            .with_fallback(resource, primary, fallback)
            .await
    }

    /// Whether `resource` is currently in degraded mode.
    pub fn is_degraded(&self, resource: &str) -> bool {
        self.monitor.is_degraded(resource)
    }

    /// Current circuit state of `resource`; CLOSED if never used.
    pub fn circuit_state(&self, resource: &str) -> CircuitState {
        self.registry
            .get(resource)
            .map_or(CircuitState::Closed, |breaker| breaker.state())
    }

    /// Snapshot of the circuit for `resource`, if it has been used.
    pub fn circuit_metrics(&self, resource: &str) -> Option<CircuitMetrics> {
        self.registry.get(resource).map(|breaker| breaker.metrics())
    }

    /// Maps an outcome to what the caller should see.
    pub fn to_caller_result<T>(&self, outcome: &Outcome<T>, kind: OperationKind) -> CallerResult {
        self.mapper.to_caller_result(outcome, kind)
    }

    /// The circuit breaker registry.
    pub fn registry(&self) -> &CircuitBreakerRegistry {
        &self.registry
    }

    /// The degraded-mode monitor.
    pub fn monitor(&self) -> &Arc<DegradedModeMonitor> {
        &self.monitor
    }

    /// The policy used when a call does not bring its own.
    pub fn default_policy(&self) -> &RetryPolicy {
        &self.default_policy
    }

    /// Stops every recovery probe.
    pub fn shutdown(&self) {
        tracing::debug!("stopping recovery probes");
        self.monitor.shutdown();
    }
}

impl Default for ResilientStore {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for ResilientStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientStore")
            .field("registry", &self.registry)
            .field("monitor", &self.monitor)
            .field("default_policy", &self.default_policy)
            .finish()
    }
}

/// Builder for [`ResilientStore`].
pub struct ResilientStoreBuilder {
    policy: RetryPolicy,
    circuit: CircuitBreakerConfig,
    degraded: DegradedConfig,
    probes: Vec<(String, Box<dyn RegisterProbe>)>,
    sinks: EventListeners<Notification>,
    executor: RetryExecutor,
    fallback_listeners: EventListeners<FallbackEvent>,
    pass_through_answered: bool,
}

/// Type-erased probe waiting to be registered on the monitor.
trait RegisterProbe: Send {
    fn register(self: Box<Self>, resource: String, monitor: &DegradedModeMonitor);
}

impl<P: RecoveryProbe + 'static> RegisterProbe for P {
    fn register(self: Box<Self>, resource: String, monitor: &DegradedModeMonitor) {
        monitor.register_probe(resource, *self);
    }
}

impl ResilientStoreBuilder {
    /// Creates a builder with the documented defaults.
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            circuit: CircuitBreakerConfig::default(),
            degraded: DegradedConfig::default(),
            probes: Vec::new(),
            sinks: EventListeners::new(),
            executor: RetryExecutor::new(),
            fallback_listeners: EventListeners::new(),
            pass_through_answered: false,
        }
    }

    /// Sets the default retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the circuit breaker configuration shared by every resource.
    pub fn circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit = config;
        self
    }

    /// Sets the degraded-mode configuration.
    pub fn degraded(mut self, config: DegradedConfig) -> Self {
        self.degraded = config;
        self
    }

    /// Registers the recovery probe for `resource`.
    ///
    /// A resource without a probe still enters degraded mode, but only
    /// leaves it when a later primary call succeeds.
    pub fn recovery_probe<P>(mut self, resource: impl Into<String>, probe: P) -> Self
    where
        P: RecoveryProbe + 'static,
    {
        self.probes.push((resource.into(), Box::new(probe)));
        self
    }

    /// Registers a notification sink (alerting, paging).
    pub fn notification_sink<L>(mut self, sink: L) -> Self
    where
        L: EventListener<Notification> + 'static,
    {
        self.sinks.add(sink);
        self
    }

    /// Registers a callback for every notification.
    pub fn on_notification<F>(self, f: F) -> Self
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.notification_sink(FnListener::new(move |n: &Notification| f(n)))
    }

    /// Registers a listener for retry events.
    pub fn retry_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RetryEvent> + 'static,
    {
        self.executor = self.executor.with_listener(listener);
        self
    }

    /// Registers a listener for fallback events.
    pub fn fallback_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<FallbackEvent> + 'static,
    {
        self.fallback_listeners.add(listener);
        self
    }

    /// Returns Query and Transaction failures to the caller as they are,
    /// skipping the fallback and degraded mode for them.
    pub fn pass_through_answered_failures(mut self) -> Self {
        self.pass_through_answered = true;
        self
    }

    /// Builds the store.
    pub fn build(self) -> ResilientStore {
        let Self {
            policy,
            mut circuit,
            mut degraded,
            probes,
            sinks,
            executor,
            fallback_listeners,
            pass_through_answered,
        } = self;

        if !sinks.is_empty() {
            let circuit_sinks = sinks.clone();
            circuit.add_listener(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    resource,
                    to_state: CircuitState::Open,
                    ..
                } = event
                {
                    circuit_sinks.emit(&Notification::circuit_opened(resource));
                }
            }));
            degraded.add_listener(FnListener::new(move |n: &Notification| sinks.emit(n)));
        }

        tracing::debug!(
            max_attempts = policy.max_attempts(),
            failure_threshold = circuit.failure_threshold(),
            reset_timeout = ?circuit.reset_timeout(),
            probes = probes.len(),
            "building resilient store"
        );

        let mapper = ResponseMapper::new(circuit.reset_timeout());
        let monitor = Arc::new(DegradedModeMonitor::new(degraded));
        for (resource, probe) in probes {
            probe.register(resource, &monitor);
        }

        let mut coordinator = FallbackCoordinator::new(Arc::clone(&monitor));
        if pass_through_answered {
            coordinator = coordinator.pass_through_answered_failures();
        }
        if !fallback_listeners.is_empty() {
            coordinator = coordinator.with_listener(FnListener::new(
                move |event: &FallbackEvent| fallback_listeners.emit(event),
            ));
        }

        ResilientStore {
            registry: CircuitBreakerRegistry::new(circuit),
            monitor,
            executor,
            coordinator,
            default_policy: policy,
            mapper,
        }
    }
}

impl Default for ResilientStoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResilientStoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientStoreBuilder")
            .field("policy", &self.policy)
            .field("circuit", &self.circuit)
            .field("degraded", &self.degraded)
            .field("probes", &self.probes.len())
            .field("sinks", &self.sinks.len())
            .field("pass_through_answered", &self.pass_through_answered)
            .finish()
    }
}
