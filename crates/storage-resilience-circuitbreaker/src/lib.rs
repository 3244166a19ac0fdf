//! Per-resource circuit breaker for storage backends.
//!
//! A circuit breaker stops calling a resource that keeps failing, giving it
//! time to recover instead of piling more load on it.
//!
//! ## States
//! - **Closed**: calls pass through; consecutive failures are counted
//! - **Open**: calls are rejected immediately with [`CircuitOpenError`]
//! - **Half-Open**: after the reset timeout exactly one probe call may run;
//!   its result closes or re-opens the circuit
//!
//! Every resource key gets its own circuit, created lazily by a
//! [`CircuitBreakerRegistry`]. Each circuit is guarded by its own lock, so
//! callers on different resources never contend.
//!
//! ## Usage
//!
//! ```rust
//! use storage_resilience_circuitbreaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let registry = CircuitBreakerRegistry::new(
//!     CircuitBreakerConfig::builder()
//!         .failure_threshold(5)
//!         .reset_timeout(Duration::from_secs(30))
//!         .build(),
//! );
//!
//! let breaker = registry.get_or_create("primary-db");
//! let rows = breaker
//!     .call(|| async { Ok::<_, std::io::Error>(vec!["row"]) })
//!     .await;
//! assert!(rows.is_ok());
//! # }
//! ```
//!
//! ## Permits
//!
//! Callers that need to decide for themselves whether an error reflects on
//! the resource use [`CircuitBreaker::try_acquire`] and settle the returned
//! [`CallPermit`] with `record_success`, `record_failure` or `release`. A
//! permit dropped unsettled is released, so a cancelled probe never wedges
//! the circuit in HALF_OPEN.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

pub use circuit::{CircuitMetrics, CircuitState};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::{CircuitBreakerError, CircuitOpenError};
pub use events::CircuitBreakerEvent;
pub use registry::CircuitBreakerRegistry;

use circuit::{Admission, Circuit};

mod circuit;
mod config;
mod error;
mod events;
mod registry;

/// The circuit breaker for one resource key.
pub struct CircuitBreaker {
    resource: String,
    circuit: Mutex<Circuit>,
    state_atomic: AtomicU8,
    config: Arc<CircuitBreakerConfig>,
}

impl CircuitBreaker {
    /// Creates a closed circuit for `resource`.
    pub fn new(resource: impl Into<String>, config: Arc<CircuitBreakerConfig>) -> Self {
        let now = config.clock.now();
        Self {
            resource: resource.into(),
            circuit: Mutex::new(Circuit::new(now)),
            state_atomic: AtomicU8::new(CircuitState::Closed as u8),
            config,
        }
    }

    /// The resource key this circuit guards.
    pub fn resource_key(&self) -> &str {
        &self.resource
    }

    /// The shared configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` under the circuit lock, then hands the events it raised to
    /// the listeners. Listeners may call back into this breaker.
    fn with_circuit<R>(&self, f: impl FnOnce(&mut Circuit) -> R) -> R {
        let mut circuit = self.lock();
        let result = f(&mut circuit);
        let events = circuit.take_events();
        drop(circuit);

        for event in &events {
            self.config.event_listeners.emit(event);
        }
        result
    }

    /// Asks to run one call against the resource.
    ///
    /// Fails with [`CircuitOpenError`] while the circuit is OPEN, and while
    /// it is HALF_OPEN with the probe slot already taken.
    pub fn try_acquire(&self) -> Result<CallPermit<'_>, CircuitOpenError> {
        let result = self.with_circuit(|circuit| {
            circuit.try_acquire(&self.resource, &self.config, &self.state_atomic)
        });

        match result {
            Ok(admission) => Ok(CallPermit {
                breaker: self,
                admission,
                settled: false,
            }),
            Err(retry_after) => {
                tracing::debug!(resource = %self.resource, ?retry_after, "circuit rejected call");
                Err(CircuitOpenError {
                    resource: self.resource.clone(),
                    retry_after,
                })
            }
        }
    }

    /// Runs `operation` through the circuit, counting every error as a failure.
    pub async fn call<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(error) => {
                permit.record_failure();
                Err(CircuitBreakerError::Inner(error))
            }
        }
    }

    /// Returns the current state, applying the reset timeout first.
    pub fn state(&self) -> CircuitState {
        self.with_circuit(|circuit| circuit.refresh(&self.resource, &self.config, &self.state_atomic))
    }

    /// Returns the last stored state without taking the lock.
    ///
    /// An OPEN circuit whose timeout has elapsed still reads OPEN here until
    /// the next call or [`state`](Self::state) moves it to HALF_OPEN.
    pub fn state_sync(&self) -> CircuitState {
        CircuitState::from_u8(self.state_atomic.load(Ordering::Acquire))
    }

    /// Returns whether the circuit is currently open.
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Remaining time before an OPEN circuit admits a probe; zero otherwise.
    pub fn retry_after(&self) -> Duration {
        self.with_circuit(|circuit| {
            circuit.refresh(&self.resource, &self.config, &self.state_atomic);
            circuit.retry_after(&self.config)
        })
    }

    /// Returns a snapshot of the circuit.
    pub fn metrics(&self) -> CircuitMetrics {
        self.with_circuit(|circuit| {
            circuit.refresh(&self.resource, &self.config, &self.state_atomic);
            circuit.metrics(&self.config)
        })
    }

    /// Forces the circuit into the open state.
    pub fn force_open(&self) {
        self.with_circuit(|circuit| {
            circuit.force(
                CircuitState::Open,
                &self.resource,
                &self.config,
                &self.state_atomic,
            )
        });
    }

    /// Resets the circuit to the closed state and clears counts.
    pub fn reset(&self) {
        self.with_circuit(|circuit| {
            circuit.force(
                CircuitState::Closed,
                &self.resource,
                &self.config,
                &self.state_atomic,
            )
        });
    }

    /// Returns an HTTP status code based on circuit state.
    ///
    /// - Closed: 200 (OK)
    /// - HalfOpen: 200 (OK) - accepting a probe
    /// - Open: 503 (Service Unavailable)
    pub fn http_status(&self) -> u16 {
        match self.state_sync() {
            CircuitState::Closed | CircuitState::HalfOpen => 200,
            CircuitState::Open => 503,
        }
    }

    /// Returns "healthy", "recovering" or "unhealthy".
    pub fn health_status(&self) -> &'static str {
        match self.state_sync() {
            CircuitState::Closed => "healthy",
            CircuitState::HalfOpen => "recovering",
            CircuitState::Open => "unhealthy",
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("resource", &self.resource)
            .field("state", &self.state_sync())
            .finish()
    }
}

/// Permission to run one call against a resource.
///
/// Settle it with exactly one of the consuming methods. Dropping it unsettled
/// behaves like [`release`](Self::release).
#[must_use = "an unsettled permit records nothing about the call"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl CallPermit<'_> {
    /// Whether this call is the single HALF_OPEN probe.
    pub fn is_probe(&self) -> bool {
        self.admission == Admission::Probe
    }

    /// The resource answered correctly.
    pub fn record_success(mut self) {
        self.settled = true;
        let (b, admission) = (self.breaker, self.admission);
        b.with_circuit(|circuit| {
            circuit.record_success(admission, &b.resource, &b.config, &b.state_atomic)
        });
    }

    /// The resource failed.
    pub fn record_failure(mut self) {
        self.settled = true;
        let (b, admission) = (self.breaker, self.admission);
        b.with_circuit(|circuit| {
            circuit.record_failure(admission, &b.resource, &b.config, &b.state_atomic)
        });
    }

    /// The call says nothing about the resource's health (cancelled,
    /// unclassifiable). Frees the probe slot if this was the probe.
    pub fn release(mut self) {
        self.settled = true;
        self.breaker.lock().release(self.admission);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.lock().release(self.admission);
        }
    }
}
