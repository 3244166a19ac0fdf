//! Classified retry for storage operations.
//!
//! The [`RetryExecutor`] runs an [`Operation`] through a resource's circuit
//! breaker and retries it with bounded exponential backoff and jitter, but
//! only when that is safe:
//!
//! - the failure must be classified retryable (see
//!   [`storage_resilience_core::classify`]) and its category allowed by the
//!   [`RetryPolicy`]
//! - the operation must be idempotent, or the policy must opt in with
//!   `retry_non_idempotent(true)`
//! - attempts never exceed `max_attempts`
//!
//! An open circuit ends the call immediately with [`Outcome::CircuitOpen`],
//! and cancelling the token ends it with [`Outcome::Cancelled`] without
//! recording anything against the resource.
//!
//! ## Example
//!
//! ```rust
//! use storage_resilience_circuitbreaker::CircuitBreakerRegistry;
//! use storage_resilience_retry::{Operation, RetryExecutor, RetryPolicy};
//! use tokio_util::sync::CancellationToken;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let registry = CircuitBreakerRegistry::default();
//! let policy = RetryPolicy::builder()
//!     .max_attempts(5)
//!     .initial_delay(Duration::from_millis(50))
//!     .build()
//!     .expect("valid policy");
//!
//! let outcome = RetryExecutor::new()
//!     .execute(
//!         Operation::idempotent(|| async { Ok::<_, std::io::Error>("row") }),
//!         &policy,
//!         &registry.get_or_create("primary-db"),
//!         &CancellationToken::new(),
//!     )
//!     .await;
//! assert!(outcome.is_success());
//! # }
//! ```

mod events;
mod operation;
mod policy;

pub use events::{RetryEvent, SkipReason};
pub use operation::Operation;
pub use policy::{PolicyError, RetryPolicy, RetryPolicyBuilder};

#[cfg(feature = "metrics")]
use metrics::counter;
use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};
use storage_resilience_circuitbreaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig};
use storage_resilience_core::{
    classify_error, ErrorCategory, ErrorClassification, EventListener, EventListeners, FnListener,
    Outcome,
};
use tokio_util::sync::CancellationToken;

/// Runs operations with classified retries.
#[derive(Clone, Default)]
pub struct RetryExecutor {
    event_listeners: EventListeners<RetryEvent>,
}

impl RetryExecutor {
    /// Creates an executor with no listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener for every retry event.
    pub fn with_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RetryEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback invoked before each retry with the retry number
    /// (1 = first retry) and the delay about to be slept.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Runs `operation` against the resource guarded by `breaker`.
    pub async fn execute<F, Fut, T, E>(
        &self,
        mut operation: Operation<F>,
        policy: &RetryPolicy,
        breaker: &CircuitBreaker,
        cancel: &CancellationToken,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let resource = breaker.resource_key();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(resource, attempt);
            }

            let permit = match breaker.try_acquire() {
                Ok(permit) => permit,
                Err(open) => {
                    self.emit(RetryEvent::Rejected {
                        resource: resource.to_string(),
                        timestamp: Instant::now(),
                        attempts: attempt,
                    });
                    record_outcome(resource, "rejected");
                    return Outcome::CircuitOpen {
                        resource: open.resource,
                        retry_after: open.retry_after,
                    };
                }
            };

            #[cfg(feature = "metrics")]
            counter!("storage_retry_attempts_total", "resource" => resource.to_string()).increment(1);

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    permit.release();
                    return self.cancelled(resource, attempt);
                }
                result = run_attempt((operation.f)(), policy.attempt_timeout()) => result,
            };
            let attempts = attempt + 1;

            let classification = match result {
                Ok(value) => {
                    permit.record_success();
                    self.emit(RetryEvent::Success {
                        resource: resource.to_string(),
                        timestamp: Instant::now(),
                        attempts,
                    });
                    record_outcome(resource, "success");
                    return Outcome::Success(value);
                }
                Err(classification) => classification,
            };

            settle(permit, &classification, breaker.config());
            tracing::debug!(
                resource,
                attempt = attempts,
                category = %classification.category,
                error = %classification.source_message,
                "storage attempt failed"
            );

            let skip = if !policy.is_retryable(&classification) {
                Some(SkipReason::NotRetryable)
            } else if !operation.idempotent && !policy.retry_non_idempotent() {
                Some(SkipReason::NonIdempotent)
            } else {
                None
            };

            if let Some(reason) = skip {
                self.emit(RetryEvent::NotRetried {
                    resource: resource.to_string(),
                    timestamp: Instant::now(),
                    attempts,
                    category: classification.category,
                    reason,
                });
                record_outcome(resource, "failure");
                return Outcome::Failure(classification);
            }

            if attempts >= policy.max_attempts() {
                self.emit(RetryEvent::Exhausted {
                    resource: resource.to_string(),
                    timestamp: Instant::now(),
                    attempts,
                    category: classification.category,
                });
                tracing::warn!(resource, attempts, category = %classification.category, "retries exhausted");
                record_outcome(resource, "exhausted");
                return Outcome::Failure(classification);
            }

            let delay = policy.delay_for_attempt(attempt);
            self.emit(RetryEvent::Retry {
                resource: resource.to_string(),
                timestamp: Instant::now(),
                attempt: attempts,
                delay,
                category: classification.category,
            });

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.cancelled(resource, attempts),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt = attempts;
        }
    }

    fn cancelled<T>(&self, resource: &str, attempts: u32) -> Outcome<T> {
        tracing::debug!(resource, attempts, "storage call cancelled");
        self.emit(RetryEvent::Cancelled {
            resource: resource.to_string(),
            timestamp: Instant::now(),
            attempts,
        });
        record_outcome(resource, "cancelled");
        Outcome::Cancelled
    }

    fn emit(&self, event: RetryEvent) {
        self.event_listeners.emit(&event);
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("listeners", &self.event_listeners.len())
            .finish()
    }
}

/// Runs one attempt, bounded by the per-attempt timeout.
async fn run_attempt<Fut, T, E>(
    attempt: Fut,
    timeout: Option<Duration>,
) -> Result<T, ErrorClassification>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, attempt).await {
            Ok(result) => result,
            Err(_) => {
                return Err(ErrorClassification::new(
                    ErrorCategory::Connection,
                    true,
                    format!("attempt timed out after {limit:?}"),
                ))
            }
        },
        None => attempt.await,
    };
    result.map_err(|error| classify_error(&error))
}

/// Tells the circuit what a classified failure says about the resource.
///
/// Query errors mean the resource answered, so they count as healthy.
/// Unknown errors count only when the circuit is configured to.
fn settle(permit: CallPermit<'_>, classification: &ErrorClassification, config: &CircuitBreakerConfig) {
    match classification.category {
        ErrorCategory::Query => permit.record_success(),
        ErrorCategory::Unknown if !config.count_unknown_failures() => permit.release(),
        _ => permit.record_failure(),
    }
}

#[cfg(feature = "metrics")]
fn record_outcome(resource: &str, outcome: &'static str) {
    counter!("storage_retry_outcomes_total", "resource" => resource.to_string(), "outcome" => outcome)
        .increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_outcome(_resource: &str, _outcome: &'static str) {}
