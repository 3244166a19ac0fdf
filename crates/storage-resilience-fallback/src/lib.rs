//! Fallback coordination for storage reads.
//!
//! When the primary path (retries plus circuit breaker) ends in a failure
//! or in an open circuit, the [`FallbackCoordinator`] tries a secondary
//! source:
//!
//! - [`Fallback::accessor`]: any async closure, e.g. a replica read
//! - [`Fallback::cache`]: an entry in a [`FallbackCache`], refreshed on every
//!   primary success
//!
//! A fallback value comes back as [`Outcome::Degraded`] with `stale: true`.
//! When there is no fallback, or it fails too, the resource is put into
//! degraded mode and the original outcome is returned. Cache writes are best
//! effort: a failed refresh is logged and never reaches the caller.
//!
//! Every failure category takes this path. A coordinator built with
//! [`FallbackCoordinator::pass_through_answered_failures`] instead returns
//! Query and Transaction failures untouched, so a constraint violation on a
//! write is never masked by a stale read.

mod cache;
mod events;

pub use cache::{CacheError, FallbackCache, InMemoryCache};
pub use events::FallbackEvent;

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage_resilience_core::{
    ErrorCategory, EventListener, EventListeners, FnListener, Outcome,
};
use storage_resilience_degraded::DegradedModeMonitor;

/// Boxed error returned by fallback accessors.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Accessor<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<T, BoxError>> + Send>;

/// The secondary source to use when the primary path fails.
pub enum Fallback<T> {
    /// No fallback; failures enter degraded mode directly.
    None,
    /// A one-shot accessor, e.g. a read from a replica.
    Accessor(Accessor<T>),
    /// A cache entry, read on failure and refreshed on success.
    Cache {
        /// Backing cache.
        cache: Arc<dyn FallbackCache<T>>,
        /// Cache key for this read.
        key: String,
        /// TTL applied when refreshing the entry.
        ttl: Duration,
    },
}

impl<T> Fallback<T> {
    /// Wraps an async accessor.
    pub fn accessor<F, Fut, E>(f: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: 'static,
        E: Into<BoxError> + 'static,
    {
        Fallback::Accessor(Box::new(move || {
            let fut = f();
            Box::pin(async move { fut.await.map_err(Into::into) })
        }))
    }

    /// Reads `key` from `cache` on failure and refreshes it on success.
    pub fn cache(cache: Arc<dyn FallbackCache<T>>, key: impl Into<String>, ttl: Duration) -> Self {
        Fallback::Cache {
            cache,
            key: key.into(),
            ttl,
        }
    }

    /// Short name used in events and logs.
    pub fn strategy(&self) -> &'static str {
        match self {
            Fallback::None => "none",
            Fallback::Accessor(_) => "accessor",
            Fallback::Cache { .. } => "cache",
        }
    }
}

impl<T> Default for Fallback<T> {
    fn default() -> Self {
        Fallback::None
    }
}

impl<T> std::fmt::Debug for Fallback<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fallback::Cache { key, ttl, .. } => f
                .debug_struct("Cache")
                .field("key", key)
                .field("ttl", ttl)
                .finish_non_exhaustive(),
            other => f.write_str(other.strategy()),
        }
    }
}

/// Runs a primary path and falls back when it fails.
#[derive(Clone)]
pub struct FallbackCoordinator {
    monitor: Arc<DegradedModeMonitor>,
    event_listeners: EventListeners<FallbackEvent>,
    pass_through_answered: bool,
}

impl FallbackCoordinator {
    /// Creates a coordinator that reports unavailability to `monitor`.
    pub fn new(monitor: Arc<DegradedModeMonitor>) -> Self {
        Self {
            monitor,
            event_listeners: EventListeners::new(),
            pass_through_answered: false,
        }
    }

    /// Returns Query and Transaction failures as they are, without trying
    /// the fallback or entering degraded mode.
    pub fn pass_through_answered_failures(mut self) -> Self {
        self.pass_through_answered = true;
        self
    }

    /// Registers a listener for fallback events.
    pub fn with_listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<FallbackEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Registers a callback invoked whenever a fallback value is served.
    pub fn on_applied<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &'static str) + Send + Sync + 'static,
    {
        self.event_listeners
            .add(FnListener::new(move |event: &FallbackEvent| {
                if let FallbackEvent::Applied {
                    resource, strategy, ..
                } = event
                {
                    f(resource, strategy);
                }
            }));
        self
    }

    /// The degraded-mode monitor this coordinator reports to.
    pub fn monitor(&self) -> &Arc<DegradedModeMonitor> {
        &self.monitor
    }

    /// Awaits `primary` and applies `fallback` if it failed.
    pub async fn with_fallback<T, P>(
        &self,
        resource: &str,
        primary: P,
        fallback: Fallback<T>,
    ) -> Outcome<T>
    where
        P: Future<Output = Outcome<T>>,
        T: Clone + Send + 'static,
    {
        let outcome = primary.await;
        match outcome {
            Outcome::Success(value) => {
                if let Fallback::Cache { cache, key, ttl } = &fallback {
                    if let Err(error) = cache.set(key, value.clone(), *ttl).await {
                        tracing::warn!(resource, key = %key, %error, "fallback cache refresh failed");
                        self.emit(FallbackEvent::CacheRefreshFailed {
                            resource: resource.to_string(),
                            timestamp: Instant::now(),
                            error: error.to_string(),
                        });
                    }
                }
                self.monitor.mark_recovered(resource);
                self.emit(FallbackEvent::PrimarySucceeded {
                    resource: resource.to_string(),
                    timestamp: Instant::now(),
                });
                Outcome::Success(value)
            }
            Outcome::Failure(ref classification)
                if self.pass_through_answered
                    && matches!(
                        classification.category,
                        ErrorCategory::Query | ErrorCategory::Transaction
                    ) =>
            {
                self.emit(FallbackEvent::Skipped {
                    resource: resource.to_string(),
                    timestamp: Instant::now(),
                });
                outcome
            }
            Outcome::Failure(_) | Outcome::CircuitOpen { .. } => {
                let strategy = fallback.strategy();
                match self.run_fallback(resource, fallback).await {
                    Some(value) => {
                        tracing::debug!(resource, strategy, "serving fallback value");
                        self.emit(FallbackEvent::Applied {
                            resource: resource.to_string(),
                            timestamp: Instant::now(),
                            strategy,
                        });
                        Outcome::Degraded { value, stale: true }
                    }
                    None => {
                        self.emit(FallbackEvent::Failed {
                            resource: resource.to_string(),
                            timestamp: Instant::now(),
                            strategy,
                        });
                        self.monitor.enter_degraded(resource);
                        outcome
                    }
                }
            }
            Outcome::Degraded { .. } | Outcome::Cancelled => outcome,
        }
    }

    async fn run_fallback<T>(&self, resource: &str, fallback: Fallback<T>) -> Option<T> {
        match fallback {
            Fallback::None => None,
            Fallback::Accessor(accessor) => match accessor().await {
                Ok(value) => Some(value),
                Err(error) => {
                    tracing::warn!(resource, %error, "fallback accessor failed");
                    None
                }
            },
            Fallback::Cache { cache, key, .. } => match cache.get(&key).await {
                Ok(Some(value)) => Some(value),
                Ok(None) => {
                    tracing::debug!(resource, key = %key, "fallback cache miss");
                    None
                }
                Err(error) => {
                    tracing::warn!(resource, key = %key, %error, "fallback cache read failed");
                    None
                }
            },
        }
    }

    fn emit(&self, event: FallbackEvent) {
        self.event_listeners.emit(&event);
    }
}

impl std::fmt::Debug for FallbackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackCoordinator")
            .field("monitor", &self.monitor)
            .field("listeners", &self.event_listeners.len())
            .field("pass_through_answered", &self.pass_through_answered)
            .finish()
    }
}
