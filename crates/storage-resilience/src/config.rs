//! Plain-data settings, e.g. loaded from a config file.
//!
//! Durations are whole milliseconds and every field has a default, so a
//! partial file only overrides what it names. With the `serde` feature the
//! settings deserialize from any serde format:
//!
//! ```rust,ignore
//! let settings: ResilienceSettings = serde_json::from_str(r#"{
//!     "retry": { "max_attempts": 5 },
//!     "circuit_breaker": { "reset_timeout_ms": 10000 }
//! }"#)?;
//! let store = ResilientStore::builder().settings(&settings)?.build();
//! ```

use crate::store::ResilientStoreBuilder;
use std::time::Duration;
use storage_resilience_circuitbreaker::CircuitBreakerConfig;
use storage_resilience_core::ErrorCategory;
use storage_resilience_degraded::DegradedConfig;
use storage_resilience_retry::{PolicyError, RetryPolicy};
use thiserror::Error;

/// Errors raised when settings cannot produce a working configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SettingsError {
    /// The retry section is invalid.
    #[error("invalid retry settings: {0}")]
    Retry(#[from] PolicyError),
    /// A circuit with a zero threshold would never close.
    #[error("circuit_breaker.failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    /// Probing every 0ms would spin.
    #[error("degraded.probe_interval_ms must be greater than zero")]
    ZeroProbeInterval,
}

/// Every tunable of the resilience layer.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ResilienceSettings {
    /// Default retry policy.
    pub retry: RetrySettings,
    /// Circuit breaker settings shared by every resource.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Degraded-mode probing.
    pub degraded: DegradedSettings,
}

/// Retry section of [`ResilienceSettings`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RetrySettings {
    /// Total invocations, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay_ms: u64,
    /// Cap on any delay.
    pub max_delay_ms: u64,
    /// Growth factor between delays.
    pub backoff_factor: f64,
    /// Symmetric jitter ratio.
    pub jitter_ratio: f64,
    /// Categories to retry; `None` means all.
    pub retryable_categories: Option<Vec<ErrorCategory>>,
    /// Opt in to retrying non-idempotent operations.
    pub retry_non_idempotent: bool,
    /// Per-attempt timeout; `None` disables it.
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts(),
            initial_delay_ms: millis(policy.initial_delay()),
            max_delay_ms: millis(policy.max_delay()),
            backoff_factor: policy.backoff_factor(),
            jitter_ratio: policy.jitter_ratio(),
            retryable_categories: None,
            retry_non_idempotent: policy.retry_non_idempotent(),
            attempt_timeout_ms: policy.attempt_timeout().map(millis),
        }
    }
}

/// Circuit breaker section of [`ResilienceSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// Time an open circuit waits before a probe.
    pub reset_timeout_ms: u64,
    /// Count unclassifiable failures toward the threshold.
    pub count_unknown_failures: bool,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        let config = CircuitBreakerConfig::default();
        Self {
            failure_threshold: config.failure_threshold(),
            reset_timeout_ms: millis(config.reset_timeout()),
            count_unknown_failures: config.count_unknown_failures(),
        }
    }
}

/// Degraded-mode section of [`ResilienceSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DegradedSettings {
    /// Time between recovery probes.
    pub probe_interval_ms: u64,
    /// Bound on a single probe.
    pub probe_timeout_ms: u64,
}

impl Default for DegradedSettings {
    fn default() -> Self {
        let config = DegradedConfig::default();
        Self {
            probe_interval_ms: millis(config.probe_interval()),
            probe_timeout_ms: millis(config.probe_timeout()),
        }
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl ResilienceSettings {
    /// Builds the validated default retry policy.
    pub fn retry_policy(&self) -> Result<RetryPolicy, SettingsError> {
        let r = &self.retry;
        let mut builder = RetryPolicy::builder()
            .max_attempts(r.max_attempts)
            .initial_delay(Duration::from_millis(r.initial_delay_ms))
            .max_delay(Duration::from_millis(r.max_delay_ms))
            .backoff_factor(r.backoff_factor)
            .jitter_ratio(r.jitter_ratio)
            .retry_non_idempotent(r.retry_non_idempotent)
            .attempt_timeout(r.attempt_timeout_ms.map(Duration::from_millis));
        if let Some(categories) = &r.retryable_categories {
            builder = builder.retryable_categories(categories.iter().copied());
        }
        Ok(builder.build()?)
    }

    /// Builds the circuit breaker configuration.
    pub fn circuit_breaker_config(&self) -> Result<CircuitBreakerConfig, SettingsError> {
        let c = &self.circuit_breaker;
        if c.failure_threshold == 0 {
            return Err(SettingsError::ZeroFailureThreshold);
        }
        Ok(CircuitBreakerConfig::builder()
            .failure_threshold(c.failure_threshold)
            .reset_timeout(Duration::from_millis(c.reset_timeout_ms))
            .count_unknown_failures(c.count_unknown_failures)
            .build())
    }

    /// Builds the degraded-mode configuration.
    pub fn degraded_config(&self) -> Result<DegradedConfig, SettingsError> {
        let d = &self.degraded;
        if d.probe_interval_ms == 0 {
            return Err(SettingsError::ZeroProbeInterval);
        }
        Ok(DegradedConfig::builder()
            .probe_interval(Duration::from_millis(d.probe_interval_ms))
            .probe_timeout(Duration::from_millis(d.probe_timeout_ms))
            .build())
    }
}

impl ResilientStoreBuilder {
    /// Applies every section of `settings`.
    ///
    /// Listeners and probes registered earlier on the builder are dropped
    /// for the sections that get replaced, so call this first.
    pub fn settings(self, settings: &ResilienceSettings) -> Result<Self, SettingsError> {
        Ok(self
            .retry_policy(settings.retry_policy()?)
            .circuit_breaker(settings.circuit_breaker_config()?)
            .degraded(settings.degraded_config()?))
    }
}
