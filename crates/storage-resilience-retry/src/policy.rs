use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;
use storage_resilience_core::{ErrorCategory, ErrorClassification};
use thiserror::Error;

/// Errors returned when a [`RetryPolicy`] is built with unusable values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    /// `max_attempts` was zero.
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,
    /// The backoff factor was below 1.0, NaN or infinite.
    #[error("backoff_factor must be a finite number >= 1.0, got {0}")]
    InvalidBackoffFactor(f64),
    /// The jitter ratio was outside `[0, 1]`.
    #[error("jitter_ratio must be within [0, 1], got {0}")]
    InvalidJitter(f64),
    /// The first delay was longer than the cap.
    #[error("initial_delay {initial:?} exceeds max_delay {max:?}")]
    DelayOrder {
        /// Configured initial delay.
        initial: Duration,
        /// Configured cap.
        max: Duration,
    },
    /// A per-attempt timeout of zero would fail every attempt.
    #[error("attempt_timeout must be greater than zero")]
    ZeroAttemptTimeout,
}

/// How a failing storage operation is retried.
///
/// Immutable once built; clone it freely. Construct with
/// [`RetryPolicy::builder`], which rejects invalid combinations, or use
/// [`RetryPolicy::default`].
///
/// | Setting | Default |
/// |---|---|
/// | `max_attempts` | 3 |
/// | `initial_delay` | 100ms |
/// | `max_delay` | 5s |
/// | `backoff_factor` | 2.0 |
/// | `jitter_ratio` | 0.1 |
/// | `retryable_categories` | every category |
/// | `retry_non_idempotent` | false |
/// | `attempt_timeout` | 10s |
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_factor: f64,
    jitter_ratio: f64,
    retryable_categories: BTreeSet<ErrorCategory>,
    retry_non_idempotent: bool,
    attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(5000),
            backoff_factor: 2.0,
            jitter_ratio: 0.1,
            retryable_categories: ErrorCategory::ALL.into_iter().collect(),
            retry_non_idempotent: false,
            attempt_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl RetryPolicy {
    /// Creates a builder seeded with the defaults.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// Total invocations allowed, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before the first retry, before jitter.
    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    /// Upper bound on any delay.
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Growth factor between consecutive delays.
    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    /// Symmetric jitter applied to each delay, as a fraction.
    pub fn jitter_ratio(&self) -> f64 {
        self.jitter_ratio
    }

    /// Categories the caller is willing to retry.
    pub fn retryable_categories(&self) -> &BTreeSet<ErrorCategory> {
        &self.retryable_categories
    }

    /// Whether non-idempotent operations may be retried.
    pub fn retry_non_idempotent(&self) -> bool {
        self.retry_non_idempotent
    }

    /// Bound on a single attempt, if any.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.attempt_timeout
    }

    /// Whether a failure with this classification may be retried.
    ///
    /// The category set only narrows: an error the classifier marked
    /// non-retryable stays non-retryable.
    pub fn is_retryable(&self, classification: &ErrorClassification) -> bool {
        classification.retryable && self.retryable_categories.contains(&classification.category)
    }

    /// Delay before retry number `attempt + 1`, without jitter.
    ///
    /// `min(initial_delay * backoff_factor^attempt, max_delay)`, saturating
    /// to `max_delay` when the product overflows.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs).min(self.max_delay)
    }

    /// Delay before retry number `attempt + 1`, with jitter applied.
    ///
    /// The result stays within `[0, max_delay]`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter_ratio == 0.0 || base.is_zero() {
            return base;
        }
        let spread = rand::rng().random_range(-self.jitter_ratio..=self.jitter_ratio);
        let secs = (base.as_secs_f64() * (1.0 + spread)).max(0.0);
        Duration::from_secs_f64(secs).min(self.max_delay)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicyBuilder {
    /// Creates a builder with the documented defaults.
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
        }
    }

    /// Sets the total number of invocations, including the first.
    ///
    /// `max_attempts(1)` disables retries.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.policy.max_attempts = max_attempts;
        self
    }

    /// Sets the delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.policy.initial_delay = delay;
        self
    }

    /// Sets the cap on any single delay.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.policy.max_delay = delay;
        self
    }

    /// Sets the growth factor between delays.
    pub fn backoff_factor(mut self, factor: f64) -> Self {
        self.policy.backoff_factor = factor;
        self
    }

    /// Sets the symmetric jitter ratio (0.1 means ±10%).
    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.policy.jitter_ratio = ratio;
        self
    }

    /// Restricts retries to the given categories.
    pub fn retryable_categories<I>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = ErrorCategory>,
    {
        self.policy.retryable_categories = categories.into_iter().collect();
        self
    }

    /// Opts in to retrying operations that are not marked idempotent.
    pub fn retry_non_idempotent(mut self, enabled: bool) -> Self {
        self.policy.retry_non_idempotent = enabled;
        self
    }

    /// Bounds each attempt; `None` lets attempts run unbounded.
    pub fn attempt_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.policy.attempt_timeout = timeout;
        self
    }

    /// Validates and builds the policy.
    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let p = self.policy;
        if p.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if !p.backoff_factor.is_finite() || p.backoff_factor < 1.0 {
            return Err(PolicyError::InvalidBackoffFactor(p.backoff_factor));
        }
        if !(0.0..=1.0).contains(&p.jitter_ratio) {
            return Err(PolicyError::InvalidJitter(p.jitter_ratio));
        }
        if p.initial_delay > p.max_delay {
            return Err(PolicyError::DelayOrder {
                initial: p.initial_delay,
                max: p.max_delay,
            });
        }
        if p.attempt_timeout == Some(Duration::ZERO) {
            return Err(PolicyError::ZeroAttemptTimeout);
        }
        Ok(p)
    }
}
