use std::time::{Duration, Instant};
use storage_resilience_core::{ErrorCategory, ResilienceEvent};

/// Why a failed attempt was not retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The classification (or the policy's category set) rules out a retry.
    NotRetryable,
    /// The operation is not idempotent and the policy did not opt in.
    NonIdempotent,
}

/// Events emitted by the retry executor.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is about to be made after `delay`.
    Retry {
        resource: String,
        timestamp: Instant,
        attempt: u32,
        delay: Duration,
        category: ErrorCategory,
    },
    /// The operation succeeded (either on first try or after retries).
    Success {
        resource: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// The operation failed on its last permitted attempt.
    Exhausted {
        resource: String,
        timestamp: Instant,
        attempts: u32,
        category: ErrorCategory,
    },
    /// A failure surfaced without using the remaining retry budget.
    NotRetried {
        resource: String,
        timestamp: Instant,
        attempts: u32,
        category: ErrorCategory,
        reason: SkipReason,
    },
    /// The circuit rejected the attempt before it ran.
    Rejected {
        resource: String,
        timestamp: Instant,
        attempts: u32,
    },
    /// The caller cancelled; no further attempts are made.
    Cancelled {
        resource: String,
        timestamp: Instant,
        attempts: u32,
    },
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::NotRetried { .. } => "not_retried",
            RetryEvent::Rejected { .. } => "rejected",
            RetryEvent::Cancelled { .. } => "cancelled",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::NotRetried { timestamp, .. }
            | RetryEvent::Rejected { timestamp, .. }
            | RetryEvent::Cancelled { timestamp, .. } => *timestamp,
        }
    }

    fn resource_key(&self) -> &str {
        match self {
            RetryEvent::Retry { resource, .. }
            | RetryEvent::Success { resource, .. }
            | RetryEvent::Exhausted { resource, .. }
            | RetryEvent::NotRetried { resource, .. }
            | RetryEvent::Rejected { resource, .. }
            | RetryEvent::Cancelled { resource, .. } => resource,
        }
    }
}
