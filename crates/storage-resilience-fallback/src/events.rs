//! Events emitted by the fallback coordinator.

use std::time::Instant;
use storage_resilience_core::ResilienceEvent;

/// Events emitted by the fallback coordinator.
#[derive(Debug, Clone)]
pub enum FallbackEvent {
    /// The primary path succeeded; no fallback was needed.
    PrimarySucceeded {
        /// Resource the call targeted.
        resource: String,
        /// When the event occurred.
        timestamp: Instant,
    },

    /// The primary failed and the fallback produced a value.
    Applied {
        /// Resource the call targeted.
        resource: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The fallback kind that was used.
        strategy: &'static str,
    },

    /// Neither the primary nor a fallback produced a value.
    Failed {
        /// Resource the call targeted.
        resource: String,
        /// When the event occurred.
        timestamp: Instant,
        /// The fallback kind that was tried, `"none"` when absent.
        strategy: &'static str,
    },

    /// A Query or Transaction failure returned without trying the fallback.
    Skipped {
        /// Resource the call targeted.
        resource: String,
        /// When the event occurred.
        timestamp: Instant,
    },

    /// Refreshing the fallback cache after a primary success failed.
    CacheRefreshFailed {
        /// Resource the call targeted.
        resource: String,
        /// When the event occurred.
        timestamp: Instant,
        /// Rendered cache error.
        error: String,
    },
}

impl ResilienceEvent for FallbackEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::PrimarySucceeded { .. } => "primary_succeeded",
            Self::Applied { .. } => "applied",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::CacheRefreshFailed { .. } => "cache_refresh_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::PrimarySucceeded { timestamp, .. }
            | Self::Applied { timestamp, .. }
            | Self::Failed { timestamp, .. }
            | Self::Skipped { timestamp, .. }
            | Self::CacheRefreshFailed { timestamp, .. } => *timestamp,
        }
    }

    fn resource_key(&self) -> &str {
        match self {
            Self::PrimarySucceeded { resource, .. }
            | Self::Applied { resource, .. }
            | Self::Failed { resource, .. }
            | Self::Skipped { resource, .. }
            | Self::CacheRefreshFailed { resource, .. } => resource,
        }
    }
}
