//! Operator notifications.
//!
//! Monitoring and alerting live outside this workspace. They subscribe to
//! [`Notification`] events through the ordinary listener system, e.g. with a
//! [`FnListener`](crate::FnListener).

use crate::events::ResilienceEvent;
use std::time::Instant;

/// A state change an operator should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A resource's circuit tripped into OPEN.
    CircuitOpened {
        /// Affected resource.
        resource: String,
        /// When it happened.
        timestamp: Instant,
    },
    /// A resource entered degraded mode.
    EnteredDegraded {
        /// Affected resource.
        resource: String,
        /// When it happened.
        timestamp: Instant,
    },
    /// A degraded resource recovered.
    Recovered {
        /// Affected resource.
        resource: String,
        /// When it happened.
        timestamp: Instant,
    },
}

impl Notification {
    /// Builds a `CircuitOpened` notification stamped now.
    pub fn circuit_opened(resource: impl Into<String>) -> Self {
        Notification::CircuitOpened {
            resource: resource.into(),
            timestamp: Instant::now(),
        }
    }

    /// Builds an `EnteredDegraded` notification stamped now.
    pub fn entered_degraded(resource: impl Into<String>) -> Self {
        Notification::EnteredDegraded {
            resource: resource.into(),
            timestamp: Instant::now(),
        }
    }

    /// Builds a `Recovered` notification stamped now.
    pub fn recovered(resource: impl Into<String>) -> Self {
        Notification::Recovered {
            resource: resource.into(),
            timestamp: Instant::now(),
        }
    }
}

impl ResilienceEvent for Notification {
    fn event_type(&self) -> &'static str {
        match self {
            Notification::CircuitOpened { .. } => "circuit_opened",
            Notification::EnteredDegraded { .. } => "entered_degraded",
            Notification::Recovered { .. } => "recovered",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Notification::CircuitOpened { timestamp, .. }
            | Notification::EnteredDegraded { timestamp, .. }
            | Notification::Recovered { timestamp, .. } => *timestamp,
        }
    }

    fn resource_key(&self) -> &str {
        match self {
            Notification::CircuitOpened { resource, .. }
            | Notification::EnteredDegraded { resource, .. }
            | Notification::Recovered { resource, .. } => resource,
        }
    }
}
