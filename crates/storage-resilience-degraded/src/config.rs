//! Configuration for degraded-mode monitoring.

use std::time::Duration;
use storage_resilience_core::{EventListener, EventListeners, FnListener, Notification};

/// Configuration for a [`DegradedModeMonitor`](crate::DegradedModeMonitor).
#[derive(Clone)]
pub struct DegradedConfig {
    pub(crate) probe_interval: Duration,
    pub(crate) probe_timeout: Duration,
    pub(crate) listeners: EventListeners<Notification>,
}

impl DegradedConfig {
    /// Create a new builder.
    pub fn builder() -> DegradedConfigBuilder {
        DegradedConfigBuilder::default()
    }

    /// Time between recovery probes.
    pub fn probe_interval(&self) -> Duration {
        self.probe_interval
    }

    /// Bound on a single probe; expiry counts as unhealthy.
    pub fn probe_timeout(&self) -> Duration {
        self.probe_timeout
    }

    /// Attaches another notification sink.
    pub fn add_listener<L>(&mut self, listener: L)
    where
        L: EventListener<Notification> + 'static,
    {
        self.listeners.add(listener);
    }
}

impl Default for DegradedConfig {
    fn default() -> Self {
        Self {
            probe_interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
            listeners: EventListeners::new(),
        }
    }
}

impl std::fmt::Debug for DegradedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradedConfig")
            .field("probe_interval", &self.probe_interval)
            .field("probe_timeout", &self.probe_timeout)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Builder for [`DegradedConfig`].
#[derive(Default)]
pub struct DegradedConfigBuilder {
    config: DegradedConfig,
}

impl DegradedConfigBuilder {
    /// Set the interval between recovery probes.
    ///
    /// Default: 30 seconds. Zero is raised to one millisecond.
    pub fn probe_interval(mut self, interval: Duration) -> Self {
        self.config.probe_interval = interval.max(Duration::from_millis(1));
        self
    }

    /// Set the timeout for a single probe.
    ///
    /// Default: 5 seconds
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    /// Registers a notification sink.
    pub fn listener<L>(mut self, listener: L) -> Self
    where
        L: EventListener<Notification> + 'static,
    {
        self.config.listeners.add(listener);
        self
    }

    /// Registers a callback for every notification.
    pub fn on_notification<F>(self, f: F) -> Self
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.listener(FnListener::new(move |n: &Notification| f(n)))
    }

    /// Build the configuration.
    pub fn build(self) -> DegradedConfig {
        self.config
    }
}
