//! Degraded-mode tracking for storage resources.
//!
//! A resource enters degraded mode when neither it nor any fallback could
//! serve a request. While degraded, callers can branch on
//! [`DegradedModeMonitor::is_degraded`] without attempting the operation
//! (for example to show a read-only banner).
//!
//! Entering degraded mode schedules a recovery probe for the resource, if
//! one is registered. Without one the resource stays degraded until
//! [`DegradedModeMonitor::mark_recovered`] is called. The probe runs every
//! `probe_interval`, counted from the moment of entry, until it
//! succeeds, at which point the flag is cleared and a
//! [`Notification::Recovered`] is emitted. There is never more than one probe
//! task per resource.
//!
//! ## Example
//!
//! ```rust
//! use storage_resilience_degraded::{DegradedConfig, DegradedModeMonitor};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let monitor = DegradedModeMonitor::new(
//!     DegradedConfig::builder()
//!         .probe_interval(Duration::from_secs(30))
//!         .build(),
//! );
//! monitor.register_probe("primary-db", |_resource: &str| async {
//!     // SELECT 1 against the database
//!     true
//! });
//!
//! monitor.enter_degraded("primary-db");
//! assert!(monitor.is_degraded("primary-db"));
//! # }
//! ```

mod config;
mod probe;

pub use config::{DegradedConfig, DegradedConfigBuilder};
pub use probe::RecoveryProbe;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use storage_resilience_core::{EventListeners, Notification};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Process-wide degraded-mode flags, keyed by resource.
///
/// Dropping the monitor aborts every running probe task.
pub struct DegradedModeMonitor {
    config: DegradedConfig,
    probes: RwLock<HashMap<String, Arc<dyn RecoveryProbe>>>,
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

/// Degraded state of one resource.
struct Entry {
    degraded: AtomicBool,
    state: Mutex<EntryState>,
}

#[derive(Default)]
struct EntryState {
    entered_at: Option<Instant>,
    probe_task: Option<JoinHandle<()>>,
    /// Bumped on every entry and manual recovery so a stale probe task
    /// cannot clear a newer degradation.
    generation: u64,
}

impl Entry {
    fn new() -> Self {
        Self {
            degraded: AtomicBool::new(false),
            state: Mutex::new(EntryState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clears the flag if `generation` is still current.
    fn clear_from_probe(&self, generation: u64) -> bool {
        let mut state = self.lock();
        if state.generation != generation || !self.degraded.load(Ordering::Acquire) {
            return false;
        }
        self.degraded.store(false, Ordering::Release);
        state.entered_at = None;
        // The task is the caller; dropping its handle just detaches it.
        state.probe_task = None;
        true
    }
}

impl DegradedModeMonitor {
    /// Creates a monitor with no degraded resources.
    pub fn new(config: DegradedConfig) -> Self {
        Self {
            config,
            probes: RwLock::new(HashMap::new()),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// The monitor's configuration.
    pub fn config(&self) -> &DegradedConfig {
        &self.config
    }

    /// Registers the recovery probe for `resource`, replacing any previous one.
    ///
    /// Takes effect the next time the resource enters degraded mode.
    pub fn register_probe<P>(&self, resource: impl Into<String>, probe: P)
    where
        P: RecoveryProbe + 'static,
    {
        self.probes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource.into(), Arc::new(probe));
    }

    /// Marks `resource` unavailable.
    ///
    /// Returns `true` if the resource was not already degraded. Re-entering
    /// is a no-op: the original entry time and probe task are kept.
    pub fn enter_degraded(&self, resource: &str) -> bool {
        let entry = self.entry(resource);
        let mut state = entry.lock();
        if entry.degraded.load(Ordering::Acquire) {
            return false;
        }

        let entered_at = Instant::now();
        entry.degraded.store(true, Ordering::Release);
        state.entered_at = Some(entered_at);
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        state.probe_task = self.spawn_probe(resource, &entry, generation, entered_at);
        drop(state);

        tracing::info!(resource, "entered degraded mode");
        self.config
            .listeners
            .emit(&Notification::entered_degraded(resource));
        true
    }

    /// Returns whether `resource` is currently degraded. No side effects.
    pub fn is_degraded(&self, resource: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .is_some_and(|entry| entry.degraded.load(Ordering::Acquire))
    }

    /// When `resource` entered its current degradation, if it is degraded.
    pub fn degraded_since(&self, resource: &str) -> Option<Instant> {
        let entry = self.existing(resource)?;
        let state = entry.lock();
        state.entered_at
    }

    /// Whether a recovery probe task is scheduled for `resource`.
    pub fn has_active_probe(&self, resource: &str) -> bool {
        let Some(entry) = self.existing(resource) else {
            return false;
        };
        let state = entry.lock();
        state
            .probe_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Clears degraded mode for `resource`, e.g. after a primary call
    /// succeeded. Cancels the pending probe.
    ///
    /// Returns `true` if the resource was degraded.
    pub fn mark_recovered(&self, resource: &str) -> bool {
        let Some(entry) = self.existing(resource) else {
            return false;
        };
        let mut state = entry.lock();
        if !entry.degraded.load(Ordering::Acquire) {
            return false;
        }

        entry.degraded.store(false, Ordering::Release);
        state.entered_at = None;
        state.generation = state.generation.wrapping_add(1);
        if let Some(task) = state.probe_task.take() {
            task.abort();
        }
        drop(state);

        tracing::info!(resource, "recovered from degraded mode");
        self.config.listeners.emit(&Notification::recovered(resource));
        true
    }

    /// Keys of every currently degraded resource, sorted.
    pub fn degraded_resources(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, entry)| entry.degraded.load(Ordering::Acquire))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Aborts every probe task. Degraded flags are left as they are.
    pub fn shutdown(&self) {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        for entry in entries.values() {
            if let Some(task) = entry.lock().probe_task.take() {
                task.abort();
            }
        }
    }

    fn entry(&self, resource: &str) -> Arc<Entry> {
        if let Some(entry) = self.existing(resource) {
            return entry;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            entries
                .entry(resource.to_string())
                .or_insert_with(|| Arc::new(Entry::new())),
        )
    }

    fn existing(&self, resource: &str) -> Option<Arc<Entry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned()
    }

    fn spawn_probe(
        &self,
        resource: &str,
        entry: &Arc<Entry>,
        generation: u64,
        entered_at: Instant,
    ) -> Option<JoinHandle<()>> {
        let probe = self
            .probes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource)
            .cloned();
        let Some(probe) = probe else {
            tracing::warn!(
                resource,
                "no recovery probe registered, degraded until a primary call succeeds"
            );
            return None;
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(resource, "no tokio runtime, recovery probe not scheduled");
                return None;
            }
        };

        let task = ProbeTask {
            resource: resource.to_string(),
            entry: Arc::clone(entry),
            probe,
            generation,
            first_probe_at: entered_at + self.config.probe_interval,
            interval: self.config.probe_interval,
            timeout: self.config.probe_timeout,
            listeners: self.config.listeners.clone(),
        };
        Some(handle.spawn(task.run()))
    }
}

impl Default for DegradedModeMonitor {
    fn default() -> Self {
        Self::new(DegradedConfig::default())
    }
}

impl Drop for DegradedModeMonitor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for DegradedModeMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DegradedModeMonitor")
            .field("config", &self.config)
            .field("degraded", &self.degraded_resources())
            .finish()
    }
}

/// Everything a background probe loop needs, detached from the monitor.
struct ProbeTask {
    resource: String,
    entry: Arc<Entry>,
    probe: Arc<dyn RecoveryProbe>,
    generation: u64,
    first_probe_at: Instant,
    interval: Duration,
    timeout: Duration,
    listeners: EventListeners<Notification>,
}

impl ProbeTask {
    async fn run(self) {
        // Ticks are anchored to the entry time, not to when the task first runs.
        let mut ticks = tokio::time::interval_at(self.first_probe_at, self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;

            let healthy = tokio::time::timeout(self.timeout, self.probe.probe(&self.resource))
                .await
                .unwrap_or(false);

            if healthy {
                if self.entry.clear_from_probe(self.generation) {
                    tracing::info!(resource = %self.resource, "recovery probe succeeded");
                    self.listeners.emit(&Notification::recovered(&self.resource));
                }
                return;
            }

            tracing::warn!(
                resource = %self.resource,
                retry_in = ?self.interval,
                "recovery probe failed"
            );
        }
    }
}
