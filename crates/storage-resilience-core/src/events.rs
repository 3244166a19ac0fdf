//! Typed observation hooks for the storage stack.
//!
//! Circuits, the retry loop, the fallback coordinator and the degraded-mode
//! monitor each publish their own event enum. Every event carries the
//! resource key it concerns, so one sink can keep per-backend counters for
//! `primary-db`, `search-index` and so on.
//!
//! Events are delivered synchronously on the thread that raised them, after
//! the component has released its internal locks. A sink may therefore read
//! the component back (e.g. fetch circuit metrics on a trip), but it should
//! not block: it runs on the storage call path.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Something a resilience component reports about a resource.
pub trait ResilienceEvent: Send + Sync + fmt::Debug {
    /// Stable snake_case name, e.g. `"state_transition"` or `"applied"`.
    fn event_type(&self) -> &'static str;

    /// Wall-clock time the component observed it.
    fn timestamp(&self) -> Instant;

    /// Resource key the event concerns (e.g. "primary-db").
    fn resource_key(&self) -> &str;
}

/// Receives events of one kind.
pub trait EventListener<E: ResilienceEvent>: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &E);
}

/// A listener that several components can hold at once.
pub type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// The sinks registered on one component.
///
/// Cloning is cheap and shares the sinks.
#[derive(Clone)]
pub struct EventListeners<E: ResilienceEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: ResilienceEvent> EventListeners<E> {
    /// No sinks.
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    /// Registers `listener`.
    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Registers a listener that is also attached elsewhere.
    pub fn add_shared(&mut self, listener: BoxedEventListener<E>) {
        self.listeners.push(listener);
    }

    /// Delivers `event` to every sink in registration order.
    ///
    /// A sink that panics is logged and skipped; the storage call and the
    /// sinks after it carry on.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let delivered = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if delivered.is_err() {
                tracing::warn!(
                    resource = event.resource_key(),
                    event = event.event_type(),
                    "event listener panicked"
                );
            }
        }
    }

    /// Whether no sink is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Number of registered sinks.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ResilienceEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ResilienceEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// Adapts a closure into an [`EventListener`].
///
/// ```rust
/// use storage_resilience_core::{EventListeners, FnListener, Notification};
///
/// let mut sinks = EventListeners::new();
/// sinks.add(FnListener::new(|n: &Notification| {
///     if let Notification::CircuitOpened { resource, .. } = n {
///         eprintln!("paging on-call: {resource} is failing");
///     }
/// }));
/// sinks.emit(&Notification::circuit_opened("primary-db"));
/// ```
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _event: std::marker::PhantomData<fn(&E)>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    /// Wraps `f`.
    pub fn new(f: F) -> Self {
        Self {
            f,
            _event: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: ResilienceEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
