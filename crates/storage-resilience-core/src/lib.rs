//! Core infrastructure for storage-resilience.
//!
//! This crate provides the pieces shared by every layer of the resilient
//! data-access stack:
//! - The storage error taxonomy and the message [`classify`]er
//! - The terminal [`Outcome`] of a resilient call
//! - Event system for observability, including operator [`Notification`]s
//! - A [`Clock`] abstraction so circuit timing can be driven in tests

pub mod classify;
pub mod clock;
pub mod events;
pub mod notify;
pub mod outcome;

pub use classify::{classify, classify_error, ErrorCategory, ErrorClassification};
pub use clock::{Clock, ManualClock, SharedClock, TokioClock};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use notify::Notification;
pub use outcome::Outcome;
