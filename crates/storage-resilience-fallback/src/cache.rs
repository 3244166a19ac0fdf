//! Last-known-good cache used as a fallback source.

use futures::future::{self, BoxFuture};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Errors a fallback cache backend can report.
///
/// The coordinator never surfaces these to callers; they are logged and the
/// fallback is treated as unavailable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The cache backend could not be reached.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    /// The backend refused the value.
    #[error("cache rejected value: {0}")]
    Rejected(String),
}

/// A key/value store holding the last value read from a resource.
///
/// Implement this over Redis, memcached or anything else; [`InMemoryCache`]
/// covers the single-process case.
pub trait FallbackCache<V>: Send + Sync {
    /// Reads `key`. Missing and expired entries are `Ok(None)`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<V>, CacheError>>;

    /// Stores `value` under `key` for `ttl`.
    fn set<'a>(&'a self, key: &'a str, value: V, ttl: Duration)
        -> BoxFuture<'a, Result<(), CacheError>>;
}

/// Entry in the cache with TTL tracking.
#[derive(Clone, Debug)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

#[derive(Debug)]
struct Store<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

/// In-process fallback cache with per-entry TTL and FIFO eviction.
#[derive(Debug)]
pub struct InMemoryCache<V> {
    store: Mutex<Store<V>>,
    capacity: usize,
}

impl<V: Clone + Send> InMemoryCache<V> {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Store<V>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads a live entry, dropping it if it has expired.
    pub fn get_now(&self, key: &str) -> Option<V> {
        let mut store = self.lock();
        let expired = store.entries.get(key)?.is_expired();
        if expired {
            store.entries.remove(key);
            store.order.retain(|k| k != key);
            return None;
        }
        store.entries.get(key).map(|entry| entry.value.clone())
    }

    /// Stores an entry, evicting the oldest one when full.
    ///
    /// Returns the evicted value, if any.
    pub fn insert(&self, key: &str, value: V, ttl: Duration) -> Option<V> {
        let mut store = self.lock();
        if store.entries.contains_key(key) {
            store.order.retain(|k| k != key);
        }
        store.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
        store.order.push_back(key.to_string());

        if store.entries.len() <= self.capacity {
            return None;
        }
        let oldest = store.order.pop_front()?;
        store.entries.remove(&oldest).map(|entry| entry.value)
    }

    /// Number of stored entries, expired ones included until next read.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes every entry.
    pub fn clear(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.order.clear();
    }
}

impl<V: Clone + Send> Default for InMemoryCache<V> {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl<V: Clone + Send + Sync> FallbackCache<V> for InMemoryCache<V> {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<V>, CacheError>> {
        Box::pin(future::ready(Ok(self.get_now(key))))
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: V,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<(), CacheError>> {
        self.insert(key, value, ttl);
        Box::pin(future::ready(Ok(())))
    }
}
