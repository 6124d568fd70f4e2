//! In-process key/value cache with per-entry time-to-live.
//!
//! Entries are evicted lazily: an expired entry stays in the map until the
//! next `get` on its key (or a delete) removes it. There is no size bound
//! and no LRU policy; the per-user datasets cached here are small.
//!
//! Read-through fills race with invalidation: a reader can load from the
//! store, lose the CPU to a writer that updates the store and deletes the
//! key, then put the old value back. Every delete therefore bumps a
//! generation counter. A filler takes [`TtlCache::generation`] before its
//! load and stores through [`TtlCache::set_if_current`], which refuses the
//! value if anything was invalidated in between.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::trace;

struct Entry<V> {
    value: V,
    /// `None` when `now + ttl` overflows `Instant`; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    /// Bumped by every delete.
    generation: u64,
}

/// String-keyed TTL cache, safe to share between tasks and threads.
pub struct TtlCache<V> {
    inner: Mutex<Inner<V>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                generation: 0,
            }),
        }
    }

    /// Store `value` under `key` until `ttl` elapses, replacing any previous entry.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now().checked_add(ttl);
        self.lock().entries.insert(key.into(), Entry { value, expires_at });
    }

    /// Current invalidation generation. Take it before loading a value that
    /// will be stored with [`TtlCache::set_if_current`].
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Like [`TtlCache::set`], but only if no delete happened since
    /// `generation` was observed. Returns whether the value was stored.
    pub fn set_if_current(&self, key: impl Into<String>, value: V, ttl: Duration, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            trace!("cache fill skipped (invalidated meanwhile)");
            return false;
        }
        let expires_at = Instant::now().checked_add(ttl);
        inner.entries.insert(key.into(), Entry { value, expires_at });
        true
    }

    /// Return the value if present and unexpired. An expired entry found
    /// here is removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut inner = self.lock();
        let entry = inner.entries.get(key)?;

        if entry.is_expired(Instant::now()) {
            inner.entries.remove(key);
            trace!("cache evict (expired): {}", key);
            return None;
        }

        Some(entry.value.clone())
    }

    /// Remove `key`. Returns true if an entry (expired or not) was present.
    pub fn delete(&self, key: &str) -> bool {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        inner.entries.remove(key).is_some()
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    pub fn delete_by_prefix(&self, prefix: &str) -> usize {
        let mut inner = self.lock();
        inner.generation = inner.generation.wrapping_add(1);
        let before = inner.entries.len();
        inner.entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - inner.entries.len();
        if removed > 0 {
            trace!("cache evict {} keys with prefix {}", removed, prefix);
        }
        removed
    }

    /// Raw entry count, including expired entries not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    // A panic while holding the lock cannot leave the map half-updated,
    // so a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}
