//! Expire-after-write cache for per-target reads.
//!
//! Entries are stamped on insert and served until their TTL lapses; the
//! engines invalidate eagerly on every mutation, so the TTL only bounds
//! staleness for data mutated outside the engine (another process writing
//! the backend, a manual database edit). There is no read-through: entries
//! appear only as a side effect of a backend read.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    stored_at: Instant,
    value: V,
}

/// A mutex-guarded map with expire-after-write semantics.
#[derive(Debug)]
pub(crate) struct TtlCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value when present and not yet expired; an
    /// expired entry is dropped on the way out.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn insert(&self, key: K, value: V) {
        self.lock().insert(
            key,
            Entry {
                stored_at: Instant::now(),
                value,
            },
        );
    }

    pub(crate) fn invalidate(&self, key: &K) {
        self.lock().remove(key);
    }

    /// Drops every entry; used when a mutation can affect arbitrary keys
    /// (the IP-ban cascade).
    pub(crate) fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
