//! Per-key mutual exclusion for check-then-act sequences.
//!
//! The duplicate-punishment check and the alt-correlation check both read
//! the backend and then write based on what they saw. Running two of those
//! sequences for the same key concurrently would let both pass the check;
//! serializing them through a lock keyed by target identity (or address)
//! closes the window without serializing unrelated keys against each
//! other.
//!
//! Lock slots are created on first use and kept for the process lifetime;
//! the map is bounded by the number of distinct keys seen.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Default)]
pub(crate) struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `f` while holding the slot for `key`; callers with different
    /// keys proceed in parallel.
    pub(crate) fn with<T>(&self, key: &K, f: impl FnOnce() -> T) -> T {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(key.clone()).or_default())
        };
        let _held = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use super::*;

    #[test]
    fn same_key_sequences_are_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let in_section = Arc::new(AtomicUsize::new(0));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let in_section = Arc::clone(&in_section);
            let overlaps = Arc::clone(&overlaps);
            handles.push(thread::spawn(move || {
                locks.with(&"target", || {
                    if in_section.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(std::time::Duration::from_millis(2));
                    in_section.fetch_sub(1, Ordering::SeqCst);
                });
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn different_keys_do_not_block_each_other() {
        let locks = KeyedLocks::new();
        // Holding one key's slot must not deadlock another key's section.
        locks.with(&"a", || {
            locks.with(&"b", || {});
        });
    }
}
