use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Per-key mutual exclusion.
///
/// Writers to one product (or one reorder request) serialize through the
/// key's mutex while writers to other keys proceed in parallel. Entries are
/// never evicted.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    slots: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Copy,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutex for `key`, created on first use.
    pub fn slot(&self, key: K) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key).or_default().clone()
    }

    /// Run `f` while holding the key's lock.
    ///
    /// A poisoned slot is recovered: it guards no data, only ordering.
    pub fn with<T>(&self, key: K, f: impl FnOnce() -> T) -> T {
        let slot = self.slot(key);
        let _guard: MutexGuard<'_, ()> = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        std::thread::scope(|s| {
            for _ in 0..8 {
                let locks = Arc::clone(&locks);
                let inside = Arc::clone(&inside);
                let max_seen = Arc::clone(&max_seen);
                s.spawn(move || {
                    locks.with(7u32, || {
                        let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    });
                });
            }
        });

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn distinct_keys_get_distinct_slots() {
        let locks = KeyedLocks::new();
        assert!(!Arc::ptr_eq(&locks.slot(1u8), &locks.slot(2u8)));
        assert!(Arc::ptr_eq(&locks.slot(1u8), &locks.slot(1u8)));
    }
}
