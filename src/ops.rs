use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared cancellation flag. Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// In-flight operations keyed by id, each holding the token that cancels it.
#[derive(Debug)]
pub struct OperationTable<K> {
    entries: Mutex<BTreeMap<K, CancelToken>>,
}

impl<K: Ord + Clone> Default for OperationTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Clone> OperationTable<K> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Registers `id` with the token that cancels it. Returns false, leaving
    /// the table unchanged, if `id` is already registered.
    pub fn add(&self, id: K, token: CancelToken) -> bool {
        let mut entries = self.lock();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, token);
        true
    }

    /// Unregisters `id` and cancels it. Returns whether it was registered.
    pub fn remove(&self, id: &K) -> bool {
        // Cancel outside the lock.
        let removed = self.lock().remove(id);
        match removed {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Snapshot of the registered ids in ascending order.
    pub fn ids(&self) -> Vec<K> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<K, CancelToken>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
