use crate::model::{Document, ResultChunk};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Document(String),
    ResultChunk(usize),
}

#[derive(Debug, Clone)]
enum CacheEntry {
    Document(Arc<Document>),
    ResultChunk(Arc<ResultChunk>),
}

/// LRU cache of decoded blobs, owned by a single opened store.
///
/// Safe to share between reader threads; each lookup takes the lock briefly.
#[derive(Debug)]
pub struct DataCache {
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
}

impl DataCache {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn document(&self, path: &str) -> Option<Arc<Document>> {
        match self.get(&CacheKey::Document(path.to_string())) {
            Some(CacheEntry::Document(document)) => Some(document),
            _ => None,
        }
    }

    pub fn insert_document(&self, path: &str, document: Arc<Document>) {
        self.put(
            CacheKey::Document(path.to_string()),
            CacheEntry::Document(document),
        );
    }

    pub fn result_chunk(&self, index: usize) -> Option<Arc<ResultChunk>> {
        match self.get(&CacheKey::ResultChunk(index)) {
            Some(CacheEntry::ResultChunk(chunk)) => Some(chunk),
            _ => None,
        }
    }

    pub fn insert_result_chunk(&self, index: usize, chunk: Arc<ResultChunk>) {
        self.put(CacheKey::ResultChunk(index), CacheEntry::ResultChunk(chunk));
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned lock only means a panic elsewhere; the cache degrades to misses.
    fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(key, entry);
        }
    }
}
