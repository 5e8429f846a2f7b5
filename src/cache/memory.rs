//! Bounded in-memory LRU for retrieval contexts.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;

struct Inner {
    entries: LruCache<String, String>,
    hits: u64,
    misses: u64,
}

/// Process-local LRU keyed by raw query text.
pub struct ContextCache {
    inner: Mutex<Inner>,
    capacity: NonZeroUsize,
}

impl std::fmt::Debug for ContextCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

/// Point-in-time LRU counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextCacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to build.
    pub misses: u64,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Current number of entries.
    pub size: usize,
}

impl ContextCache {
    /// Creates an LRU with the given capacity (zero is raised to one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the cached context for `query`, building it on a miss.
    ///
    /// `build` runs without the lock held. Two concurrent misses on the same
    /// query may both build; the later insert wins.
    pub fn get_or_build<F>(&self, query: &str, build: F) -> String
    where
        F: FnOnce() -> String,
    {
        {
            let mut inner = self.lock();
            if let Some(hit) = inner.entries.get(query).cloned() {
                inner.hits += 1;
                return hit;
            }
            inner.misses += 1;
        }

        let built = build();
        self.lock().entries.put(query.to_string(), built.clone());
        built
    }

    /// Drops every entry and resets the counters, returning the entry count.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        removed
    }

    /// Current counters.
    pub fn stats(&self) -> ContextCacheStats {
        let inner = self.lock();
        ContextCacheStats {
            hits: inner.hits,
            misses: inner.misses,
            capacity: self.capacity.get(),
            size: inner.entries.len(),
        }
    }
}
