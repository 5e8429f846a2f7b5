//! Two-tier result cache.
//!
//! Answers live in a [`PersistentCache`] that survives restarts; the
//! retrieval contexts they were built from live in a process-local
//! [`ContextCache`]. The tiers are cleared independently.

pub mod key;
pub mod memory;
pub mod persistent;

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::CacheError;

pub use key::{cache_key, content_hash, normalize};
pub use memory::{ContextCache, ContextCacheStats};
pub use persistent::{CacheEntry, PersistentCache};

/// Snapshot of both tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Entries in the answer file (expired ones included).
    pub persistent_count: usize,
    /// LRU hits.
    pub in_memory_hits: u64,
    /// LRU misses.
    pub in_memory_misses: u64,
    /// LRU capacity.
    pub in_memory_capacity: usize,
    /// LRU occupancy.
    pub in_memory_size: usize,
    /// Answer time to live.
    pub ttl_seconds: u64,
}

/// Answer tier plus context tier.
#[derive(Debug)]
pub struct TwoTierCache {
    answers: PersistentCache<String>,
    contexts: ContextCache,
}

impl TwoTierCache {
    /// Opens the answer file at `path` and allocates the LRU.
    pub fn new(path: impl Into<PathBuf>, ttl: Duration, lru_capacity: usize) -> Self {
        Self {
            answers: PersistentCache::open(path, ttl),
            contexts: ContextCache::new(lru_capacity),
        }
    }

    /// Fresh cached answer for `query`, if any.
    pub fn get(&self, query: &str) -> Option<String> {
        self.answers.get(query)
    }

    /// Stores an answer.
    pub fn put(&self, query: &str, answer: &str) -> Result<(), CacheError> {
        self.answers.put(query, answer.to_string())
    }

    /// The context tier.
    pub const fn contexts(&self) -> &ContextCache {
        &self.contexts
    }

    /// Clears both tiers, returning the combined number of entries removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        let contexts = self.clear_contexts();
        Ok(self.clear_answers()? + contexts)
    }

    /// Clears only the persistent answer tier.
    pub fn clear_answers(&self) -> Result<usize, CacheError> {
        self.answers.clear()
    }

    /// Clears only the in-memory context tier.
    pub fn clear_contexts(&self) -> usize {
        self.contexts.clear()
    }

    /// Counters for both tiers.
    pub fn stats(&self) -> CacheStats {
        let lru = self.contexts.stats();
        CacheStats {
            persistent_count: self.answers.len(),
            in_memory_hits: lru.hits,
            in_memory_misses: lru.misses,
            in_memory_capacity: lru.capacity,
            in_memory_size: lru.size,
            ttl_seconds: self.answers.ttl().as_secs(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clear_combines_counts() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let cache = TwoTierCache::new(dir.path().join("a.json"), Duration::from_secs(60), 8);
        cache.put("q1", "a1").unwrap_or_else(|e| panic!("put: {e}"));
        cache.put("q2", "a2").unwrap_or_else(|e| panic!("put: {e}"));
        cache.contexts().get_or_build("q1", || "ctx".to_string());

        assert_eq!(cache.clear().unwrap_or(0), 3);
        assert_eq!(cache.stats().persistent_count, 0);
    }

    #[test]
    fn test_contexts_survive_answer_clear() {
        let dir = TempDir::new().unwrap_or_else(|e| panic!("tempdir: {e}"));
        let cache = TwoTierCache::new(dir.path().join("a.json"), Duration::from_secs(60), 8);
        cache.put("q", "a").unwrap_or_else(|e| panic!("put: {e}"));
        cache.contexts().get_or_build("q", || "ctx".to_string());

        assert_eq!(cache.clear_answers().unwrap_or(0), 1);
        let stats = cache.stats();
        assert_eq!(stats.in_memory_size, 1);
        assert_eq!(stats.ttl_seconds, 60);
        assert_eq!(cache.contexts().get_or_build("q", String::new), "ctx");
    }
}
