//! Compiled-text cache keyed by fragment fingerprint.
//!
//! One cache lives inside each [`Template`](super::Template); the bundled dialects share a
//! process-wide template, so their cache is effectively process-wide too.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use lru::LruCache;

use crate::error::CompileError;

/// Capacity policy for a [`FragmentCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Keep every compiled fragment for the life of the template.
    #[default]
    Unbounded,
    /// Keep at most `n` entries, evicting the least recently used.
    Bounded(NonZeroUsize),
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

pub struct FragmentCache {
    policy: CachePolicy,
    entries: Mutex<LruCache<Arc<str>, Arc<str>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FragmentCache {
    #[must_use]
    pub fn new(policy: CachePolicy) -> Self {
        let entries = match policy {
            CachePolicy::Unbounded => LruCache::unbounded(),
            CachePolicy::Bounded(capacity) => LruCache::new(capacity),
        };
        Self {
            policy,
            entries: Mutex::new(entries),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    #[must_use]
    pub fn get(&self, fingerprint: &str) -> Option<Arc<str>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(fingerprint).map(Arc::clone)
    }

    pub fn insert(&self, fingerprint: Arc<str>, compiled: Arc<str>) {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.put(fingerprint, compiled);
    }

    /// Return the cached text for `fingerprint` or run `compute` and store its result.
    ///
    /// The lock is not held while `compute` runs: compiling a parent compiles its children
    /// through this same cache.
    ///
    /// # Errors
    /// Propagates the `CompileError` from `compute`; nothing is stored in that case.
    pub fn get_or_compute(
        &self,
        fingerprint: Arc<str>,
        compute: impl FnOnce() -> Result<String, CompileError>,
    ) -> Result<Arc<str>, CompileError> {
        if let Some(hit) = self.get(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(hit);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(fingerprint = %fingerprint, "fragment cache miss");

        let compiled: Arc<str> = Arc::from(compute()?);
        self.insert(fingerprint, Arc::clone(&compiled));
        Ok(compiled)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

impl Default for FragmentCache {
    fn default() -> Self {
        Self::new(CachePolicy::Unbounded)
    }
}

impl std::fmt::Debug for FragmentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentCache")
            .field("policy", &self.policy)
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Arc<str> {
        Arc::from(s)
    }

    #[test]
    fn second_lookup_is_a_hit() {
        let cache = FragmentCache::default();
        let first = cache
            .get_or_compute(key("a"), || Ok("SELECT 1".to_string()))
            .unwrap();
        let second = cache
            .get_or_compute(key("a"), || panic!("must not recompute"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn failed_compute_is_not_stored() {
        let cache = FragmentCache::default();
        let err = cache
            .get_or_compute(key("bad"), || Err(CompileError::Malformed("x".into())))
            .unwrap_err();
        assert_eq!(err, CompileError::Malformed("x".into()));
        assert!(cache.is_empty());
    }

    #[test]
    fn bounded_policy_evicts_least_recently_used() {
        let cache = FragmentCache::new(CachePolicy::Bounded(NonZeroUsize::new(2).unwrap()));
        cache.insert(key("1"), key("one"));
        cache.insert(key("2"), key("two"));
        assert!(cache.get("1").is_some());
        cache.insert(key("3"), key("three"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("1").is_some());
        assert!(cache.get("2").is_none());
        assert!(cache.get("3").is_some());
    }
}
