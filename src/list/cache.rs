//! Bounded cache with access-order eviction.

use std::hash::Hash;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::types::{Error, Result};

/// Capacity of [`ContentCache::default`].
pub const DEFAULT_CACHE_CAPACITY: usize = 9;

/// Small LRU cache for rendered row content.
///
/// Both `get` and `put` count as access. Inserting past capacity evicts the
/// least recently accessed entry.
#[derive(Debug)]
pub struct ContentCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> ContentCache<K, V> {
    pub fn new(capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity)
            .ok_or_else(|| Error::validation("cache capacity must be greater than zero"))?;
        Ok(Self {
            inner: LruCache::new(capacity),
        })
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Insert or replace. Returns the entry evicted to make room, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<(K, V)> {
        match self.inner.push(key, value) {
            // push hands back the old value when the key was already present
            Some((evicted, _)) if self.inner.contains(&evicted) => None,
            other => other,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }
}

impl<K: Hash + Eq, V> Default for ContentCache<K, V> {
    fn default() -> Self {
        Self {
            inner: LruCache::new(
                NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }
}
