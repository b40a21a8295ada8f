// Cache storage backends
use crate::errors::CacheError;
use lru::LruCache;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
}

/// Ordered key-value storage behind [`super::QueryCache`].
///
/// `get` must promote the entry to most recently used and `pop_lru` must remove
/// the least recently used one. Capacity is enforced by the cache, not the store.
pub trait CacheStore<V>: Send {
    fn get(&mut self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError>;

    fn put(&mut self, key: String, entry: CacheEntry<V>) -> Result<(), CacheError>;

    fn remove(&mut self, key: &str) -> Result<bool, CacheError>;

    fn pop_lru(&mut self) -> Result<Option<String>, CacheError>;

    fn clear(&mut self) -> Result<(), CacheError>;

    fn len(&self) -> usize;
}

/// Default in-process store backed by an unbounded `LruCache`.
pub struct LruStore<V> {
    entries: LruCache<String, CacheEntry<V>>,
}

impl<V> LruStore<V> {
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }
}

impl<V> Default for LruStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone + Send> CacheStore<V> for LruStore<V> {
    fn get(&mut self, key: &str) -> Result<Option<CacheEntry<V>>, CacheError> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: String, entry: CacheEntry<V>) -> Result<(), CacheError> {
        self.entries.put(key, entry);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.pop(key).is_some())
    }

    fn pop_lru(&mut self) -> Result<Option<String>, CacheError> {
        Ok(self.entries.pop_lru().map(|(key, _)| key))
    }

    fn clear(&mut self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
