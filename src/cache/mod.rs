//! In-memory query cache for ranked search results.
//!
//! Entries expire after a fixed TTL and are evicted in least-recently-accessed
//! order once the entry count exceeds `max_size`. Any storage failure flips the
//! cache into a permanent unavailable state where every call is a no-op, so a
//! broken cache degrades the search pipeline to "always miss" and never blocks it.

mod store;

pub use store::{CacheEntry, CacheStore, LruStore};

use crate::{
    config::CacheConfig,
    errors::CacheError,
    logging::{EventLog, MissReason, SearchEvent},
};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const HEALTH_CHECK_KEY: &str = "__cache_health_check__";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub hit_rate: f64,
}

pub struct QueryCache<V> {
    store: Mutex<Box<dyn CacheStore<V>>>,
    max_size: usize,
    ttl: Duration,
    available: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    events: Arc<dyn EventLog>,
}

enum Lookup<V> {
    Hit(V),
    Miss(MissReason),
}

impl<V: Clone + Send + 'static> QueryCache<V> {
    pub fn new(config: &CacheConfig, events: Arc<dyn EventLog>) -> Result<Self, CacheError> {
        Self::with_store(
            config.max_size,
            Duration::from_millis(config.ttl_ms),
            Box::new(LruStore::<V>::new()),
            events,
        )
    }

    pub fn with_store(
        max_size: usize,
        ttl: Duration,
        store: Box<dyn CacheStore<V>>,
        events: Arc<dyn EventLog>,
    ) -> Result<Self, CacheError> {
        if max_size == 0 {
            return Err(CacheError::InvalidConfig("max_size must be greater than 0".to_string()));
        }
        if ttl.is_zero() {
            return Err(CacheError::InvalidConfig("ttl must be greater than 0".to_string()));
        }

        Ok(Self {
            store: Mutex::new(store),
            max_size,
            ttl,
            available: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            events,
        })
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Returns the live value for `key` and marks it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        if !self.is_available() {
            return None;
        }

        let lookup = {
            let mut store = self.store.lock();
            match store.get(key) {
                Ok(Some(entry)) if entry.expires_at > Instant::now() => Ok(Lookup::Hit(entry.value)),
                Ok(Some(_)) => store.remove(key).map(|_| Lookup::Miss(MissReason::Expired)),
                Ok(None) => Ok(Lookup::Miss(MissReason::Absent)),
                Err(e) => Err(e),
            }
        };

        match lookup {
            Ok(Lookup::Hit(value)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.events.record(SearchEvent::CacheHit { key: key.to_string() });
                Some(value)
            }
            Ok(Lookup::Miss(reason)) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.events.record(SearchEvent::CacheMiss {
                    key: key.to_string(),
                    reason,
                });
                None
            }
            Err(e) => {
                self.disable("get", e);
                None
            }
        }
    }

    pub fn set(&self, key: &str, value: V) {
        if !self.is_available() {
            return;
        }

        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + self.ttl,
        };

        let result = {
            let mut store = self.store.lock();
            store.put(key.to_string(), entry).and_then(|()| {
                if store.len() > self.max_size {
                    store.pop_lru().map(|_| ())
                } else {
                    Ok(())
                }
            })
        };

        if let Err(e) = result {
            self.disable("set", e);
        }
    }

    pub fn delete(&self, key: &str) {
        if !self.is_available() {
            return;
        }
        let result = self.store.lock().remove(key);
        if let Err(e) = result {
            self.disable("delete", e);
        }
    }

    pub fn clear(&self) {
        if !self.is_available() {
            return;
        }
        let result = self.store.lock().clear();
        if let Err(e) = result {
            self.disable("clear", e);
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            size: self.len(),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    pub fn log_stats(&self) {
        let stats = self.stats();
        self.events.record(SearchEvent::CacheStats {
            hits: stats.hits,
            misses: stats.misses,
            size: stats.size,
            hit_rate: stats.hit_rate,
        });
    }

    fn disable(&self, operation: &'static str, error: CacheError) {
        if self.available.swap(false, Ordering::AcqRel) {
            self.events.record(SearchEvent::CacheDisabled {
                operation,
                error: error.to_string(),
            });
        }
    }
}

impl<V: Clone + Default + Send + 'static> QueryCache<V> {
    /// Runs a synthetic set/get/delete cycle against the store. A failing step
    /// leaves the cache disabled.
    pub fn health_check(&self) -> bool {
        if !self.is_available() {
            return false;
        }

        let result = {
            let mut store = self.store.lock();
            let sentinel = CacheEntry {
                value: V::default(),
                expires_at: Instant::now() + self.ttl,
            };
            store
                .put(HEALTH_CHECK_KEY.to_string(), sentinel)
                .and_then(|()| store.get(HEALTH_CHECK_KEY))
                .and_then(|found| {
                    found
                        .map(|_| ())
                        .ok_or_else(|| CacheError::Storage("health check entry was not readable".to_string()))
                })
                .and_then(|()| store.remove(HEALTH_CHECK_KEY).map(|_| ()))
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.disable("health_check", e);
                false
            }
        }
    }
}
