//! TTL + LRU response store.
//!
//! Entries expire `ttl` after insertion and are removed lazily when a
//! `get` observes them past expiry. At the capacity bound, inserting a new
//! key evicts exactly the least-recently-accessed entry. One mutex guards
//! the map, so readers never observe half-written entries.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::cache::key::CacheKey;

/// Aggregate cache counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Live entries (including any not-yet-collected expired entries).
    pub size: usize,
    /// Successful lookups.
    pub hits: u64,
    /// Missed lookups, including expired entries.
    pub misses: u64,
    /// Entries evicted to make room.
    pub evictions: u64,
    /// `hits / (hits + misses)`, zero when no lookups have happened.
    pub hit_rate: f64,
}

#[derive(Debug)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
    hit_count: u64,
    last_access: u64,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// In-memory response cache with TTL expiry and LRU eviction.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use mentor_rs::cache::{CacheKey, ResponseCache};
/// use mentor_rs::core::{NormalizedQuery, request::Intent};
///
/// let cache = ResponseCache::new(Duration::from_secs(60), 16);
/// let key = CacheKey::derive(Intent::General, &NormalizedQuery::parse("q", None), &[]);
/// assert!(cache.get(&key).is_none());
/// cache.put(key.clone(), "answer".to_string());
/// assert_eq!(cache.get(&key).as_deref(), Some("answer"));
/// ```
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    /// Creates a cache with the given TTL and capacity bound.
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
        }
    }

    /// Looks up a key, removing it if it has expired.
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<String> {
        self.get_at(key, Instant::now())
    }

    /// Stores a value, evicting the least-recently-used entry when full.
    pub fn put(&self, key: CacheKey, value: String) {
        self.put_at(key, value, Instant::now());
    }

    /// Returns a snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if lookups == 0 {
            0.0
        } else {
            inner.hits as f64 / lookups as f64
        };
        CacheStats {
            size: inner.map.len(),
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            hit_rate,
        }
    }

    fn get_at(&self, key: &CacheKey, now: Instant) -> Option<String> {
        enum Lookup {
            Hit(String),
            Expired,
            Absent,
        }

        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let lookup = match inner.map.get_mut(key) {
            Some(entry) if now < entry.expires_at => {
                entry.hit_count += 1;
                entry.last_access = tick;
                Lookup::Hit(entry.value.clone())
            }
            Some(_) => Lookup::Expired,
            None => Lookup::Absent,
        };

        match lookup {
            Lookup::Hit(value) => {
                inner.hits += 1;
                Some(value)
            }
            Lookup::Expired => {
                // Expired entries count as misses and are collected lazily.
                inner.map.remove(key);
                inner.misses += 1;
                None
            }
            Lookup::Absent => {
                inner.misses += 1;
                None
            }
        }
    }

    fn put_at(&self, key: CacheKey, value: String, now: Instant) {
        let mut inner = self.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if !inner.map.contains_key(&key) && inner.map.len() >= self.capacity {
            if let Some(victim) = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| k.clone())
            {
                inner.map.remove(&victim);
                inner.evictions += 1;
                debug!(key = %victim, "cache evicted lru entry");
            }
        }

        inner.map.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
                hit_count: 0,
                last_access: tick,
            },
        );
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
