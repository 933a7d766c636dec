//! Read-through memo for finished pipeline results.
//!
//! Keys are a deterministic function of the normalized query text and the
//! request knobs that change the answer (limit, flags). Results are cached
//! whether they came from the model or from the fallback engine, so repeated
//! identical queries never touch the network.
//!
//! The map is an LRU bounded by `cache.capacity`. Entries optionally expire
//! after `cache.ttl_secs`; without a TTL they live until evicted.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Lowercase, trim, and collapse internal whitespace.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build a cache key such as `"tas keren_10"` or `"kaos_5_true"`.
pub fn cache_key(query: &str, limit: usize, flags: &[bool]) -> String {
    let mut key = format!("{}_{}", normalize_query(query), limit);
    for flag in flags {
        key.push('_');
        key.push_str(if *flag { "true" } else { "false" });
    }
    key
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

pub struct ResponseCache<V> {
    entries: Mutex<LruCache<String, CacheEntry<V>>>,
    ttl: Option<Duration>,
}

impl<V: Clone> ResponseCache<V> {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
        }
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: Instant) -> bool {
        match self.ttl {
            Some(ttl) => now.duration_since(entry.inserted_at) >= ttl,
            None => false,
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if !self.is_expired(entry, now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub async fn put(&self, key: impl Into<String>, value: V) {
        let mut entries = self.entries.lock().await;
        entries.put(
            key.into(),
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Insert `value` unless a live entry already exists, and return whichever
    /// value the cache holds afterwards. Two requests racing on the same key
    /// therefore both answer with the first stored result.
    pub async fn insert_if_absent(&self, key: impl Into<String>, value: V) -> V {
        let key = key.into();
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(existing) = entries.get(&key) {
            if !self.is_expired(existing, now) {
                return existing.value.clone();
            }
        }
        entries.put(
            key,
            CacheEntry {
                value: value.clone(),
                inserted_at: now,
            },
        );
        value
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
