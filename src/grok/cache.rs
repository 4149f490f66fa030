//! In-memory response cache
//!
//! Entries expire after a fixed TTL and the cache holds a bounded number of
//! entries, evicting the least recently used one when full.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Kind of request a cache entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    ChatCompletion,
    LiveSearch,
}

#[derive(Serialize)]
struct KeyInput<'a, T: Serialize> {
    kind: CacheKind,
    request: &'a T,
}

/// Build a deterministic cache key for a request.
///
/// The request is serialized through `serde_json::Value`, whose maps are
/// key-ordered, so field order never changes the key.
pub fn cache_key<T: Serialize>(kind: CacheKind, request: &T) -> String {
    let canonical = serde_json::to_value(KeyInput { kind, request })
        .map(|v| v.to_string())
        .unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

struct CacheEntry {
    value: Value,
    expires_at: Instant,
    last_access: u64,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    clock: u64,
    stats: CacheStats,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

/// TTL + LRU cache of upstream payloads
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    state: Mutex<CacheState>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Look up a live entry, refreshing its recency
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut state = self.lock();
        let now = Instant::now();
        state.clock += 1;
        let tick = state.clock;

        let live = state.entries.get(key).map(|entry| entry.expires_at > now);
        let hit = match live {
            Some(true) => state.entries.get_mut(key).map(|entry| {
                entry.last_access = tick;
                entry.value.clone()
            }),
            Some(false) => {
                state.entries.remove(key);
                None
            }
            None => None,
        };

        if hit.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        hit
    }

    /// Store (or overwrite) an entry
    pub fn insert(&self, key: String, value: Value) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.lock();
        let now = Instant::now();
        state.clock += 1;
        let tick = state.clock;

        if !state.entries.contains_key(&key) {
            state.entries.retain(|_, entry| entry.expires_at > now);
            while state.entries.len() >= self.capacity {
                let oldest = state
                    .entries
                    .iter()
                    .min_by_key(|(_, entry)| entry.last_access)
                    .map(|(k, _)| k.clone());
                match oldest {
                    Some(k) => {
                        state.entries.remove(&k);
                        state.stats.evictions += 1;
                        tracing::trace!(key = %k, "evicted cache entry");
                    }
                    None => break,
                }
            }
        }

        state.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
                last_access: tick,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        // A panic while holding the lock cannot leave an entry half-written.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hit_after_insert() {
        let cache = ResponseCache::new(Duration::from_secs(60), 10);
        cache.insert("a".to_string(), json!({"answer": 42}));

        assert_eq!(cache.get("a"), Some(json!({"answer": 42})));
        assert_eq!(cache.get("b"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_expired_entries_are_never_returned() {
        let cache = ResponseCache::new(Duration::from_millis(20), 10);
        cache.insert("a".to_string(), json!(1));
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), json!("a"));
        cache.insert("b".to_string(), json!("b"));

        // Touch "a" so "b" becomes the eviction candidate
        assert!(cache.get("a").is_some());
        cache.insert("c".to_string(), json!("c"));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_overwrite_does_not_evict() {
        let cache = ResponseCache::new(Duration::from_secs(60), 2);
        cache.insert("a".to_string(), json!(1));
        cache.insert("b".to_string(), json!(2));
        cache.insert("a".to_string(), json!(3));

        assert_eq!(cache.get("a"), Some(json!(3)));
        assert_eq!(cache.get("b"), Some(json!(2)));
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_cache_key_is_deterministic_and_kind_scoped() {
        let request = json!({"model": "grok-4", "messages": [{"role": "user", "content": "hi"}]});
        let reordered = json!({"messages": [{"role": "user", "content": "hi"}], "model": "grok-4"});

        let a = cache_key(CacheKind::ChatCompletion, &request);
        assert_eq!(a, cache_key(CacheKind::ChatCompletion, &reordered));
        assert_ne!(a, cache_key(CacheKind::LiveSearch, &request));
        assert_eq!(a.len(), 64);
    }
}
