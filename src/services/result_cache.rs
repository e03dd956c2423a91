// Query Result Cache
//
// Key/value store for executed query results, keyed by the request
// fingerprint. Entries expire by TTL and the least recently used entry is
// evicted when the cache is full; both policies are configuration, not
// part of the query path.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::models::QueryResultWithSchema;

#[derive(Debug, Clone)]
struct CachedResult {
    result: QueryResultWithSchema,
    cached_at: Instant,
    last_accessed: Instant,
    ttl: Duration,
    hit_count: u64,
}

impl CachedResult {
    fn is_expired(&self) -> bool {
        self.cached_at.elapsed() > self.ttl
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<String, CachedResult>,
    stats: CacheStats,
}

/// Result cache shared by all in-flight requests
pub struct ResultCache {
    state: Mutex<CacheState>,
    max_size: usize,
    default_ttl: Duration,
}

impl ResultCache {
    /// # Arguments
    ///
    /// * `max_size` - Maximum number of cached entries
    /// * `default_ttl_secs` - TTL applied to every stored entry
    pub fn new(max_size: usize, default_ttl_secs: u64) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            max_size,
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    /// Derive the cache key for a request fingerprint. Deterministic: the
    /// same (model id, content hash) pair always maps to the same key.
    pub fn generate_key(model_id: i64, command_md5: &str) -> String {
        format!("{}_{}", model_id, command_md5)
    }

    /// Fetch a cached result; expired entries count as misses
    pub fn get(&self, key: &str) -> Option<QueryResultWithSchema> {
        let mut state = self.state.lock().unwrap();

        let expired = match state.entries.get(key) {
            Some(cached) => cached.is_expired(),
            None => {
                state.stats.misses += 1;
                tracing::debug!("cache miss for key: {}", key);
                return None;
            }
        };

        if expired {
            state.entries.remove(key);
            state.stats.misses += 1;
            state.stats.expirations += 1;
            tracing::debug!("cache expired for key: {}", key);
            return None;
        }

        let result = match state.entries.get_mut(key) {
            Some(cached) => {
                cached.last_accessed = Instant::now();
                cached.hit_count += 1;
                cached.result.clone()
            }
            None => return None,
        };
        state.stats.hits += 1;
        tracing::debug!("cache hit for key: {}", key);
        Some(result)
    }

    /// Store a result under a fingerprint key
    pub fn put(&self, key: &str, result: &QueryResultWithSchema) {
        let mut state = self.state.lock().unwrap();

        if state.entries.len() >= self.max_size && !state.entries.contains_key(key) {
            Self::evict_lru(&mut state);
        }

        let now = Instant::now();
        state.entries.insert(
            key.to_string(),
            CachedResult {
                result: result.clone(),
                cached_at: now,
                last_accessed: now,
                ttl: self.default_ttl,
                hit_count: 0,
            },
        );

        tracing::debug!("cached result for key: {} (cache size: {})", key, state.entries.len());
    }

    fn evict_lru(state: &mut CacheState) {
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, cached)| cached.last_accessed)
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            state.entries.remove(&key);
            state.stats.evictions += 1;
            tracing::debug!("evicted cache entry: {}", key);
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        let count = state.entries.len();
        state.entries.clear();
        tracing::info!("cleared {} cache entries", count);
    }

    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats.clone()
    }

    pub fn size(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QueryColumn;
    use serde_json::json;

    fn create_test_result() -> QueryResultWithSchema {
        QueryResultWithSchema::new(
            vec![QueryColumn::new("id"), QueryColumn::new("name")],
            vec![
                json!({"id": 1, "name": "Alice"}),
                json!({"id": 2, "name": "Bob"}),
            ],
        )
    }

    #[test]
    fn test_key_generation_deterministic() {
        let key1 = ResultCache::generate_key(1, "abc123");
        let key2 = ResultCache::generate_key(1, "abc123");
        let key3 = ResultCache::generate_key(2, "abc123");
        let key4 = ResultCache::generate_key(1, "def456");

        assert_eq!(key1, key2);
        assert_ne!(key1, key3); // different model
        assert_ne!(key1, key4); // different content
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = ResultCache::new(10, 60);
        let result = create_test_result();

        cache.put("test_key", &result);

        let cached = cache.get("test_key");
        assert!(cached.is_some());
        assert_eq!(cached.unwrap().result_list.len(), 2);
    }

    #[test]
    fn test_cache_miss() {
        let cache = ResultCache::new(10, 60);
        assert!(cache.get("nonexistent").is_none());
    }

    #[test]
    fn test_cache_expiration() {
        let cache = ResultCache {
            state: Mutex::new(CacheState::default()),
            max_size: 10,
            default_ttl: Duration::from_millis(50),
        };
        let result = create_test_result();

        cache.put("test_key", &result);
        assert!(cache.get("test_key").is_some());

        std::thread::sleep(Duration::from_millis(80));

        assert!(cache.get("test_key").is_none());
        assert_eq!(cache.stats().expirations, 1);
    }

    #[test]
    fn test_cache_stats() {
        let cache = ResultCache::new(10, 60);
        let result = create_test_result();

        cache.put("test_key", &result);

        cache.get("test_key"); // hit
        cache.get("test_key"); // hit
        cache.get("nonexistent"); // miss

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!(stats.hit_ratio() > 0.6);
    }

    #[test]
    fn test_cache_clear() {
        let cache = ResultCache::new(10, 60);
        let result = create_test_result();

        cache.put("key1", &result);
        cache.put("key2", &result);
        assert_eq!(cache.size(), 2);

        cache.clear();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResultCache::new(3, 60);
        let result = create_test_result();

        cache.put("key1", &result);
        std::thread::sleep(Duration::from_millis(5));
        cache.put("key2", &result);
        std::thread::sleep(Duration::from_millis(5));
        cache.put("key3", &result);
        assert_eq!(cache.size(), 3);

        // touch key1 so key2 becomes the least recently used
        std::thread::sleep(Duration::from_millis(5));
        cache.get("key1");

        std::thread::sleep(Duration::from_millis(5));
        cache.put("key4", &result);

        assert_eq!(cache.size(), 3);
        assert!(cache.get("key2").is_none());
        assert!(cache.get("key1").is_some());
        assert!(cache.get("key3").is_some());
        assert!(cache.get("key4").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }
}
