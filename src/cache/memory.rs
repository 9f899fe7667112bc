/// In-process cache back-end with LRU eviction and TTL support
///
/// Entries live behind an `RwLock`; clones share the same storage, so one
/// cache can be handed to several connections of the same process.
use super::{Cache, CacheConfig, CacheEntry, CacheKey, CacheStats};
use crate::error::{Error, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Thread-safe in-memory cache with LRU eviction
pub struct MemoryCache<T: Clone> {
    data: Arc<RwLock<HashMap<CacheKey, CacheEntry<T>>>>,
    config: CacheConfig,
    stats: Arc<RwLock<CacheStats>>,
}

impl<T: Clone> MemoryCache<T> {
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            config,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    /// Capacity limit with the default TTL
    pub fn with_capacity(max_entries: usize) -> Self {
        Self::with_config(CacheConfig {
            max_entries,
            ..CacheConfig::default()
        })
    }

    fn update_stats(&self, f: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }

    /// Evict the least recently used entry
    fn evict_lru(&self, data: &mut HashMap<CacheKey, CacheEntry<T>>) -> Result<()> {
        let lru_key = data
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| key.clone())
            .ok_or_else(|| Error::cache("no entry left to evict"))?;

        data.remove(&lru_key);
        self.update_stats(|stats| stats.evictions += 1);
        debug!("Evicted LRU cache entry: {}", lru_key);
        Ok(())
    }
}

impl<T: Clone + Send + Sync> Cache<T> for MemoryCache<T> {
    fn get(&self, key: &CacheKey) -> Option<T> {
        let value = match self.data.write() {
            Ok(mut data) => {
                let expired = data.get(key).map(CacheEntry::is_expired);
                match expired {
                    Some(false) => data.get_mut(key).map(|entry| {
                        entry.mark_accessed();
                        entry.value.clone()
                    }),
                    Some(true) => {
                        debug!("Cache entry '{}' is expired", key);
                        data.remove(key);
                        None
                    }
                    None => None,
                }
            }
            Err(_) => {
                warn!("Cache lock poisoned; treating '{}' as a miss", key);
                None
            }
        };

        self.update_stats(|stats| {
            if value.is_some() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        });
        value
    }

    fn put(&self, key: CacheKey, value: T, ttl: Option<Duration>) -> Result<()> {
        if self.config.max_entries == 0 {
            return Ok(());
        }
        let ttl = ttl.or(self.config.default_ttl);
        let entry = CacheEntry::new(value, ttl);

        let mut data = self
            .data
            .write()
            .map_err(|_| Error::cache("failed to acquire write lock"))?;
        if !data.contains_key(&key) {
            while data.len() >= self.config.max_entries {
                self.evict_lru(&mut data)?;
            }
        }
        data.insert(key.clone(), entry);
        let entries = data.len() as u64;
        drop(data);

        self.update_stats(|stats| {
            stats.saves += 1;
            stats.entries = entries;
        });
        debug!("Cached entry '{}' (TTL: {:?})", key, ttl);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Option<T> {
        let mut data = self.data.write().ok()?;
        let entry = data.remove(key)?;
        let entries = data.len() as u64;
        drop(data);
        self.update_stats(|stats| stats.entries = entries);
        Some(entry.value)
    }

    fn clear(&self) {
        if let Ok(mut data) = self.data.write() {
            let count = data.len();
            data.clear();
            debug!("Cleared cache ({} entries)", count);
        }
        self.update_stats(|stats| stats.entries = 0);
    }

    fn stats(&self) -> CacheStats {
        let mut stats = self
            .stats
            .read()
            .map(|stats| stats.clone())
            .unwrap_or_default();
        stats.entries = self.len() as u64;
        stats
    }

    fn contains_key(&self, key: &CacheKey) -> bool {
        self.data
            .read()
            .map(|data| data.get(key).is_some_and(|entry| !entry.is_expired()))
            .unwrap_or(false)
    }

    fn len(&self) -> usize {
        self.data.read().map(|data| data.len()).unwrap_or(0)
    }

    fn cleanup_expired(&self) -> usize {
        match self.data.write() {
            Ok(mut data) => {
                let before = data.len();
                data.retain(|_, entry| !entry.is_expired());
                let removed = before - data.len();
                if removed > 0 {
                    debug!("Cleaned up {} expired cache entries", removed);
                }
                removed
            }
            Err(_) => {
                warn!("Failed to acquire write lock for cleanup");
                0
            }
        }
    }
}

impl<T: Clone> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for MemoryCache<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(name: &str) -> CacheKey {
        name.to_string()
    }

    #[test]
    fn test_put_get_remove() {
        let cache: MemoryCache<Vec<i64>> = MemoryCache::new();
        cache.put(key("a"), vec![1, 2], None).unwrap();
        assert_eq!(cache.get(&key("a")), Some(vec![1, 2]));
        assert!(cache.contains_key(&key("a")));
        assert_eq!(cache.remove(&key("a")), Some(vec![1, 2]));
        assert_eq!(cache.get(&key("a")), None);
    }

    #[test]
    fn test_lru_eviction() {
        let cache: MemoryCache<String> = MemoryCache::with_capacity(2);
        cache.put(key("a"), "1".into(), None).unwrap();
        thread::sleep(Duration::from_millis(10));
        cache.put(key("b"), "2".into(), None).unwrap();
        thread::sleep(Duration::from_millis(10));
        // touch a so b becomes the oldest
        assert!(cache.get(&key("a")).is_some());
        thread::sleep(Duration::from_millis(10));
        cache.put(key("c"), "3".into(), None).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&key("b")), None);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_expired_entries_are_misses() {
        let cache: MemoryCache<String> = MemoryCache::new();
        cache
            .put(key("a"), "1".into(), Some(Duration::from_millis(20)))
            .unwrap();
        cache.put(key("b"), "2".into(), None).unwrap();
        thread::sleep(Duration::from_millis(60));

        assert_eq!(cache.cleanup_expired(), 1);
        assert_eq!(cache.get(&key("a")), None);
        assert_eq!(cache.get(&key("b")), Some("2".into()));
    }

    #[test]
    fn test_statistics() {
        let cache: MemoryCache<String> = MemoryCache::new();
        cache.put(key("a"), "1".into(), None).unwrap();
        cache.get(&key("a"));
        cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.saves, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[test]
    fn test_clones_share_storage() {
        let cache: MemoryCache<String> = MemoryCache::new();
        let shared = cache.clone();
        let handle = thread::spawn(move || {
            for i in 0..50 {
                shared.put(format!("k{}", i), format!("v{}", i), None).unwrap();
            }
        });
        handle.join().unwrap();
        assert_eq!(cache.len(), 50);
    }
}
