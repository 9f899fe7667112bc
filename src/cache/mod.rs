/// Result caching
///
/// - `Cache<T>`: storage trait shared by cache back-ends
/// - `MemoryCache<T>`: in-process LRU cache with TTL support
/// - `ResultCache`: per-connection Off/AutoSave/ManualSave state machine
///   deciding when a read goes through the cache
pub mod memory;
pub mod result;

pub use memory::MemoryCache;
pub use result::{CacheMode, ResultCache};

use crate::error::Result;
use crate::query::Value;
use sha2::{Digest, Sha256};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Cache key type for consistency across all cache implementations
pub type CacheKey = String;

/// Cached value with expiry and access bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub created_at: u64,
    pub expires_at: Option<u64>,
    pub access_count: u64,
    pub last_access: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, ttl: Option<Duration>) -> Self {
        let now = current_timestamp();
        let expires_at = ttl.map(|d| now + d.as_millis() as u64);

        Self {
            value,
            created_at: now,
            expires_at,
            access_count: 1,
            last_access: now,
        }
    }

    pub fn is_expired(&self) -> bool {
        if let Some(expires_at) = self.expires_at {
            current_timestamp() > expires_at
        } else {
            false
        }
    }

    pub fn mark_accessed(&mut self) {
        self.access_count += 1;
        self.last_access = current_timestamp();
    }
}

/// Back-end configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries in the cache
    pub max_entries: usize,
    /// Default TTL for cache entries (None = no expiration)
    pub default_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl: Some(Duration::from_secs(3600)),
        }
    }
}

/// Cache counters
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub saves: u64,
    pub entries: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, 0 before the first lookup
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Storage trait for cache back-ends
pub trait Cache<T: Clone>: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<T>;

    /// Store a value; `ttl` falls back to the back-end default
    fn put(&self, key: CacheKey, value: T, ttl: Option<Duration>) -> Result<()>;

    fn remove(&self, key: &CacheKey) -> Option<T>;

    fn clear(&self);

    fn stats(&self) -> CacheStats;

    fn contains_key(&self, key: &CacheKey) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, returning how many went
    fn cleanup_expired(&self) -> usize;
}

/// Current timestamp in milliseconds since Unix epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Key of a read: SHA-256 over whitespace-normalized SQL and its values
///
/// Values are serialized in bind order, so the same SQL with different
/// parameters never shares an entry.
pub fn result_key(sql: &str, values: &[Value]) -> CacheKey {
    let normalized = normalize_sql(sql);
    let serialized = serde_json::to_string(values).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0u8]);
    hasher.update(serialized.as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("db_{}", hex)
}

/// Collapse whitespace runs to one space, leaving quoted text untouched
fn normalize_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in sql.trim().chars() {
        if let Some(q) = quote {
            out.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        match c {
            '\'' | '"' | '`' => quote = Some(c),
            '[' => quote = Some(']'),
            _ => {}
        }
        out.push(c);
    }
    out
}
