//! Per-connection result cache
//!
//! The cache is opt-in per read: `enable` arms it for the next lookup and
//! every lookup disarms it again. Back-end failures are logged and the
//! read falls through to the live connection.

use super::{result_key, Cache, CacheConfig, CacheKey, CacheStats, MemoryCache};
use crate::database::Record;
use crate::query::Value;
use log::{debug, warn};
use std::fmt;
use std::time::Duration;

/// What the next read does with the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Off,
    /// Store the result of a miss immediately
    AutoSave,
    /// Remember the key of a miss until `save_pending` is called
    ManualSave,
}

type Backend = Box<dyn Cache<Vec<Record>>>;

pub struct ResultCache {
    backend: Backend,
    ttl: Option<Duration>,
    mode: CacheMode,
    pending: Option<CacheKey>,
    stats: CacheStats,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("mode", &self.mode)
            .field("ttl", &self.ttl)
            .field("pending", &self.pending)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl ResultCache {
    /// Cache backed by a private `MemoryCache`
    pub fn new(config: CacheConfig) -> Self {
        let ttl = config.default_ttl;
        Self::with_backend(Box::new(MemoryCache::with_config(config)), ttl)
    }

    /// Cache over any back-end, e.g. a `MemoryCache` shared between connections
    pub fn with_backend(backend: Backend, ttl: Option<Duration>) -> Self {
        Self {
            backend,
            ttl,
            mode: CacheMode::Off,
            pending: None,
            stats: CacheStats::default(),
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Arm the cache for the next read
    pub fn enable(&mut self, auto_save: bool) {
        self.mode = if auto_save {
            CacheMode::AutoSave
        } else {
            CacheMode::ManualSave
        };
    }

    pub fn disable(&mut self) {
        self.mode = CacheMode::Off;
    }

    pub fn is_enabled(&self) -> bool {
        self.mode != CacheMode::Off
    }

    /// Key under which a read is cached
    pub fn key(sql: &str, values: &[Value]) -> CacheKey {
        result_key(sql, values)
    }

    /// Look a read up
    ///
    /// Returns `None` without touching the counters when the cache is off.
    /// A hit disarms the cache.
    pub fn lookup(&mut self, key: &CacheKey) -> Option<Vec<Record>> {
        if self.mode == CacheMode::Off {
            return None;
        }
        match self.backend.get(key) {
            Some(rows) => {
                self.stats.hits += 1;
                self.mode = CacheMode::Off;
                debug!("Cached result for {}", key);
                Some(rows)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Handle the live result of a missed lookup
    ///
    /// AutoSave stores it now, ManualSave keeps the key for `save_pending`.
    /// Either way the cache is disarmed.
    pub fn store_miss(&mut self, key: CacheKey, rows: &[Record]) {
        match self.mode {
            CacheMode::Off => {}
            CacheMode::AutoSave => {
                self.put(key, rows.to_vec());
            }
            CacheMode::ManualSave => {
                self.pending = Some(key);
            }
        }
        self.mode = CacheMode::Off;
    }

    /// Store rows under the key of the last ManualSave miss
    ///
    /// Returns false when there is nothing pending or the back-end refused.
    pub fn save_pending(&mut self, rows: Vec<Record>) -> bool {
        match self.pending.take() {
            Some(key) => self.put(key, rows),
            None => false,
        }
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn put(&mut self, key: CacheKey, rows: Vec<Record>) -> bool {
        match self.backend.put(key, rows, self.ttl) {
            Ok(()) => {
                self.stats.saves += 1;
                true
            }
            Err(err) => {
                warn!("Result cache write failed, continuing uncached: {}", err);
                false
            }
        }
    }

    /// Drop every stored result
    pub fn clear(&mut self) {
        self.backend.clear();
        self.pending = None;
    }

    /// Hit, miss and save counters of this connection
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.backend.len() as u64,
            evictions: self.backend.stats().evictions,
            ..self.stats.clone()
        }
    }

    pub fn hit_ratio(&self) -> f64 {
        self.stats.hit_rate()
    }

    /// Zero the hit, miss and save counters; stored results stay
    pub fn reset_stats(&mut self) {
        self.stats = CacheStats::default();
    }
}
