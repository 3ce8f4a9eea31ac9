//! Conversion cache.
//!
//! Memoizes recent conversions so a resource seen again at the same
//! resource version is not sent through the converter twice.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Instant;

use parking_lot::Mutex;

use crate::convert::Conversion;
use crate::resource::{Resource, ResourceType};

/// Default number of cached conversions.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Cache key for one conversion.
///
/// A new resource version means a new key, so stale conversions are never
/// served.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct CacheKey {
    pub namespace: String,
    pub name: String,
    pub source_type: ResourceType,
    pub resource_version: String,
    pub target_type: ResourceType,
}

impl CacheKey {
    /// Key for converting `source` to `target`.
    pub fn new(source: &Resource, target: &ResourceType) -> Self {
        Self {
            namespace: source.metadata.namespace.clone(),
            name: source.metadata.name.clone(),
            source_type: source.resource_type.clone(),
            resource_version: source.metadata.resource_version.clone(),
            target_type: target.clone(),
        }
    }
}

/// Cached conversion with access metadata.
#[derive(Debug, Clone)]
pub struct CachedConversion {
    /// Resource as it was before conversion.
    pub source: Resource,
    /// Converter output.
    pub target: Conversion,
    /// Wall-clock time of the last insert or hit.
    pub last_accessed: Instant,
    /// Logical access clock; orders accesses that share an `Instant`.
    pub access_tick: u64,
    /// Number of hits since insertion.
    pub access_count: u64,
    /// Approximate memory footprint in bytes.
    pub estimated_size: usize,
}

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(AtomicOrdering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(AtomicOrdering::Relaxed)
    }

    /// Get eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(AtomicOrdering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }
}

struct Entries {
    map: HashMap<CacheKey, CachedConversion>,
    clock: u64,
}

impl Entries {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Conversion cache with strict LRU eviction.
pub struct ConversionCache {
    entries: Mutex<Entries>,
    capacity: usize,
    stats: CacheStats,
}

impl Default for ConversionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

impl ConversionCache {
    /// Create a cache holding at most `capacity` conversions.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                clock: 0,
            }),
            capacity: capacity.max(1),
            stats: CacheStats::default(),
        }
    }

    /// Look up a conversion, refreshing its recency on a hit.
    pub fn get(&self, key: &CacheKey) -> Option<Conversion> {
        let mut entries = self.entries.lock();
        let tick = entries.tick();

        if let Some(cached) = entries.map.get_mut(key) {
            cached.last_accessed = Instant::now();
            cached.access_tick = tick;
            cached.access_count += 1;
            self.stats.hits.fetch_add(1, AtomicOrdering::Relaxed);
            return Some(cached.target.clone());
        }

        self.stats.misses.fetch_add(1, AtomicOrdering::Relaxed);
        None
    }

    /// Insert a conversion.
    ///
    /// If the cache is full and the key is new, evicts the least recently
    /// accessed entry first. Replacing an existing key never evicts.
    pub fn put(&self, key: CacheKey, source: Resource, target: Conversion) {
        let estimated_size = source.estimated_size() + target.resource.estimated_size();
        let mut entries = self.entries.lock();
        let tick = entries.tick();

        if entries.map.len() >= self.capacity && !entries.map.contains_key(&key) {
            self.evict_lru(&mut entries.map);
        }

        entries.map.insert(
            key,
            CachedConversion {
                source,
                target,
                last_accessed: Instant::now(),
                access_tick: tick,
                access_count: 0,
                estimated_size,
            },
        );
    }

    /// Evict the least recently used entry.
    fn evict_lru(&self, map: &mut HashMap<CacheKey, CachedConversion>) {
        let evict_key = map
            .iter()
            .min_by_key(|(_, v)| v.access_tick)
            .map(|(k, _)| k.clone());

        if let Some(key) = evict_key {
            map.remove(&key);
            self.stats.evictions.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    /// Check for a key without touching its recency or the counters.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().map.contains_key(key)
    }

    /// Copy of an entry's metadata, without touching its recency.
    pub fn peek(&self, key: &CacheKey) -> Option<CachedConversion> {
        self.entries.lock().map.get(key).cloned()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Sum of the estimated sizes of all entries.
    pub fn estimated_bytes(&self) -> usize {
        self.entries
            .lock()
            .map
            .values()
            .map(|entry| entry.estimated_size)
            .sum()
    }

    /// Get the current number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all cached entries.
    pub fn clear(&self) {
        self.entries.lock().map.clear();
    }
}
