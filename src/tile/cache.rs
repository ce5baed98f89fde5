//! Tile cache for decoded display tiles.
//!
//! This module provides a per-level LRU cache of decoded RGB tiles, so that
//! panning back over a region or switching back to a level does not decode
//! the same tiles again.
//!
//! # Cache Key
//!
//! Tiles are cached by `(tile_x, tile_y, level)`: tile-grid coordinates at a
//! native pyramid level. One cache belongs to one open slide.
//!
//! # Per-Level Eviction
//!
//! Every level has its own entry budget ([`LevelQuotas`]). When a level is
//! full, inserting another tile of that level evicts that level's least
//! recently used tile. Tiles of other levels are never evicted to make room,
//! so a burst of high-resolution tiles cannot flush the cheap overview levels.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroUsize;
use std::sync::Arc;

use image::RgbImage;
use lru::LruCache;
use parking_lot::Mutex;

use super::metrics::{CacheMetrics, NoopMetrics};

/// Default per-level quotas in tiles: level 0, 1, 2, and 3+.
///
/// Full-resolution tiles are the most numerous on screen and the most
/// expensive to hold, so they get the smallest budget.
pub const DEFAULT_LEVEL_QUOTAS: [usize; 4] = [500, 800, 1200, 2000];

/// A decoded tile, shared read-only between the cache and the render target.
pub type TileImage = Arc<RgbImage>;

// =============================================================================
// Cache Key
// =============================================================================

/// Identifies one decoded tile at one pyramid level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileKey {
    /// Tile X coordinate (0-indexed from left)
    pub tile_x: u32,

    /// Tile Y coordinate (0-indexed from top)
    pub tile_y: u32,

    /// Native pyramid level (0 = highest resolution)
    pub level: u32,
}

impl TileKey {
    /// Create a new tile key.
    pub fn new(tile_x: u32, tile_y: u32, level: u32) -> Self {
        Self {
            tile_x,
            tile_y,
            level,
        }
    }
}

// =============================================================================
// Quotas
// =============================================================================

/// Per-level entry budgets.
///
/// Entry `i` is the quota of level `i`; the last entry applies to every deeper
/// level. Quotas below 1 are treated as 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelQuotas {
    quotas: Vec<usize>,
}

impl LevelQuotas {
    /// Build quotas from a list. An empty list falls back to the defaults.
    pub fn new(quotas: Vec<usize>) -> Self {
        if quotas.is_empty() {
            return Self::default();
        }
        Self { quotas }
    }

    /// Same quota for every level.
    pub fn uniform(quota: usize) -> Self {
        Self {
            quotas: vec![quota],
        }
    }

    /// Quota for `level`.
    pub fn quota(&self, level: u32) -> usize {
        let idx = (level as usize).min(self.quotas.len() - 1);
        self.quotas[idx].max(1)
    }

    /// The configured list.
    pub fn as_slice(&self) -> &[usize] {
        &self.quotas
    }
}

impl Default for LevelQuotas {
    fn default() -> Self {
        Self {
            quotas: DEFAULT_LEVEL_QUOTAS.to_vec(),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Snapshot of cache occupancy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Tiles currently cached across all levels
    pub total_tiles: usize,

    /// Tiles currently cached per level
    pub level_counts: BTreeMap<u32, usize>,

    /// Evictions since the cache was created
    pub total_evictions: u64,
}

// =============================================================================
// Tile Cache
// =============================================================================

struct CacheInner {
    levels: HashMap<u32, LruCache<TileKey, TileImage>>,
    total_evictions: u64,
}

/// Per-level LRU cache of decoded tiles.
///
/// # Thread Safety
///
/// Every operation runs under one mutex, so membership and recency always
/// change together. The cache is shared by all loader workers and the render
/// thread via `Arc`.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use image::RgbImage;
/// use wsi_viewer::tile::{LevelQuotas, TileCache, TileKey};
///
/// let cache = TileCache::with_quotas(LevelQuotas::uniform(2));
/// let tile = Arc::new(RgbImage::new(512, 512));
///
/// cache.put(TileKey::new(0, 0, 0), tile.clone());
/// assert!(cache.get(&TileKey::new(0, 0, 0)).is_some());
/// ```
pub struct TileCache {
    inner: Mutex<CacheInner>,
    quotas: LevelQuotas,
    metrics: Arc<dyn CacheMetrics>,
}

impl TileCache {
    /// Create a cache with the default quotas.
    pub fn new() -> Self {
        Self::with_quotas(LevelQuotas::default())
    }

    /// Create a cache with custom quotas.
    pub fn with_quotas(quotas: LevelQuotas) -> Self {
        Self::with_metrics(quotas, Arc::new(NoopMetrics))
    }

    /// Create a cache that reports evictions to `metrics`.
    pub fn with_metrics(quotas: LevelQuotas, metrics: Arc<dyn CacheMetrics>) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                levels: HashMap::new(),
                total_evictions: 0,
            }),
            quotas,
            metrics,
        }
    }

    /// Get a tile from the cache.
    ///
    /// Marks the entry as most recently used.
    pub fn get(&self, key: &TileKey) -> Option<TileImage> {
        let mut inner = self.inner.lock();
        inner.levels.get_mut(&key.level)?.get(key).cloned()
    }

    /// Check if a tile is cached without updating LRU order.
    pub fn contains(&self, key: &TileKey) -> bool {
        let inner = self.inner.lock();
        inner
            .levels
            .get(&key.level)
            .is_some_and(|lru| lru.contains(key))
    }

    /// Store a tile.
    ///
    /// If the key is already cached only its recency is refreshed and the new
    /// image is dropped. Otherwise, when the key's level is at its quota, the
    /// least recently used tile of that level is evicted first.
    pub fn put(&self, key: TileKey, image: TileImage) {
        let evicted = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let quota = self.quotas.quota(key.level);
            let lru = inner.levels.entry(key.level).or_insert_with(|| {
                LruCache::new(NonZeroUsize::new(quota).unwrap_or(NonZeroUsize::MIN))
            });

            if lru.get(&key).is_some() {
                return;
            }

            match lru.push(key, image) {
                Some(_) => {
                    inner.total_evictions += 1;
                    Some(inner.total_evictions)
                }
                None => None,
            }
        };

        if let Some(total) = evicted {
            self.metrics.record_eviction(key.level, total);
        }
    }

    /// Clear all entries and reset the per-level counts.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.levels.clear();
    }

    /// Number of cached tiles across all levels.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.levels.values().map(|lru| lru.len()).sum()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cached tiles of one level.
    pub fn len_for_level(&self, level: u32) -> usize {
        let inner = self.inner.lock();
        inner.levels.get(&level).map_or(0, |lru| lru.len())
    }

    /// Quota of one level.
    pub fn quota(&self, level: u32) -> usize {
        self.quotas.quota(level)
    }

    /// All cached keys, grouped by level, most recently used first within a
    /// level.
    pub fn keys(&self) -> Vec<TileKey> {
        let inner = self.inner.lock();
        let mut levels: Vec<_> = inner.levels.iter().collect();
        levels.sort_by_key(|(level, _)| **level);
        levels
            .into_iter()
            .flat_map(|(_, lru)| lru.iter().map(|(key, _)| *key))
            .collect()
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let level_counts: BTreeMap<u32, usize> = inner
            .levels
            .iter()
            .filter(|(_, lru)| !lru.is_empty())
            .map(|(level, lru)| (*level, lru.len()))
            .collect();
        CacheStats {
            total_tiles: level_counts.values().sum(),
            level_counts,
            total_evictions: inner.total_evictions,
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
