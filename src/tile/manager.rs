//! Tile Manager for orchestrating tile loading.
//!
//! The TileManager is the main entry point of the tiling core. It owns the
//! open slide and orchestrates:
//! - Footprint computation for a viewport rectangle
//! - Cache lookups
//! - In-flight deduplication
//! - Round-robin dispatch to the loader pool
//! - Completion handling and update notification
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileManager                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │               load_tiles_for_view()                     │    │
//! │  │  1. Tile range + buffer    3. Check / mark in-flight    │    │
//! │  │  2. Check cache            4. Submit to LoaderPool      │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │           │
//! │           ▼                    ▼                    ▼           │
//! │    ┌───────────┐      ┌──────────────┐    ┌──────────────────┐  │
//! │    │ TileCache │      │ in-flight set│    │    LoaderPool    │  │
//! │    └───────────┘      └──────────────┘    └────────┬─────────┘  │
//! │          ▲                    ▲                    │            │
//! │          └────── on_tile_loaded (TileSink) ◄───────┘            │
//! │                              │                                  │
//! │                              ▼                                  │
//! │                    TileListener::tiles_updated                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Deduplication
//!
//! A key is either cached, in flight, or neither; never both. Checking the
//! cache, checking the in-flight set and marking a key in flight happen under
//! the in-flight lock as one step, and completions insert into the cache and
//! clear the in-flight mark under the same lock. Two overlapping footprint
//! requests therefore dispatch every key at most once.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, RgbImage};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{SlideError, TileError};
use crate::geometry::{Rect, TileRange};
use crate::slide::{open_slide, LevelInfo, SlideInfo, SlideReader};

use super::cache::{CacheStats, LevelQuotas, TileCache, TileImage, TileKey};
use super::levels::{best_level_for_downsample, LevelStageMap};
use super::loader::{LoaderPool, TileDecoder, TileSink, DEFAULT_WORKER_COUNT};
use super::metrics::{CacheMetrics, TracingMetrics};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 512;

/// Tiles prefetched beyond the visible area on every side.
pub const DEFAULT_BUFFER_TILES: u32 = 4;

/// Largest accepted tile edge length.
pub const MAX_TILE_SIZE: u32 = 8192;

// =============================================================================
// Configuration
// =============================================================================

/// Settings for a [`TileManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileManagerConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Number of loader threads
    pub workers: usize,

    /// Per-level cache budgets
    pub level_quotas: LevelQuotas,

    /// Prefetch margin in tiles
    pub buffer_tiles: u32,
}

impl Default for TileManagerConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            workers: DEFAULT_WORKER_COUNT,
            level_quotas: LevelQuotas::default(),
            buffer_tiles: DEFAULT_BUFFER_TILES,
        }
    }
}

impl TileManagerConfig {
    /// Check the settings.
    pub fn validate(&self) -> Result<(), TileError> {
        if self.tile_size == 0 || self.tile_size > MAX_TILE_SIZE {
            return Err(TileError::InvalidConfig(format!(
                "tile_size must be between 1 and {}",
                MAX_TILE_SIZE
            )));
        }
        if self.workers == 0 {
            return Err(TileError::InvalidConfig(
                "workers must be greater than 0".to_string(),
            ));
        }
        if self.level_quotas.as_slice().iter().any(|&q| q == 0) {
            return Err(TileError::InvalidConfig(
                "level quotas must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Listener
// =============================================================================

/// Receives "tiles updated" notifications.
///
/// Called on loader threads right after a tile lands in the cache. The usual
/// implementation forwards to the UI thread, e.g. through a channel.
pub trait TileListener: Send + Sync {
    fn tiles_updated(&self, key: TileKey);
}

impl TileListener for crossbeam_channel::Sender<TileKey> {
    fn tiles_updated(&self, key: TileKey) {
        // A closed receiver just means nobody is rendering anymore.
        let _ = self.send(key);
    }
}

/// Listener that ignores notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl TileListener for NoopListener {
    fn tiles_updated(&self, _key: TileKey) {}
}

/// What a [`TileManager::load_tiles_for_view`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Tasks newly dispatched to workers
    pub requested: usize,

    /// Tiles already in the cache
    pub cached: usize,

    /// Tiles skipped because a task was already outstanding
    pub in_flight: usize,
}

// =============================================================================
// Shared State
// =============================================================================

/// State shared between the manager and its workers.
struct SharedState {
    cache: TileCache,
    in_flight: Mutex<HashSet<TileKey>>,
    listener: Arc<dyn TileListener>,
    metrics: Arc<dyn CacheMetrics>,
}

impl SharedState {
    fn complete(&self, key: TileKey, image: TileImage) {
        {
            let mut in_flight = self.in_flight.lock();
            self.cache.put(key, image);
            in_flight.remove(&key);
        }
        self.listener.tiles_updated(key);
    }
}

impl TileSink for SharedState {
    fn tile_loaded(&self, key: TileKey, image: TileImage) {
        self.complete(key, image);
    }

    fn tile_failed(&self, key: TileKey, _error: &SlideError) {
        self.metrics.record_load_failure(key);
        self.in_flight.lock().remove(&key);
    }
}

// =============================================================================
// Tile Manager
// =============================================================================

/// Orchestrates tile loading for one open slide.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use wsi_viewer::geometry::Rect;
/// use wsi_viewer::tile::{TileManager, TileManagerConfig};
///
/// let (tx, rx) = crossbeam_channel::unbounded();
/// let manager = TileManager::open_path("slide.png", TileManagerConfig::default(), Arc::new(tx))
///     .expect("slide should open");
///
/// let level = manager.get_stage_level(0.5);
/// manager.load_tiles_for_view(&Rect::new(0.0, 0.0, 1024.0, 1024.0), level);
///
/// let key = rx.recv().expect("a tile should arrive");
/// assert!(manager.get_tile(key.tile_x, key.tile_y, key.level).is_some());
/// ```
pub struct TileManager {
    slide: Option<Arc<dyn SlideReader>>,
    levels: Vec<LevelInfo>,
    stages: LevelStageMap,
    config: TileManagerConfig,
    shared: Arc<SharedState>,
    pool: Option<LoaderPool>,
}

impl TileManager {
    /// Start managing an opened slide.
    ///
    /// Builds the level table and the stage map, then starts the loader pool.
    pub fn open(
        reader: Arc<dyn SlideReader>,
        config: TileManagerConfig,
        listener: Arc<dyn TileListener>,
    ) -> Result<Self, TileError> {
        Self::open_with_metrics(reader, config, listener, Arc::new(TracingMetrics::default()))
    }

    /// Open a slide file and start managing it.
    ///
    /// An open failure is returned before any thread is started.
    pub fn open_path(
        path: impl AsRef<Path>,
        config: TileManagerConfig,
        listener: Arc<dyn TileListener>,
    ) -> Result<Self, TileError> {
        config.validate()?;
        let reader = open_slide(path)?;
        Self::open(reader, config, listener)
    }

    /// Like [`TileManager::open`], reporting cache activity to `metrics`.
    pub fn open_with_metrics(
        reader: Arc<dyn SlideReader>,
        config: TileManagerConfig,
        listener: Arc<dyn TileListener>,
        metrics: Arc<dyn CacheMetrics>,
    ) -> Result<Self, TileError> {
        config.validate()?;

        let level_count = reader.level_count();
        if level_count == 0 {
            return Err(SlideError::EmptyPyramid.into());
        }
        let levels = (0..level_count)
            .map(|level| {
                reader.level_info(level).ok_or(SlideError::InvalidLevel {
                    level,
                    level_count,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let stages = LevelStageMap::new(level_count);

        let shared = Arc::new(SharedState {
            cache: TileCache::with_metrics(config.level_quotas.clone(), Arc::clone(&metrics)),
            in_flight: Mutex::new(HashSet::new()),
            listener,
            metrics,
        });

        let decoder = TileDecoder::new(Arc::clone(&reader), config.tile_size);
        let sink: Arc<dyn TileSink> = shared.clone();
        let pool = LoaderPool::spawn(config.workers, decoder, sink)?;

        info!(
            "Tile manager ready: {} levels, stages {:?}, tile size {}, {} workers",
            level_count,
            stages.stages(),
            config.tile_size,
            config.workers
        );

        Ok(Self {
            slide: Some(reader),
            levels,
            stages,
            config,
            shared,
            pool: Some(pool),
        })
    }

    /// Request every tile needed to show `view_rect` at `level`.
    ///
    /// The covering tile range is widened by the buffer margin and clamped to
    /// the level's tile grid. Cached keys are touched, in-flight keys are
    /// skipped, all others are marked in flight and dispatched round-robin.
    pub fn load_tiles_for_view(&self, view_rect: &Rect, level: u32) -> LoadSummary {
        let mut summary = LoadSummary::default();
        let Some(pool) = self.pool.as_ref() else {
            return summary;
        };
        let Some(info) = self.levels.get(level as usize) else {
            return summary;
        };

        let tile_size = self.config.tile_size;
        let (tiles_x, tiles_y) = info.tile_count(tile_size);
        let buffer = self.config.buffer_tiles;
        let range = TileRange::covering(view_rect, tile_size, info.downsample, buffer, buffer)
            .clamp_to(tiles_x, tiles_y);

        let mut to_dispatch = Vec::new();
        {
            let mut in_flight = self.shared.in_flight.lock();
            for (tx, ty) in range.iter() {
                let key = TileKey::new(tx, ty, level);
                if self.shared.cache.get(&key).is_some() {
                    summary.cached += 1;
                    continue;
                }
                if !in_flight.insert(key) {
                    summary.in_flight += 1;
                    continue;
                }
                to_dispatch.push(key);
            }
        }

        for key in to_dispatch {
            if pool.submit(key) {
                summary.requested += 1;
            } else {
                self.shared.in_flight.lock().remove(&key);
            }
        }

        if summary.requested > 0 {
            debug!(
                "Requested {} tiles: x[{}..{}] y[{}..{}] level {} (cached {}, in flight {})",
                summary.requested,
                range.x.start,
                range.x.end,
                range.y.start,
                range.y.end,
                level,
                summary.cached,
                summary.in_flight
            );
        }

        summary
    }

    /// Look up a tile in the cache.
    ///
    /// Never triggers a load. A hit refreshes the tile's recency.
    pub fn get_tile(&self, tile_x: u32, tile_y: u32, level: u32) -> Option<TileImage> {
        self.shared.cache.get(&TileKey::new(tile_x, tile_y, level))
    }

    /// Completion entry point: cache the tile, clear its in-flight mark and
    /// notify the listener. Ignored once the manager is closed.
    pub fn on_tile_loaded(&self, image: TileImage, tile_x: u32, tile_y: u32, level: u32) {
        if self.slide.is_none() {
            return;
        }
        self.shared
            .complete(TileKey::new(tile_x, tile_y, level), image);
    }

    /// Native level to display at `zoom`.
    pub fn get_stage_level(&self, zoom: f64) -> u32 {
        self.stages.level_for_zoom(zoom) as u32
    }

    /// Stop the workers, drop all cached and in-flight tiles and release the
    /// slide. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown();
        }
        self.shared.cache.clear();
        self.shared.in_flight.lock().clear();
        self.levels.clear();
        self.stages = LevelStageMap::default();
        if self.slide.take().is_some() {
            info!("Tile manager closed");
        }
    }

    /// Check if a slide is open.
    pub fn is_open(&self) -> bool {
        self.slide.is_some()
    }

    /// Tile edge length in pixels.
    pub fn tile_size(&self) -> u32 {
        self.config.tile_size
    }

    /// Active configuration.
    pub fn config(&self) -> &TileManagerConfig {
        &self.config
    }

    /// The stage table of the open slide.
    pub fn stages(&self) -> LevelStageMap {
        self.stages
    }

    /// Number of native levels (0 once closed).
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Geometry of one level.
    pub fn level_info(&self, level: u32) -> Option<LevelInfo> {
        self.levels.get(level as usize).copied()
    }

    /// Dimensions of one level, `(0, 0)` if it does not exist.
    pub fn level_dimensions(&self, level: u32) -> (u64, u64) {
        self.level_info(level)
            .map_or((0, 0), |info| (info.width, info.height))
    }

    /// Downsample of one level, 1.0 if it does not exist.
    pub fn level_downsample(&self, level: u32) -> f64 {
        self.level_info(level).map_or(1.0, |info| info.downsample)
    }

    /// Level whose downsample is nearest to `downsample`.
    pub fn best_level_for_downsample(&self, downsample: f64) -> u32 {
        let downsamples: Vec<f64> = self.levels.iter().map(|l| l.downsample).collect();
        best_level_for_downsample(&downsamples, downsample) as u32
    }

    /// Every cached key with its level's downsample, for overview overlays.
    pub fn cached_tiles(&self) -> Vec<(TileKey, f64)> {
        self.shared
            .cache
            .keys()
            .into_iter()
            .map(|key| (key, self.level_downsample(key.level)))
            .collect()
    }

    /// Thumbnail of the whole slide fitting `max_width x max_height`.
    ///
    /// Failures are logged and yield `None`.
    pub fn thumbnail(&self, max_width: u32, max_height: u32) -> Option<RgbImage> {
        let slide = self.slide.as_ref()?;
        match slide.thumbnail(max_width, max_height) {
            Ok(image) => Some(DynamicImage::ImageRgba8(image).into_rgb8()),
            Err(err) => {
                warn!("Thumbnail generation failed: {}", err);
                None
            }
        }
    }

    /// Metadata summary of the open slide.
    pub fn slide_info(&self) -> Option<SlideInfo> {
        self.slide
            .as_ref()
            .map(|slide| SlideInfo::from_reader(slide.as_ref()))
    }

    /// Cache occupancy.
    pub fn cache_stats(&self) -> CacheStats {
        self.shared.cache.stats()
    }

    /// Number of keys with an outstanding load task.
    pub fn in_flight_count(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Check if a key has an outstanding load task.
    pub fn is_in_flight(&self, key: &TileKey) -> bool {
        self.shared.in_flight.lock().contains(key)
    }

    /// Tasks waiting in worker queues.
    pub fn pending_tasks(&self) -> usize {
        self.pool.as_ref().map_or(0, |pool| pool.pending())
    }
}

impl Drop for TileManager {
    fn drop(&mut self) {
        self.close();
    }
}

// =============================================================================
// Tests
// =============================================================================
