//! Tile loading and caching core.
//!
//! This module turns "show this rectangle at this zoom" into decoded tiles,
//! without ever blocking the caller on slide I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            ViewportRenderer             │
//! └────────────────────┬────────────────────┘
//!                      │ load_tiles_for_view / get_tile
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              TileManager                │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  LevelStageMap  │  │
//! │  │  (per-level  │  │  (zoom → native │  │
//! │  │   LRU)       │  │   level)        │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │ round-robin submit
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │     LoaderPool (N worker threads)       │
//! └────────────────────┬────────────────────┘
//!                      │ read_region
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              SlideReader                │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileManager`]: Entry point; footprint computation, deduplication, dispatch
//! - [`TileCache`]: Per-level LRU cache of decoded RGB tiles
//! - [`TileKey`]: `(tile_x, tile_y, level)` cache key
//! - [`LevelStageMap`]: Maps the four zoom stages onto native levels
//! - [`LoaderPool`]: Fixed pool of decoding threads with private FIFO queues
//! - [`CacheMetrics`]: Hooks for eviction and failure counters

mod cache;
mod levels;
mod loader;
mod manager;
mod metrics;

pub use cache::{CacheStats, LevelQuotas, TileCache, TileImage, TileKey, DEFAULT_LEVEL_QUOTAS};
pub use levels::{
    best_level_for_downsample, compute_stages, stage_for_zoom, LevelStageMap, STAGE_COUNT,
    ZOOM_STAGE_THRESHOLDS,
};
pub use loader::{
    run_worker, LoaderPool, Pop, TaskQueue, TileDecoder, TileSink, DEFAULT_WORKER_COUNT,
    WORKER_POLL_INTERVAL,
};
pub use manager::{
    LoadSummary, NoopListener, TileListener, TileManager, TileManagerConfig,
    DEFAULT_BUFFER_TILES, DEFAULT_TILE_SIZE, MAX_TILE_SIZE,
};
pub use metrics::{CacheMetrics, NoopMetrics, TracingMetrics, DEFAULT_EVICTION_LOG_INTERVAL};
