//! Configuration management for the headless viewer.
//!
//! This module provides the command-line configuration of the `wsi-viewer`
//! binary:
//! - Command-line arguments via clap
//! - Environment variables with `WSI_` prefix
//! - Sensible defaults for all optional settings
//!
//! The parsed [`Config`] converts into the library configurations
//! ([`TileManagerConfig`] and [`ViewConfig`]).
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use wsi_viewer::config::Config;
//!
//! let config = Config::parse();
//! let tiles = config.tile_manager_config();
//! println!("{} workers, tile size {}", tiles.workers, tiles.tile_size);
//! ```
//!
//! # Environment Variables
//!
//! - `WSI_TILE_SIZE` - Tile edge length in pixels (default: 512)
//! - `WSI_WORKERS` - Number of loader threads (default: 4)
//! - `WSI_BUFFER_TILES` - Prefetch margin in tiles (default: 4)
//! - `WSI_LEVEL_QUOTAS` - Comma-separated per-level cache quotas (default: 500,800,1200,2000)
//! - `WSI_VIEW_WIDTH` / `WSI_VIEW_HEIGHT` - Virtual window size (default: 1280x800)
//! - `WSI_MIN_ZOOM` / `WSI_MAX_ZOOM` - Zoom limits (default: 0.01 / 40)
//! - `WSI_ZOOM_STEP` - Zoom in/out factor (default: 1.2)
//! - `WSI_LOAD_TIMEOUT_MS` - How long to wait for tiles after each step (default: 10000)
//! - `WSI_OUTPUT` - PNG file to write the final view to
//! - `WSI_ANNOTATIONS` - Annotation JSON document to load

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::tile::{
    LevelQuotas, TileManagerConfig, DEFAULT_BUFFER_TILES, DEFAULT_TILE_SIZE,
    DEFAULT_WORKER_COUNT,
};
use crate::view::{ViewConfig, DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, DEFAULT_ZOOM_STEP};

// =============================================================================
// Default Values
// =============================================================================

/// Default virtual window width.
pub const DEFAULT_VIEW_WIDTH: u32 = 1280;

/// Default virtual window height.
pub const DEFAULT_VIEW_HEIGHT: u32 = 800;

/// Default wait for tiles after each view change, in milliseconds.
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;

/// Largest accepted virtual window edge.
pub const MAX_VIEW_SIZE: u32 = 16_384;

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Viewer - headless driver for the tiled slide viewer core.
///
/// Opens an image as a slide, fits it to a virtual window, applies a zoom
/// sequence, waits for tiles and optionally writes the composed view to a PNG.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-viewer")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Slide image to open.
    #[arg(env = "WSI_SLIDE")]
    pub slide: PathBuf,

    /// Print slide metadata as JSON and exit.
    #[arg(long, default_value_t = false)]
    pub info: bool,

    // =========================================================================
    // Tile Configuration
    // =========================================================================
    /// Tile edge length in pixels.
    #[arg(long, default_value_t = DEFAULT_TILE_SIZE, env = "WSI_TILE_SIZE")]
    pub tile_size: u32,

    /// Number of loader threads.
    #[arg(long, default_value_t = DEFAULT_WORKER_COUNT, env = "WSI_WORKERS")]
    pub workers: usize,

    /// Tiles prefetched beyond the visible area on every side.
    #[arg(long, default_value_t = DEFAULT_BUFFER_TILES, env = "WSI_BUFFER_TILES")]
    pub buffer_tiles: u32,

    /// Per-level cache quotas (comma-separated, last value applies to deeper levels).
    #[arg(long, env = "WSI_LEVEL_QUOTAS", value_delimiter = ',')]
    pub level_quotas: Vec<usize>,

    // =========================================================================
    // View Configuration
    // =========================================================================
    /// Virtual window width in pixels.
    #[arg(long, default_value_t = DEFAULT_VIEW_WIDTH, env = "WSI_VIEW_WIDTH")]
    pub view_width: u32,

    /// Virtual window height in pixels.
    #[arg(long, default_value_t = DEFAULT_VIEW_HEIGHT, env = "WSI_VIEW_HEIGHT")]
    pub view_height: u32,

    /// Smallest allowed zoom.
    #[arg(long, default_value_t = DEFAULT_MIN_ZOOM, env = "WSI_MIN_ZOOM")]
    pub min_zoom: f64,

    /// Largest allowed zoom.
    #[arg(long, default_value_t = DEFAULT_MAX_ZOOM, env = "WSI_MAX_ZOOM")]
    pub max_zoom: f64,

    /// Factor applied by one zoom in/out step.
    #[arg(long, default_value_t = DEFAULT_ZOOM_STEP, env = "WSI_ZOOM_STEP")]
    pub zoom_step: f64,

    // =========================================================================
    // Session
    // =========================================================================
    /// Zoom levels to visit after fitting (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub zoom: Vec<f64>,

    /// Level-0 point to centre on after zooming, as X,Y.
    #[arg(long, value_delimiter = ',')]
    pub center: Option<Vec<f64>>,

    /// How long to wait for tiles after each view change, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_LOAD_TIMEOUT_MS, env = "WSI_LOAD_TIMEOUT_MS")]
    pub load_timeout_ms: u64,

    /// Write the final view to this PNG file.
    #[arg(short, long, env = "WSI_OUTPUT")]
    pub output: Option<PathBuf>,

    /// Annotation JSON document to load and query against the final view.
    #[arg(long, env = "WSI_ANNOTATIONS")]
    pub annotations: Option<PathBuf>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.tile_manager_config()
            .validate()
            .map_err(|e| e.to_string())?;

        if self.view_width == 0
            || self.view_height == 0
            || self.view_width > MAX_VIEW_SIZE
            || self.view_height > MAX_VIEW_SIZE
        {
            return Err(format!(
                "view size must be between 1x1 and {0}x{0}",
                MAX_VIEW_SIZE
            ));
        }
        self.view_config().validate().map_err(|e| e.to_string())?;

        if self.zoom.iter().any(|z| !(z.is_finite() && *z > 0.0)) {
            return Err("zoom values must be positive numbers".to_string());
        }
        if let Some(center) = &self.center {
            if center.len() != 2 {
                return Err("center must be given as X,Y".to_string());
            }
        }

        Ok(())
    }

    /// Tile pipeline settings.
    pub fn tile_manager_config(&self) -> TileManagerConfig {
        TileManagerConfig {
            tile_size: self.tile_size,
            workers: self.workers,
            level_quotas: LevelQuotas::new(self.level_quotas.clone()),
            buffer_tiles: self.buffer_tiles,
        }
    }

    /// Zoom settings.
    pub fn view_config(&self) -> ViewConfig {
        ViewConfig {
            min_zoom: self.min_zoom,
            max_zoom: self.max_zoom,
            zoom_step: self.zoom_step,
        }
    }

    /// Wait budget per view change.
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Centre point, if one was given.
    pub fn center_point(&self) -> Option<(f64, f64)> {
        match self.center.as_deref() {
            Some([x, y]) => Some((*x, *y)),
            _ => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
