//! # WSI Viewer
//!
//! The rendering and caching core of a desktop viewer for Whole Slide Images
//! (WSI): multi-gigapixel pyramidal images that are far too large to decode
//! at once.
//!
//! The viewer only ever decodes the tiles needed for the current viewport at
//! a resolution level matched to the zoom. Decoding runs on a fixed pool of
//! background threads, decoded tiles are kept in a per-level LRU cache, and
//! the renderer composes whatever is cached without blocking.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`slide`] - Slide reader abstraction and an in-memory image pyramid
//! - [`tile`] - Tile cache, loader pool, level mapping and the tile manager
//! - [`view`] - Viewport camera, renderer and a software render target
//! - [`geometry`] - Level-0 rectangles and tile ranges
//! - [`annotation`] - Annotation model and JSON persistence
//! - [`config`] - CLI configuration of the headless driver
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use wsi_viewer::view::{RasterTarget, ViewportRenderer};
//!
//! let mut renderer = ViewportRenderer::new(RasterTarget::new(), 1280, 800);
//! renderer.load_slide("slide.tiff").expect("slide should open");
//! renderer.wait_until_idle(Duration::from_secs(5));
//!
//! renderer.set_zoom(0.5, Some((640.0, 400.0)));
//! renderer.wait_until_idle(Duration::from_secs(5));
//!
//! let view = renderer.viewport().visible_rect();
//! let image = renderer.target().compose(&view, 1280, 800);
//! image.save("view.png").expect("png should be written");
//! ```

pub mod annotation;
pub mod config;
pub mod error;
pub mod geometry;
pub mod slide;
pub mod tile;
pub mod view;

// Re-export commonly used types
pub use annotation::{Annotation, AnnotationKind, AnnotationList};
pub use config::Config;
pub use error::{AnnotationError, SlideError, TileError};
pub use geometry::{Rect, TileRange};
pub use slide::{open_slide, ImagePyramidSlide, LevelInfo, SlideInfo, SlideReader};
pub use tile::{
    CacheMetrics, LevelQuotas, LevelStageMap, LoadSummary, TileCache, TileImage, TileKey,
    TileListener, TileManager, TileManagerConfig,
};
pub use view::{RasterTarget, RenderTarget, StatusSink, ViewConfig, Viewport, ViewportRenderer};
