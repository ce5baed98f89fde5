//! View layer: camera, renderer and a software render target.
//!
//! # Components
//!
//! - [`Viewport`]: zoom/pan/resize state that yields the visible rectangle
//! - [`ViewportRenderer`]: keeps displayed tiles in step with view and cache
//! - [`RenderTarget`]: seam to the host's scene (GUI or [`RasterTarget`])
//! - [`StatusSink`]: status bar, zoom and field-of-view notifications

mod raster;
mod renderer;
mod viewport;

pub use raster::{RasterItem, RasterTarget, DEFAULT_BACKGROUND};
pub use renderer::{
    NoopStatus, RenderTarget, StatusSink, ViewConfig, ViewportRenderer, BASE_Z_INDEX,
    DEFAULT_MAX_ZOOM, DEFAULT_MIN_ZOOM, DEFAULT_ZOOM_STEP, REMOVAL_SLACK_TILES,
};
pub use viewport::Viewport;
