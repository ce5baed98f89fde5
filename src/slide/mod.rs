//! Slide abstraction layer.
//!
//! This module provides the interface the tiling core uses to talk to a
//! pyramidal image, independent of how that image is stored.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        TileManager / LoaderPool         │
//! └────────────────────┬────────────────────┘
//!                      │  Arc<dyn SlideReader>
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │           SlideReader Trait             │
//! │  (levels, downsamples, region reads)    │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │          ImagePyramidSlide              │
//! │   (raster file, in-memory pyramid)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use wsi_viewer::slide::{open_slide, SlideInfo};
//!
//! let slide = open_slide("sample.png").expect("slide should open");
//! let info = SlideInfo::from_reader(slide.as_ref());
//! println!("{} levels, level 0 is {:?}", info.level_count(), info.dimensions);
//! ```

mod image_pyramid;
mod info;
mod reader;

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::SlideError;

pub use image_pyramid::{
    ImagePyramidSlide, PyramidOptions, DEFAULT_LEVEL_FACTOR, DEFAULT_MAX_LEVELS,
    DEFAULT_MIN_LEVEL_SIZE,
};
pub use info::{
    LevelSummary, SlideInfo, PROPERTY_MPP_X, PROPERTY_MPP_Y, PROPERTY_OBJECTIVE_POWER,
    PROPERTY_VENDOR,
};
pub use reader::{LevelInfo, SlideReader};

/// Open a slide file and return a shareable reader.
///
/// Fails with [`SlideError::Open`] when the file is missing or cannot be
/// decoded.
pub fn open_slide(path: impl AsRef<Path>) -> Result<Arc<dyn SlideReader>, SlideError> {
    let path = path.as_ref();
    let slide = ImagePyramidSlide::open(path)?;
    info!(
        "Opened slide {} ({} levels, downsamples {:?})",
        path.display(),
        slide.level_count(),
        slide.level_downsamples()
    );
    Ok(Arc::new(slide))
}
