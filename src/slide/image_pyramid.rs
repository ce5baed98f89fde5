//! In-memory pyramid built from an ordinary raster image.
//!
//! `ImagePyramidSlide` decodes a PNG/JPEG/TIFF file with the `image` crate and
//! builds a downsampled pyramid in memory. It is meant for images that fit in
//! RAM (previews, test fixtures, exported regions); real gigapixel slides are
//! served by a format-specific reader behind the same [`SlideReader`] trait.
//!
//! Levels are produced by repeatedly shrinking the previous level by
//! `level_factor`, so with the defaults a large image gets the classic
//! `[1, 4, 16, 64]` downsample ladder.

use std::collections::HashMap;
use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use tracing::debug;

use crate::error::SlideError;

use super::reader::SlideReader;

/// Default shrink factor between consecutive levels.
pub const DEFAULT_LEVEL_FACTOR: u32 = 4;

/// Default maximum number of levels.
pub const DEFAULT_MAX_LEVELS: usize = 4;

/// Levels stop being generated once the longest side is at most this size.
pub const DEFAULT_MIN_LEVEL_SIZE: u32 = 256;

/// Options controlling pyramid construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidOptions {
    /// Shrink factor between levels (at least 2)
    pub level_factor: u32,

    /// Upper bound on the number of levels (at least 1)
    pub max_levels: usize,

    /// Stop once the longest side of a level is at most this many pixels
    pub min_level_size: u32,
}

impl Default for PyramidOptions {
    fn default() -> Self {
        Self {
            level_factor: DEFAULT_LEVEL_FACTOR,
            max_levels: DEFAULT_MAX_LEVELS,
            min_level_size: DEFAULT_MIN_LEVEL_SIZE,
        }
    }
}

/// A slide whose whole pyramid lives in memory.
pub struct ImagePyramidSlide {
    levels: Vec<RgbaImage>,
    downsamples: Vec<f64>,
    properties: HashMap<String, String>,
}

impl ImagePyramidSlide {
    /// Open an image file with default pyramid options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SlideError> {
        Self::open_with(path, PyramidOptions::default())
    }

    /// Open an image file and build its pyramid.
    pub fn open_with(path: impl AsRef<Path>, options: PyramidOptions) -> Result<Self, SlideError> {
        let path = path.as_ref();
        let image = image::open(path).map_err(|e| SlideError::Open {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut slide = Self::from_image(image.to_rgba8(), options)?;
        if let Some(name) = path.file_name() {
            slide.properties.insert(
                "openslide.comment".to_string(),
                name.to_string_lossy().into_owned(),
            );
        }
        Ok(slide)
    }

    /// Build a pyramid from an already decoded image.
    pub fn from_image(base: RgbaImage, options: PyramidOptions) -> Result<Self, SlideError> {
        let (width, height) = base.dimensions();
        if width == 0 || height == 0 {
            return Err(SlideError::EmptyPyramid);
        }

        let factor = options.level_factor.max(2);
        let max_levels = options.max_levels.max(1);

        let mut levels = vec![base];
        let mut downsamples = vec![1.0];

        while levels.len() < max_levels {
            let prev = &levels[levels.len() - 1];
            if prev.width().max(prev.height()) <= options.min_level_size {
                break;
            }
            let downsample = downsamples[downsamples.len() - 1] * f64::from(factor);
            let w = ((f64::from(width) / downsample).ceil() as u32).max(1);
            let h = ((f64::from(height) / downsample).ceil() as u32).max(1);
            let next = imageops::resize(prev, w, h, FilterType::Triangle);
            levels.push(next);
            downsamples.push(downsample);
        }

        debug!(
            "Built in-memory pyramid: {}x{}, {} levels, downsamples {:?}",
            width,
            height,
            levels.len(),
            downsamples
        );

        let mut properties = HashMap::new();
        properties.insert("openslide.vendor".to_string(), "image".to_string());
        properties.insert(
            "openslide.level-count".to_string(),
            levels.len().to_string(),
        );

        Ok(Self {
            levels,
            downsamples,
            properties,
        })
    }

    /// Attach a vendor property (e.g. `openslide.mpp-x`).
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl SlideReader for ImagePyramidSlide {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        self.levels
            .get(level)
            .map(|img| (u64::from(img.width()), u64::from(img.height())))
    }

    fn level_downsamples(&self) -> Vec<f64> {
        self.downsamples.clone()
    }

    fn read_region(
        &self,
        x: i64,
        y: i64,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, SlideError> {
        let source = self.levels.get(level).ok_or(SlideError::InvalidLevel {
            level,
            level_count: self.levels.len(),
        })?;
        let downsample = self.downsamples[level];

        // Region origin in this level's pixel space.
        let origin_x = (x as f64 / downsample).floor() as i64;
        let origin_y = (y as f64 / downsample).floor() as i64;

        let mut out = RgbaImage::new(width, height);

        let src_w = i64::from(source.width());
        let src_h = i64::from(source.height());
        let x0 = origin_x.max(0);
        let y0 = origin_y.max(0);
        let x1 = (origin_x + i64::from(width)).min(src_w);
        let y1 = (origin_y + i64::from(height)).min(src_h);
        if x0 >= x1 || y0 >= y1 {
            return Ok(out);
        }

        let visible = imageops::crop_imm(
            source,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        )
        .to_image();
        imageops::replace(&mut out, &visible, x0 - origin_x, y0 - origin_y);

        Ok(out)
    }

    fn properties(&self) -> HashMap<String, String> {
        self.properties.clone()
    }
}

// =============================================================================
// Tests
// =============================================================================
