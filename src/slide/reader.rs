//! SlideReader trait for format-agnostic slide access.
//!
//! This module defines the `SlideReader` trait, the boundary between the
//! tiling core and whatever decodes pyramidal slide files. The core only ever
//! asks for level metadata and for pixel regions; it never sees file formats.
//!
//! Readers are shared across all loader workers behind an `Arc`, so they must
//! be `Send + Sync`. A reader whose backend cannot serve concurrent reads is
//! expected to serialize `read_region` internally.

use std::collections::HashMap;

use image::imageops::{self, FilterType};
use image::RgbaImage;

use crate::error::SlideError;

// =============================================================================
// Level Information
// =============================================================================

/// Information about a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u64,

    /// Height of this level in pixels
    pub height: u64,

    /// Downsample factor relative to level 0
    ///
    /// Level 0 has downsample 1.0, level 1 might have 4.0, etc.
    pub downsample: f64,
}

impl LevelInfo {
    /// Number of tiles of `tile_size` needed to cover this level, as
    /// `(tiles_x, tiles_y)`. Edge tiles are counted even if partial.
    pub fn tile_count(&self, tile_size: u32) -> (u32, u32) {
        let ts = u64::from(tile_size.max(1));
        let tiles_x = self.width.div_ceil(ts);
        let tiles_y = self.height.div_ceil(ts);
        (
            u32::try_from(tiles_x).unwrap_or(u32::MAX),
            u32::try_from(tiles_y).unwrap_or(u32::MAX),
        )
    }
}

// =============================================================================
// SlideReader Trait
// =============================================================================

/// Format-agnostic interface for reading regions from Whole Slide Images.
///
/// Coordinates passed to [`SlideReader::read_region`] are level-0 pixel
/// coordinates, while the width and height are in pixels of the requested
/// level, mirroring the OpenSlide convention.
pub trait SlideReader: Send + Sync {
    /// Get the number of pyramid levels.
    ///
    /// Level 0 is always the highest resolution (full size).
    fn level_count(&self) -> usize;

    /// Get dimensions of a specific level.
    ///
    /// Returns `(width, height)` in pixels, or `None` if level is out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)>;

    /// Downsample factors for every level, level 0 first.
    fn level_downsamples(&self) -> Vec<f64>;

    /// Read a region of a level.
    ///
    /// `x` and `y` are the top-left corner in level-0 pixels; `width` and
    /// `height` are in pixels of `level`. Areas outside the slide come back
    /// fully transparent.
    fn read_region(
        &self,
        x: i64,
        y: i64,
        level: usize,
        width: u32,
        height: u32,
    ) -> Result<RgbaImage, SlideError>;

    /// Vendor properties (`openslide.*` style keys).
    fn properties(&self) -> HashMap<String, String> {
        HashMap::new()
    }

    /// Get the downsample factor for a level.
    ///
    /// Returns `None` if level is out of range.
    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.level_downsamples().get(level).copied()
    }

    /// Get dimensions of the full-resolution (level 0) image.
    fn dimensions(&self) -> Option<(u64, u64)> {
        self.level_dimensions(0)
    }

    /// Get complete information about a level.
    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let downsample = self.level_downsample(level)?;
        Some(LevelInfo {
            width,
            height,
            downsample,
        })
    }

    /// Render a thumbnail that fits in `max_width x max_height`.
    ///
    /// The default picks the coarsest level that is still at least as large
    /// as the requested box (or the coarsest level overall), reads it whole
    /// and resizes it preserving the aspect ratio.
    fn thumbnail(&self, max_width: u32, max_height: u32) -> Result<RgbaImage, SlideError> {
        let level_count = self.level_count();
        if level_count == 0 {
            return Err(SlideError::EmptyPyramid);
        }

        let mut chosen = 0;
        for level in (0..level_count).rev() {
            if let Some((w, h)) = self.level_dimensions(level) {
                if w >= u64::from(max_width) || h >= u64::from(max_height) {
                    chosen = level;
                    break;
                }
            }
        }

        let (w, h) = self
            .level_dimensions(chosen)
            .ok_or(SlideError::InvalidLevel {
                level: chosen,
                level_count,
            })?;
        let w = u32::try_from(w).unwrap_or(u32::MAX);
        let h = u32::try_from(h).unwrap_or(u32::MAX);
        let region = self.read_region(0, 0, chosen, w, h)?;

        let (tw, th) = fit_within(w, h, max_width, max_height);
        Ok(imageops::resize(&region, tw, th, FilterType::Triangle))
    }
}

/// Scale `(width, height)` down to fit inside `(max_width, max_height)`,
/// keeping the aspect ratio. Never returns a zero dimension.
pub(crate) fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let scale = (f64::from(max_width) / f64::from(width))
        .min(f64::from(max_height) / f64::from(height))
        .min(1.0);
    let tw = ((f64::from(width) * scale).round() as u32).max(1);
    let th = ((f64::from(height) * scale).round() as u32).max(1);
    (tw, th)
}

// =============================================================================
// Tests
// =============================================================================
