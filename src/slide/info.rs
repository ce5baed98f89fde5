//! Slide metadata summary.
//!
//! Collects level geometry and the commonly used vendor properties
//! (microns per pixel, objective power, vendor) into one plain struct.

use serde::Serialize;

use super::reader::{LevelInfo, SlideReader};

/// Property key for horizontal microns per pixel.
pub const PROPERTY_MPP_X: &str = "openslide.mpp-x";

/// Property key for vertical microns per pixel.
pub const PROPERTY_MPP_Y: &str = "openslide.mpp-y";

/// Property key for the scanner objective power.
pub const PROPERTY_OBJECTIVE_POWER: &str = "openslide.objective-power";

/// Property key for the slide vendor.
pub const PROPERTY_VENDOR: &str = "openslide.vendor";

/// Summary of a slide's geometry and acquisition metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlideInfo {
    /// Level-0 dimensions `(width, height)`
    pub dimensions: (u64, u64),

    /// Per-level geometry, level 0 first
    pub levels: Vec<LevelSummary>,

    /// Microns per pixel, if the slide reports it
    pub mpp: Option<(f64, f64)>,

    /// Objective power (e.g. "40"), if known
    pub objective_power: Option<String>,

    /// Vendor string, if known
    pub vendor: Option<String>,
}

/// Geometry of one level in a [`SlideInfo`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LevelSummary {
    pub width: u64,
    pub height: u64,
    pub downsample: f64,
}

impl From<LevelInfo> for LevelSummary {
    fn from(info: LevelInfo) -> Self {
        Self {
            width: info.width,
            height: info.height,
            downsample: info.downsample,
        }
    }
}

impl SlideInfo {
    /// Gather the summary from a reader.
    pub fn from_reader(reader: &dyn SlideReader) -> Self {
        let properties = reader.properties();
        let levels: Vec<LevelSummary> = (0..reader.level_count())
            .filter_map(|level| reader.level_info(level))
            .map(LevelSummary::from)
            .collect();

        let parse = |key: &str| properties.get(key).and_then(|v| v.trim().parse::<f64>().ok());
        let mpp = match (parse(PROPERTY_MPP_X), parse(PROPERTY_MPP_Y)) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        };

        Self {
            dimensions: reader.dimensions().unwrap_or((0, 0)),
            levels,
            mpp,
            objective_power: properties.get(PROPERTY_OBJECTIVE_POWER).cloned(),
            vendor: properties.get(PROPERTY_VENDOR).cloned(),
        }
    }

    /// Number of pyramid levels.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Physical size in millimetres, when microns-per-pixel is known.
    pub fn physical_size_mm(&self) -> Option<(f64, f64)> {
        let (mpp_x, mpp_y) = self.mpp?;
        if mpp_x <= 0.0 || mpp_y <= 0.0 {
            return None;
        }
        let (w, h) = self.dimensions;
        Some((w as f64 * mpp_x / 1000.0, h as f64 * mpp_y / 1000.0))
    }
}
