//! Coordinate helpers shared by the tile manager and the renderer.
//!
//! Three coordinate systems are in play:
//!
//! - **level-0 space**: pixels of the full-resolution image. The scene, the
//!   visible rectangle and tile positions are all expressed here.
//! - **level-N space**: pixels of pyramid level N, i.e. level-0 divided by the
//!   level's downsample factor.
//! - **tile grid**: level-N space divided by the tile size.

use std::ops::Range;

/// Axis-aligned rectangle in level-0 pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from left/top/right/bottom edges.
    pub fn from_edges(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self::new(left, top, right - left, bottom - top)
    }

    pub fn left(&self) -> f64 {
        self.x
    }

    pub fn top(&self) -> f64 {
        self.y
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// True if the interiors overlap. Rectangles that only share an edge do
    /// not intersect.
    pub fn intersects(&self, other: &Rect) -> bool {
        self.left() < other.right()
            && other.left() < self.right()
            && self.top() < other.bottom()
            && other.top() < self.bottom()
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.left() && x < self.right() && y >= self.top() && y < self.bottom()
    }
}

/// Half-open range of tile indices on one level, `x` by `y`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TileRange {
    pub x: Range<u32>,
    pub y: Range<u32>,
}

impl TileRange {
    pub fn new(x: Range<u32>, y: Range<u32>) -> Self {
        Self { x, y }
    }

    /// Tiles overlapping `rect`, widened by `lead` tiles before the first
    /// tile and `trail` tiles after the last one.
    ///
    /// Starts are clamped at 0; ends are exclusive.
    pub fn covering(rect: &Rect, tile_size: u32, downsample: f64, lead: u32, trail: u32) -> Self {
        let (x0, y0) = tile_index_at(rect.left(), rect.top(), tile_size, downsample);
        let (x1, y1) = tile_index_at(rect.right(), rect.bottom(), tile_size, downsample);
        let lead = i64::from(lead);
        let trail = i64::from(trail) + 1;
        Self {
            x: clamp_index(x0 - lead)..clamp_index(x1 + trail),
            y: clamp_index(y0 - lead)..clamp_index(y1 + trail),
        }
    }

    /// Widen by `margin` tiles on every side (starts saturate at 0).
    pub fn expand(&self, margin: u32) -> Self {
        Self {
            x: self.x.start.saturating_sub(margin)..self.x.end.saturating_add(margin),
            y: self.y.start.saturating_sub(margin)..self.y.end.saturating_add(margin),
        }
    }

    /// Restrict to a `tiles_x x tiles_y` grid.
    pub fn clamp_to(&self, tiles_x: u32, tiles_y: u32) -> Self {
        Self {
            x: self.x.start.min(tiles_x)..self.x.end.min(tiles_x),
            y: self.y.start.min(tiles_y)..self.y.end.min(tiles_y),
        }
    }

    /// Tiles present in both ranges.
    pub fn intersection(&self, other: &TileRange) -> Self {
        let x_start = self.x.start.max(other.x.start);
        let y_start = self.y.start.max(other.y.start);
        Self {
            x: x_start..self.x.end.min(other.x.end).max(x_start),
            y: y_start..self.y.end.min(other.y.end).max(y_start),
        }
    }

    pub fn contains(&self, tile_x: u32, tile_y: u32) -> bool {
        self.x.contains(&tile_x) && self.y.contains(&tile_y)
    }

    pub fn len(&self) -> usize {
        self.x.len() * self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty() || self.y.is_empty()
    }

    /// Tiles in row-major order (y outer, x inner).
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.y
            .clone()
            .flat_map(move |ty| self.x.clone().map(move |tx| (tx, ty)))
    }
}

fn clamp_index(index: i64) -> u32 {
    index.clamp(0, i64::from(u32::MAX)) as u32
}

/// Level-0 coordinates to level-N coordinates.
pub fn level0_to_level(x: f64, y: f64, downsample: f64) -> (f64, f64) {
    (x / downsample, y / downsample)
}

/// Level-N coordinates to level-0 coordinates.
pub fn level_to_level0(x: f64, y: f64, downsample: f64) -> (f64, f64) {
    (x * downsample, y * downsample)
}

/// Top-left corner of a tile in level-0 pixels.
pub fn tile_origin(tile_x: u32, tile_y: u32, tile_size: u32, downsample: f64) -> (f64, f64) {
    let span = f64::from(tile_size) * downsample;
    (f64::from(tile_x) * span, f64::from(tile_y) * span)
}

/// Tile index containing a level-0 point (may be negative).
pub fn tile_index_at(x: f64, y: f64, tile_size: u32, downsample: f64) -> (i64, i64) {
    let span = f64::from(tile_size.max(1)) * downsample;
    ((x / span).floor() as i64, (y / span).floor() as i64)
}

/// Footprint of a tile in level-0 pixels.
pub fn tile_bounds(tile_x: u32, tile_y: u32, tile_size: u32, downsample: f64) -> Rect {
    let (x, y) = tile_origin(tile_x, tile_y, tile_size, downsample);
    let span = f64::from(tile_size) * downsample;
    Rect::new(x, y, span, span)
}
