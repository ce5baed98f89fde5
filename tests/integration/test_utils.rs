//! Test utilities for integration tests.
//!
//! This module provides mock slide readers that count reads, block decodes
//! behind a gate or fail on chosen levels, a recording render target, and
//! helpers for writing test images to disk.

use image::{Rgb, RgbImage, Rgba, RgbaImage};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use wsi_viewer::error::SlideError;
use wsi_viewer::slide::SlideReader;
use wsi_viewer::tile::{TileImage, TileKey, TileManager};
use wsi_viewer::view::RenderTarget;

// =============================================================================
// Gate
// =============================================================================

/// Blocks decoding threads until opened.
pub struct Gate {
    open: Mutex<bool>,
    changed: Condvar,
}

impl Gate {
    pub fn new(open: bool) -> Self {
        Self {
            open: Mutex::new(open),
            changed: Condvar::new(),
        }
    }

    pub fn open(&self) {
        *self.open.lock() = true;
        self.changed.notify_all();
    }

    pub fn close(&self) {
        *self.open.lock() = false;
    }

    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.changed.wait(&mut open);
        }
    }
}

// =============================================================================
// Mock Slide
// =============================================================================

/// A synthetic pyramid that tracks every region read.
///
/// Each region is painted with a colour derived from its level so tests can
/// tell levels apart after composition.
pub struct MockSlide {
    levels: Vec<(u64, u64)>,
    downsamples: Vec<f64>,
    reads: Mutex<HashMap<(i64, i64, usize), usize>>,
    failing_levels: HashSet<usize>,
    gate: Gate,
}

impl MockSlide {
    pub fn new(levels: Vec<(u64, u64)>, downsamples: Vec<f64>) -> Self {
        Self {
            levels,
            downsamples,
            reads: Mutex::new(HashMap::new()),
            failing_levels: HashSet::new(),
            gate: Gate::new(true),
        }
    }

    /// Reads on `level` fail with a read error.
    pub fn failing_on(mut self, level: usize) -> Self {
        self.failing_levels.insert(level);
        self
    }

    pub fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Total number of `read_region` calls.
    pub fn read_count(&self) -> usize {
        self.reads.lock().values().sum()
    }

    /// Per-region read counts.
    pub fn reads(&self) -> HashMap<(i64, i64, usize), usize> {
        self.reads.lock().clone()
    }
}

/// Colour painted for a level.
pub fn level_color(level: usize) -> [u8; 3] {
    [(level as u8).wrapping_mul(60), 100, 200u8.wrapping_sub(level as u8 * 40)]
}

impl SlideReader for MockSlide {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u64, u64)> {
        self.levels.get(level).copied()
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
        self.gate.wait();
        *self.reads.lock().entry((x, y, level)).or_insert(0) += 1;

        if self.failing_levels.contains(&level) {
            return Err(SlideError::Read {
                level,
                x,
                y,
                reason: "mock read failure".to_string(),
            });
        }

        let [r, g, b] = level_color(level);
        Ok(RgbaImage::from_pixel(width, height, Rgba([r, g, b, 255])))
    }
}

/// Four levels with downsamples `[1, 4, 16, 64]` and a `side x side` base.
pub fn four_level_slide(side: u64) -> MockSlide {
    MockSlide::new(
        vec![
            (side, side),
            (side / 4, side / 4),
            (side / 16, side / 16),
            (side / 64, side / 64),
        ],
        vec![1.0, 4.0, 16.0, 64.0],
    )
}

// =============================================================================
// Recording Render Target
// =============================================================================

/// What a [`RecordingTarget`] knows about one displayed tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub z_index: i32,
}

/// Render target that records placements and removals.
#[derive(Default)]
pub struct RecordingTarget {
    next: u64,
    pub live: HashMap<u64, Placement>,
    pub rendered: usize,
    pub removed: usize,
}

impl RenderTarget for RecordingTarget {
    type Handle = u64;

    fn render_tile(&mut self, _image: TileImage, x: f64, y: f64, scale: f64, z_index: i32) -> u64 {
        self.next += 1;
        self.rendered += 1;
        self.live.insert(
            self.next,
            Placement {
                x,
                y,
                scale,
                z_index,
            },
        );
        self.next
    }

    fn remove_tile(&mut self, handle: u64) {
        if self.live.remove(&handle).is_some() {
            self.removed += 1;
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Receive `count` notifications or panic after `timeout`.
pub fn collect_keys(rx: &Receiver<TileKey>, count: usize, timeout: Duration) -> Vec<TileKey> {
    let deadline = Instant::now() + timeout;
    let mut keys = Vec::with_capacity(count);
    while keys.len() < count {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(key) => keys.push(key),
            Err(_) => panic!("received {} of {} notifications", keys.len(), count),
        }
    }
    keys
}

/// Wait until the manager has no load in flight.
pub fn wait_for_idle(manager: &TileManager, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while manager.in_flight_count() > 0 {
        assert!(Instant::now() < deadline, "manager did not become idle");
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Write a PNG whose left half is `left` and right half is `right`.
pub fn write_split_png(dir: &Path, width: u32, height: u32, left: [u8; 3], right: [u8; 3]) -> PathBuf {
    let image = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb(left)
        } else {
            Rgb(right)
        }
    });
    let path = dir.join("split.png");
    image.save(&path).unwrap();
    path
}
